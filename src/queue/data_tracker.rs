use std::collections::VecDeque;

use crate::chunk::chunk_selective_ack::{ChunkSelectiveAck, GapAckBlock};
use crate::util::*;

/// Tracks which TSNs have been received and decides when to SACK.
///
/// The cumulative received TSN covers every chunk received in order;
/// anything past it sits in the out-of-order set until the holes fill.
/// Duplicates are collected for the next SACK.
#[derive(Debug)]
pub(crate) struct DataTracker {
    /// Highest TSN such that all TSNs at or before it were received.
    cumulative_received_tsn: u32,
    /// Received TSNs past the cumulative point, in serial order.
    out_of_order: VecDeque<u32>,
    duplicates: Vec<u32>,
    /// Data-bearing packets seen since the last SACK went out; every
    /// second one forces an immediate SACK.
    packets_since_sack: u32,
    sack_immediately: bool,
}

impl DataTracker {
    pub(crate) fn new(peer_initial_tsn: u32) -> Self {
        DataTracker {
            cumulative_received_tsn: peer_initial_tsn.wrapping_sub(1),
            out_of_order: VecDeque::new(),
            duplicates: Vec::new(),
            packets_since_sack: 0,
            sack_immediately: false,
        }
    }

    pub(crate) fn cumulative_received_tsn(&self) -> u32 {
        self.cumulative_received_tsn
    }

    /// Records an inbound DATA chunk's TSN. Returns false for duplicates,
    /// which must not enter the reassembly queue.
    pub(crate) fn observe(&mut self, tsn: u32, immediate_ack: bool) -> bool {
        if immediate_ack {
            self.sack_immediately = true;
        }

        if sna32lte(tsn, self.cumulative_received_tsn) {
            self.duplicates.push(tsn);
            self.sack_immediately = true;
            return false;
        }

        if tsn == self.cumulative_received_tsn.wrapping_add(1) {
            self.cumulative_received_tsn = tsn;
            // Holes may have filled; drain the now-contiguous prefix.
            while self
                .out_of_order
                .front()
                .is_some_and(|f| *f == self.cumulative_received_tsn.wrapping_add(1))
            {
                self.cumulative_received_tsn = self.cumulative_received_tsn.wrapping_add(1);
                self.out_of_order.pop_front();
            }
            return true;
        }

        // A gap; remember the TSN and ack right away so the sender learns
        // about the hole.
        match self
            .out_of_order
            .binary_search_by(|probe| serial_cmp(*probe, tsn))
        {
            Ok(_) => {
                self.duplicates.push(tsn);
                self.sack_immediately = true;
                false
            }
            Err(pos) => {
                self.out_of_order.insert(pos, tsn);
                self.sack_immediately = true;
                true
            }
        }
    }

    /// Called once per inbound packet that carried at least one DATA
    /// chunk. Every other such packet is acked immediately.
    pub(crate) fn observe_packet_with_data(&mut self) {
        self.packets_since_sack += 1;
        if self.packets_since_sack >= 2 {
            self.sack_immediately = true;
        }
    }

    pub(crate) fn should_sack_immediately(&self) -> bool {
        self.sack_immediately
    }

    /// Builds a SACK for the current state and resets the ack bookkeeping.
    pub(crate) fn create_sack(&mut self, a_rwnd: u32) -> ChunkSelectiveAck {
        let mut gap_ack_blocks: Vec<GapAckBlock> = vec![];
        for tsn in &self.out_of_order {
            let offset = tsn.wrapping_sub(self.cumulative_received_tsn);
            if offset > u32::from(u16::MAX) {
                break;
            }
            let offset = offset as u16;
            match gap_ack_blocks.last_mut() {
                Some(last) if last.end + 1 == offset => last.end = offset,
                _ => gap_ack_blocks.push(GapAckBlock {
                    start: offset,
                    end: offset,
                }),
            }
        }

        let sack = ChunkSelectiveAck {
            cumulative_tsn_ack: self.cumulative_received_tsn,
            advertised_receiver_window_credit: a_rwnd,
            gap_ack_blocks,
            duplicate_tsn: std::mem::take(&mut self.duplicates),
        };
        self.packets_since_sack = 0;
        self.sack_immediately = false;
        sack
    }

    /// A FORWARD-TSN moved the cumulative point over abandoned chunks.
    pub(crate) fn handle_forward_tsn(&mut self, new_cumulative_tsn: u32) {
        if !sna32gt(new_cumulative_tsn, self.cumulative_received_tsn) {
            // Already past it; still ack so a lost SACK gets repaired.
            self.sack_immediately = true;
            return;
        }
        self.cumulative_received_tsn = new_cumulative_tsn;
        while self
            .out_of_order
            .front()
            .is_some_and(|f| sna32lte(*f, self.cumulative_received_tsn))
        {
            self.out_of_order.pop_front();
        }
        // The skipped range may abut chunks received out of order.
        while self
            .out_of_order
            .front()
            .is_some_and(|f| *f == self.cumulative_received_tsn.wrapping_add(1))
        {
            self.cumulative_received_tsn = self.cumulative_received_tsn.wrapping_add(1);
            self.out_of_order.pop_front();
        }
        self.sack_immediately = true;
    }

    /// True when holes exist in the received TSN sequence.
    pub(crate) fn has_gaps(&self) -> bool {
        !self.out_of_order.is_empty()
    }
}

fn serial_cmp(a: u32, b: u32) -> std::cmp::Ordering {
    if a == b {
        std::cmp::Ordering::Equal
    } else if sna32lt(a, b) {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Greater
    }
}
