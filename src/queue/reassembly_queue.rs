use bytes::BytesMut;
use fxhash::FxHashMap;

use super::Data;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::util::*;

/// A message being put back together from fragments.
///
/// `key` is the SSN (widened) for ordered DATA traffic and the MID for
/// I-DATA traffic. Fragments are kept sorted by `seq`: the TSN for DATA,
/// where fragments of one message are strictly sequential, and the FSN
/// for I-DATA.
#[derive(Debug)]
struct PartialMessage {
    key: u32,
    fragments: Vec<(u32, Data)>,
}

impl PartialMessage {
    fn new(key: u32) -> Self {
        PartialMessage {
            key,
            fragments: vec![],
        }
    }

    /// Inserts a fragment; false means it was a duplicate.
    fn push(&mut self, seq: u32, data: Data) -> bool {
        match self
            .fragments
            .binary_search_by(|(probe, _)| serial_cmp(*probe, seq))
        {
            Ok(_) => false,
            Err(pos) => {
                self.fragments.insert(pos, (seq, data));
                true
            }
        }
    }

    /// Complete when it begins with `is_beginning`, ends with `is_end`,
    /// and the sequence numbers in between are contiguous.
    fn is_complete(&self) -> bool {
        let n = self.fragments.len();
        if n == 0 {
            return false;
        }
        if !self.fragments[0].1.is_beginning || !self.fragments[n - 1].1.is_end {
            return false;
        }
        let first = self.fragments[0].0;
        self.fragments
            .iter()
            .enumerate()
            .all(|(i, (seq, _))| *seq == first.wrapping_add(i as u32))
    }

    fn num_bytes(&self) -> usize {
        self.fragments.iter().map(|(_, d)| d.payload.len()).sum()
    }

    fn assemble(self) -> Message {
        let first = &self.fragments[0].1;
        let stream_id = first.stream_id;
        let ppid = first.ppid;
        let payload = if ppid.is_empty_variant() {
            // The filler byte stands for an empty user message.
            bytes::Bytes::new()
        } else {
            let mut buf = BytesMut::new();
            for (_, d) in &self.fragments {
                buf.extend_from_slice(&d.payload);
            }
            buf.freeze()
        };
        Message {
            stream_id,
            ppid,
            payload,
        }
    }
}

#[derive(Debug, Default)]
struct StreamReassembly {
    /// Delivery cursor for ordered traffic: SSN for DATA, MID for I-DATA.
    next_key: u32,
    /// Ordered partial messages, sorted by key.
    ordered: Vec<PartialMessage>,
    /// Unordered partial messages. Keyed by MID for I-DATA; DATA
    /// unordered traffic has no message identifier, so fragments gather in
    /// a single bucket keyed by the TSN of their first fragment run.
    unordered: Vec<PartialMessage>,
    /// Loose unordered DATA fragments awaiting a contiguous
    /// beginning..end TSN run.
    unordered_chunks: Vec<(u32, Data)>,
}

/// Collects inbound fragments into messages and delivers them with
/// per-stream ordering for ordered traffic.
///
/// Total buffered bytes are bounded; exceeding the bound is fatal for the
/// association (resource exhaustion), and the remaining capacity is what
/// gets advertised as a_rwnd in SACKs.
#[derive(Debug)]
pub(crate) struct ReassemblyQueue {
    max_size: usize,
    interleaved: bool,
    streams: FxHashMap<u16, StreamReassembly>,
    n_bytes: usize,
    ready: Vec<Message>,
}

impl ReassemblyQueue {
    pub(crate) fn new(max_size: usize) -> Self {
        ReassemblyQueue {
            max_size,
            interleaved: false,
            streams: FxHashMap::default(),
            n_bytes: 0,
            ready: Vec::new(),
        }
    }

    pub(crate) fn set_interleaved(&mut self, interleaved: bool) {
        self.interleaved = interleaved;
    }

    /// Remaining receive window, advertised to the peer.
    pub(crate) fn remaining_bytes(&self) -> u32 {
        self.max_size.saturating_sub(self.n_bytes) as u32
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.n_bytes == 0
    }

    /// Adds a fragment. Errors when the buffer bound would be exceeded,
    /// which aborts the association.
    pub(crate) fn push(&mut self, tsn: u32, data: Data) -> Result<()> {
        let len = data.payload.len();
        if self.n_bytes + len > self.max_size {
            return Err(Error::ErrReceiveBufferExhausted);
        }
        self.n_bytes += len;

        let interleaved = self.interleaved;
        let stream_id = data.stream_id;
        let stream = self.streams.entry(stream_id).or_default();

        if data.unordered {
            if interleaved {
                let key = data.mid;
                let fsn = data.fsn;
                let partial = find_or_insert(&mut stream.unordered, key);
                if !partial.push(fsn, data) {
                    self.n_bytes -= len;
                    return Ok(());
                }
                if let Some(pos) = stream.unordered.iter().position(|p| p.is_complete()) {
                    let complete = stream.unordered.remove(pos);
                    self.deliver(complete);
                }
            } else {
                // DATA without a message id: insert sorted by TSN and look
                // for a contiguous beginning..end run.
                match stream
                    .unordered_chunks
                    .binary_search_by(|(probe, _)| serial_cmp(*probe, tsn))
                {
                    Ok(_) => {
                        self.n_bytes -= len;
                        return Ok(());
                    }
                    Err(pos) => stream.unordered_chunks.insert(pos, (tsn, data)),
                }
                if let Some(run) = find_complete_run(&stream.unordered_chunks) {
                    let fragments: Vec<(u32, Data)> = stream
                        .unordered_chunks
                        .drain(run.0..run.0 + run.1)
                        .collect();
                    let mut partial = PartialMessage::new(0);
                    partial.fragments = fragments;
                    self.deliver(partial);
                }
            }
        } else {
            let key = if interleaved {
                data.mid
            } else {
                u32::from(data.ssn)
            };
            // Obsolete fragments from before the delivery cursor.
            if key_lt(key, stream.next_key, interleaved) {
                self.n_bytes -= len;
                return Ok(());
            }
            let seq = if interleaved { data.fsn } else { tsn };
            let partial = find_or_insert(&mut stream.ordered, key);
            if !partial.push(seq, data) {
                self.n_bytes -= len;
                return Ok(());
            }
            self.deliver_ordered(stream_id);
        }

        Ok(())
    }

    /// Delivers consecutive complete messages at the stream's cursor.
    fn deliver_ordered(&mut self, stream_id: u16) {
        let interleaved = self.interleaved;
        loop {
            let Some(stream) = self.streams.get_mut(&stream_id) else {
                return;
            };
            let deliverable = stream
                .ordered
                .first()
                .is_some_and(|p| p.key == stream.next_key && p.is_complete());
            if !deliverable {
                return;
            }
            let complete = stream.ordered.remove(0);
            stream.next_key = next_key(stream.next_key, interleaved);
            self.deliver(complete);
        }
    }

    fn deliver(&mut self, partial: PartialMessage) {
        self.n_bytes = self.n_bytes.saturating_sub(partial.num_bytes());
        self.ready.push(partial.assemble());
    }

    /// Messages assembled since the last call, in delivery order.
    pub(crate) fn take_ready(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.ready)
    }

    /// FORWARD-TSN: drop partial ordered messages at or before the given
    /// SSN and advance the delivery cursor past it.
    pub(crate) fn handle_forward_ordered(&mut self, stream_id: u16, ssn: u16) {
        let stream = self.streams.entry(stream_id).or_default();
        let mut dropped = 0usize;
        stream.ordered.retain(|p| {
            if sna16lte(p.key as u16, ssn) && !p.is_complete() {
                dropped += p.num_bytes();
                false
            } else {
                true
            }
        });
        self.n_bytes = self.n_bytes.saturating_sub(dropped);
        if sna16lte(stream.next_key as u16, ssn) {
            stream.next_key = u32::from(ssn.wrapping_add(1));
        }
        self.deliver_ordered(stream_id);
    }

    /// I-FORWARD-TSN: the MID-keyed variant of the above, also covering
    /// unordered messages.
    pub(crate) fn handle_forward_interleaved(
        &mut self,
        stream_id: u16,
        unordered: bool,
        mid: u32,
    ) {
        let stream = self.streams.entry(stream_id).or_default();
        let mut dropped = 0usize;
        let table = if unordered {
            &mut stream.unordered
        } else {
            &mut stream.ordered
        };
        table.retain(|p| {
            if sna32lte(p.key, mid) && !p.is_complete() {
                dropped += p.num_bytes();
                false
            } else {
                true
            }
        });
        self.n_bytes = self.n_bytes.saturating_sub(dropped);
        if !unordered && sna32lte(stream.next_key, mid) {
            stream.next_key = mid.wrapping_add(1);
        }
        if !unordered {
            self.deliver_ordered(stream_id);
        }
    }

    /// FORWARD-TSN for unordered DATA traffic: drop loose fragments at or
    /// before the new cumulative TSN.
    pub(crate) fn handle_forward_unordered(&mut self, new_cumulative_tsn: u32) {
        let mut dropped = 0usize;
        for stream in self.streams.values_mut() {
            stream.unordered_chunks.retain(|(tsn, d)| {
                if sna32lte(*tsn, new_cumulative_tsn) {
                    dropped += d.payload.len();
                    false
                } else {
                    true
                }
            });
        }
        self.n_bytes = self.n_bytes.saturating_sub(dropped);
    }

    /// An incoming stream reset: sequence numbers start over and partial
    /// state for the stream is dropped.
    pub(crate) fn reset_streams(&mut self, stream_ids: &[u16]) {
        let targets: Vec<u16> = if stream_ids.is_empty() {
            self.streams.keys().copied().collect()
        } else {
            stream_ids.to_vec()
        };
        for stream_id in targets {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                let dropped: usize = stream.ordered.iter().map(|p| p.num_bytes()).sum();
                self.n_bytes = self.n_bytes.saturating_sub(dropped);
                stream.ordered.clear();
                stream.next_key = 0;
            }
        }
    }

    /// Wipes everything, e.g. on association restart.
    pub(crate) fn flush(&mut self) {
        self.streams.clear();
        self.n_bytes = 0;
        self.ready.clear();
    }

    /// Per-stream delivery cursors for handover, as (stream id, next
    /// delivery key).
    pub(crate) fn stream_state(&self) -> Vec<(u16, u32)> {
        let mut out: Vec<(u16, u32)> = self
            .streams
            .iter()
            .map(|(id, s)| (*id, s.next_key))
            .collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    pub(crate) fn restore_stream_state(&mut self, state: &[(u16, u32)]) {
        for (id, next_key) in state {
            self.streams.entry(*id).or_default().next_key = *next_key;
        }
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

fn key_lt(a: u32, b: u32, interleaved: bool) -> bool {
    if interleaved {
        sna32lt(a, b)
    } else {
        sna16lt(a as u16, b as u16)
    }
}

fn next_key(key: u32, interleaved: bool) -> u32 {
    if interleaved {
        key.wrapping_add(1)
    } else {
        u32::from((key as u16).wrapping_add(1))
    }
}

fn find_or_insert(table: &mut Vec<PartialMessage>, key: u32) -> &mut PartialMessage {
    match table.binary_search_by(|p| serial_cmp(p.key, key)) {
        Ok(pos) => &mut table[pos],
        Err(pos) => {
            table.insert(pos, PartialMessage::new(key));
            &mut table[pos]
        }
    }
}

/// Finds a contiguous beginning..end TSN run in sorted loose fragments,
/// as (start index, length).
fn find_complete_run(chunks: &[(u32, Data)]) -> Option<(usize, usize)> {
    let mut start: Option<usize> = None;
    let mut last_tsn = 0u32;
    for (i, (tsn, d)) in chunks.iter().enumerate() {
        if d.is_beginning {
            start = Some(i);
            last_tsn = *tsn;
            if d.is_end {
                return Some((i, 1));
            }
            continue;
        }
        let Some(s) = start else {
            continue;
        };
        if *tsn != last_tsn.wrapping_add(1) {
            start = None;
            continue;
        }
        last_tsn = *tsn;
        if d.is_end {
            return Some((s, i - s + 1));
        }
    }
    None
}
