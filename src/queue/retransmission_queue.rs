use std::collections::VecDeque;

use fxhash::FxHashMap;

use super::send_queue::SendQueue;
use super::{Data, DataToSend};
use crate::callbacks::{DurationMs, TimeMs};
use crate::chunk::chunk_forward_tsn::{ChunkForwardTsn, ChunkForwardTsnStream};
use crate::chunk::chunk_i_forward_tsn::{ChunkIForwardTsn, ChunkIForwardTsnStream};
use crate::chunk::chunk_selective_ack::ChunkSelectiveAck;
use crate::config::Options;
use crate::events::EventQueue;
use crate::message::LifecycleId;
use crate::util::*;

/// Number of duplicate nack reports that trigger a fast retransmission.
const FAST_RETRANSMIT_NACK_THRESHOLD: u32 = 3;

/// Lifecycle of one in-flight chunk.
///
/// ```text
///     +--(send)--> InFlight --(ack)-----> Acked
///                     |
///                     +--(gap-ack miss)--> Nacked --(3rd miss)--+
///                     |                                         v
///                     +--(T3 expiry)------------------> ToBeRetransmitted
///                     |                                         |
///                     +--(retries/lifetime out)--> Abandoned    +--> InFlight
/// ```
///
/// `Acked` and `Abandoned` are terminal; such entries linger only until
/// the cumulative ack advances past them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ChunkState {
    InFlight,
    Acked,
    Nacked,
    ToBeRetransmitted,
    Abandoned,
}

#[derive(Debug)]
pub(crate) struct InflightEntry {
    pub(crate) item: DataToSend,
    pub(crate) state: ChunkState,
    /// Transmissions so far, including the first.
    pub(crate) nsent: u32,
    /// When the chunk was first transmitted, for RTT sampling.
    pub(crate) since: TimeMs,
    pub(crate) miss_indicator: u32,
}

impl InflightEntry {
    fn payload_len(&self) -> usize {
        self.item.data.payload.len()
    }
}

/// What a processed SACK did, for the socket to act on.
#[derive(Debug, Default)]
pub(crate) struct SackOutcome {
    pub(crate) bytes_acked_total: usize,
    pub(crate) cumulative_ack_advanced: bool,
    /// RTT sample from the first newly acked chunk transmitted exactly
    /// once (Karn's rule).
    pub(crate) rtt: Option<DurationMs>,
    /// Messages fully acknowledged; their lifecycle ends.
    pub(crate) acked_lifecycles: Vec<LifecycleId>,
    /// Messages abandoned because their retransmission budget ran out.
    pub(crate) abandoned: Vec<AbandonedMessage>,
}

#[derive(Debug, Clone)]
pub(crate) struct AbandonedMessage {
    pub(crate) stream_id: u16,
    pub(crate) unordered: bool,
    pub(crate) mid: u32,
    pub(crate) ppid: u32,
    pub(crate) lifecycle_id: Option<LifecycleId>,
}

/// Tracks every chunk that has been handed to the wire, processes SACKs,
/// drives retransmissions and congestion control, enforces partial
/// reliability and generates (I-)FORWARD-TSN chunks.
#[derive(Debug)]
pub(crate) struct RetransmissionQueue {
    name: String,
    mtu: usize,
    slow_start_tcp_style: bool,
    enable_partial_reliability: bool,

    /// TSN the next fresh chunk will be stamped with.
    next_tsn: u32,
    /// Highest TSN the peer has cumulatively acknowledged.
    cumulative_tsn_ack_point: u32,
    /// Cumulative ack point advanced over abandoned chunks; what a
    /// FORWARD-TSN would announce.
    advanced_peer_tsn_ack_point: u32,
    /// Set when an abandoned run made `advanced_peer_tsn_ack_point` pass
    /// the cumulative ack.
    will_send_forward_tsn: bool,

    inflight: FxHashMap<u32, InflightEntry>,
    /// TSNs in serial order, oldest first.
    sorted: VecDeque<u32>,

    outstanding_bytes: usize,
    /// Peer's advertised receiver window.
    peer_rwnd: u32,

    cwnd: usize,
    ssthresh: usize,
    partial_bytes_acked: usize,
    in_fast_recovery: bool,
    fast_recovery_exit_point: u32,

    /// TSNs below this do not produce RTT samples; reset to `next_tsn`
    /// after each measurement so only one sample is taken per round trip.
    min_tsn_to_measure_rtt: u32,
}

impl RetransmissionQueue {
    pub(crate) fn new(name: &str, options: &Options, initial_tsn: u32, peer_rwnd: u32) -> Self {
        let mtu = options.mtu;
        RetransmissionQueue {
            name: name.to_owned(),
            mtu,
            slow_start_tcp_style: options.slow_start_tcp_style,
            enable_partial_reliability: options.enable_partial_reliability,
            next_tsn: initial_tsn,
            cumulative_tsn_ack_point: initial_tsn.wrapping_sub(1),
            advanced_peer_tsn_ack_point: initial_tsn.wrapping_sub(1),
            will_send_forward_tsn: false,
            inflight: FxHashMap::default(),
            sorted: VecDeque::new(),
            outstanding_bytes: 0,
            peer_rwnd,
            // RFC 4960 section 7.2.1 initial cwnd.
            cwnd: std::cmp::min(4 * mtu, std::cmp::max(2 * mtu, 4380)),
            ssthresh: u32::MAX as usize,
            partial_bytes_acked: 0,
            in_fast_recovery: false,
            fast_recovery_exit_point: 0,
            min_tsn_to_measure_rtt: initial_tsn,
        }
    }

    pub(crate) fn next_tsn(&self) -> u32 {
        self.next_tsn
    }

    /// The last TSN this sender assigned, as announced in reset requests.
    pub(crate) fn last_assigned_tsn(&self) -> u32 {
        self.next_tsn.wrapping_sub(1)
    }

    pub(crate) fn cumulative_tsn_ack_point(&self) -> u32 {
        self.cumulative_tsn_ack_point
    }

    pub(crate) fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub(crate) fn cwnd(&self) -> usize {
        self.cwnd
    }

    pub(crate) fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    pub(crate) fn peer_rwnd(&self) -> u32 {
        self.peer_rwnd
    }

    fn insert_sorted(&mut self, tsn: u32) {
        // Fresh TSNs are monotonically increasing, so this is a push.
        debug_assert!(self
            .sorted
            .back()
            .map_or(true, |back| sna32gt(tsn, *back)));
        self.sorted.push_back(tsn);
    }

    /// Processes a SACK. Returns `None` for a ghost ack: a cumulative ack
    /// behind what the peer already acknowledged changes no state.
    pub(crate) fn handle_sack(
        &mut self,
        now: TimeMs,
        sack: &ChunkSelectiveAck,
        has_pending_data: bool,
    ) -> Option<SackOutcome> {
        if sna32lt(sack.cumulative_tsn_ack, self.cumulative_tsn_ack_point) {
            log::debug!(
                "[{}] SACK: dropping ghost ack cumTSN={} behind {}",
                self.name,
                sack.cumulative_tsn_ack,
                self.cumulative_tsn_ack_point
            );
            return None;
        }

        let mut outcome = SackOutcome::default();
        let cumulative_ack_advanced =
            sna32gt(sack.cumulative_tsn_ack, self.cumulative_tsn_ack_point);
        outcome.cumulative_ack_advanced = cumulative_ack_advanced;
        self.peer_rwnd = sack.advertised_receiver_window_credit;

        // Everything at or before the cumulative ack leaves the queue.
        while let Some(&front) = self.sorted.front() {
            if !sna32lte(front, sack.cumulative_tsn_ack) {
                break;
            }
            self.sorted.pop_front();
            if let Some(entry) = self.inflight.remove(&front) {
                self.ack_entry(now, front, &entry, &mut outcome);
            }
        }

        // Mark chunks covered by gap ack blocks.
        let mut highest_tsn_newly_acked = sack.cumulative_tsn_ack;
        for block in &sack.gap_ack_blocks {
            for offset in block.start..=block.end {
                let tsn = sack.cumulative_tsn_ack.wrapping_add(u32::from(offset));
                let Some(entry) = self.inflight.get(&tsn) else {
                    continue;
                };
                if entry.state == ChunkState::Acked || entry.state == ChunkState::Abandoned {
                    continue;
                }
                let entry = self.inflight.remove(&tsn).expect("checked above");
                self.ack_entry(now, tsn, &entry, &mut outcome);
                self.inflight.insert(
                    tsn,
                    InflightEntry {
                        state: ChunkState::Acked,
                        ..entry
                    },
                );
                if sna32gt(tsn, highest_tsn_newly_acked) {
                    highest_tsn_newly_acked = tsn;
                }
            }
        }

        if cumulative_ack_advanced {
            self.cumulative_tsn_ack_point = sack.cumulative_tsn_ack;
            if sna32lt(self.advanced_peer_tsn_ack_point, self.cumulative_tsn_ack_point) {
                self.advanced_peer_tsn_ack_point = self.cumulative_tsn_ack_point;
            }
            self.grow_congestion_window(outcome.bytes_acked_total, has_pending_data);
        }

        if self.in_fast_recovery
            && sna32gte(sack.cumulative_tsn_ack, self.fast_recovery_exit_point)
        {
            log::debug!("[{}] exit fast-recovery", self.name);
            self.in_fast_recovery = false;
        }

        self.nack_between(
            now,
            sack.cumulative_tsn_ack,
            highest_tsn_newly_acked,
            cumulative_ack_advanced,
            &mut outcome,
        );

        self.recompute_outstanding();
        self.update_forward_tsn_point();

        log::trace!(
            "[{}] SACK done: cumTSN={} outstanding={} cwnd={} ssthresh={}",
            self.name,
            self.cumulative_tsn_ack_point,
            self.outstanding_bytes,
            self.cwnd,
            self.ssthresh
        );

        Some(outcome)
    }

    fn ack_entry(
        &mut self,
        now: TimeMs,
        tsn: u32,
        entry: &InflightEntry,
        outcome: &mut SackOutcome,
    ) {
        if entry.state == ChunkState::Acked || entry.state == ChunkState::Abandoned {
            return;
        }
        outcome.bytes_acked_total += entry.payload_len();

        if entry.nsent == 1
            && sna32gte(tsn, self.min_tsn_to_measure_rtt)
            && outcome.rtt.is_none()
        {
            self.min_tsn_to_measure_rtt = self.next_tsn;
            outcome.rtt = Some(now.saturating_sub(entry.since));
        }

        if entry.item.data.is_end {
            if let Some(id) = entry.item.lifecycle_id {
                outcome.acked_lifecycles.push(id);
            }
        }
    }

    /// The HTNA algorithm of RFC 4960 section 7.2.4: increment miss
    /// indicators for chunks the SACK reported missing, and enter fast
    /// recovery on the third report.
    fn nack_between(
        &mut self,
        now: TimeMs,
        cumulative_tsn_ack: u32,
        highest_tsn_newly_acked: u32,
        cumulative_ack_advanced: bool,
        outcome: &mut SackOutcome,
    ) {
        if self.in_fast_recovery && !cumulative_ack_advanced {
            return;
        }

        let max_tsn = if self.in_fast_recovery {
            // In fast recovery, count every missing chunk.
            self.sorted
                .back()
                .map_or(cumulative_tsn_ack, |b| b.wrapping_add(1))
        } else {
            // Otherwise only those before the highest newly acked TSN.
            highest_tsn_newly_acked
        };

        let mut to_retransmit: Vec<u32> = vec![];
        let mut entered_fast_recovery = false;
        let mut tsn = cumulative_tsn_ack.wrapping_add(1);
        while sna32lt(tsn, max_tsn) {
            if let Some(entry) = self.inflight.get_mut(&tsn) {
                if entry.state == ChunkState::InFlight || entry.state == ChunkState::Nacked {
                    entry.miss_indicator += 1;
                    entry.state = ChunkState::Nacked;
                    if entry.miss_indicator == FAST_RETRANSMIT_NACK_THRESHOLD {
                        to_retransmit.push(tsn);
                        if !self.in_fast_recovery {
                            entered_fast_recovery = true;
                        }
                    }
                }
            }
            tsn = tsn.wrapping_add(1);
        }

        if entered_fast_recovery {
            self.in_fast_recovery = true;
            self.fast_recovery_exit_point =
                self.sorted.back().copied().unwrap_or(highest_tsn_newly_acked);
            self.ssthresh = std::cmp::max(self.cwnd / 2, 2 * self.mtu);
            self.cwnd = self.ssthresh;
            self.partial_bytes_acked = 0;
            log::debug!(
                "[{}] fast retransmit: cwnd={} ssthresh={}",
                self.name,
                self.cwnd,
                self.ssthresh
            );
        }

        for tsn in to_retransmit {
            self.retransmit_or_abandon(now, tsn, outcome);
        }
    }

    /// Moves one chunk to `ToBeRetransmitted`, or abandons its whole
    /// message when its retransmission budget or lifetime is exhausted.
    fn retransmit_or_abandon(&mut self, now: TimeMs, tsn: u32, outcome: &mut SackOutcome) {
        let Some(entry) = self.inflight.get(&tsn) else {
            return;
        };
        if entry.state == ChunkState::Acked || entry.state == ChunkState::Abandoned {
            return;
        }

        if self.enable_partial_reliability {
            let exhausted = entry
                .item
                .max_retransmissions
                .is_some_and(|max| entry.nsent > max);
            let expired = entry.item.expires_at.is_some_and(|at| now >= at);
            if exhausted || expired {
                self.abandon_message(tsn, outcome);
                return;
            }
        }

        let entry = self.inflight.get_mut(&tsn).expect("probed above");
        entry.state = ChunkState::ToBeRetransmitted;
        entry.miss_indicator = 0;
    }

    /// Abandons every fragment of the message that `tsn` belongs to.
    /// Abandoned fragments are never retransmitted; they wait for a
    /// FORWARD-TSN to walk the peer past them.
    fn abandon_message(&mut self, tsn: u32, outcome: &mut SackOutcome) {
        let Some(key) = self.inflight.get(&tsn).map(|e| e.item.data.message_key()) else {
            return;
        };
        let mut record: Option<AbandonedMessage> = None;
        for (_, entry) in self.inflight.iter_mut() {
            if entry.item.data.message_key() != key
                || entry.state == ChunkState::Acked
                || entry.state == ChunkState::Abandoned
            {
                continue;
            }
            entry.state = ChunkState::Abandoned;
            if record.is_none() {
                record = Some(AbandonedMessage {
                    stream_id: entry.item.data.stream_id,
                    unordered: entry.item.data.unordered,
                    mid: entry.item.data.mid,
                    ppid: entry.item.data.ppid.into(),
                    lifecycle_id: entry.item.lifecycle_id,
                });
            }
        }
        if let Some(record) = record {
            log::debug!(
                "[{}] abandoning message stream={} mid={}",
                self.name,
                record.stream_id,
                record.mid
            );
            outcome.abandoned.push(record);
        }
    }

    fn grow_congestion_window(&mut self, bytes_acked: usize, has_pending_data: bool) {
        if self.cwnd <= self.ssthresh {
            // Slow start: grow only when the window is being used and we
            // are not in fast recovery.
            if !self.in_fast_recovery && has_pending_data {
                if self.slow_start_tcp_style {
                    self.cwnd += std::cmp::min(bytes_acked, self.cwnd);
                } else {
                    self.cwnd += std::cmp::min(bytes_acked, self.mtu);
                }
            }
        } else {
            // Congestion avoidance: one MTU per window of acked data.
            self.partial_bytes_acked += bytes_acked;
            if self.partial_bytes_acked >= self.cwnd && has_pending_data {
                self.partial_bytes_acked -= self.cwnd;
                self.cwnd += self.mtu;
            }
        }
    }

    /// T3-RTX fired: every chunk still in flight is eligible for
    /// retransmission, the window collapses to one MTU and the slow-start
    /// threshold halves.
    pub(crate) fn handle_t3_rtx_expiry(&mut self, now: TimeMs) -> SackOutcome {
        let mut outcome = SackOutcome::default();

        self.ssthresh = std::cmp::max(self.cwnd / 2, 2 * self.mtu);
        self.cwnd = self.mtu;
        self.partial_bytes_acked = 0;
        self.in_fast_recovery = false;

        let tsns: Vec<u32> = self.sorted.iter().copied().collect();
        for tsn in tsns {
            self.retransmit_or_abandon(now, tsn, &mut outcome);
        }
        self.recompute_outstanding();
        self.update_forward_tsn_point();
        log::debug!(
            "[{}] T3-rtx expired: cwnd={} ssthresh={} marked for rtx",
            self.name,
            self.cwnd,
            self.ssthresh
        );
        outcome
    }

    fn recompute_outstanding(&mut self) {
        self.outstanding_bytes = self
            .inflight
            .values()
            .filter(|e| e.state == ChunkState::InFlight || e.state == ChunkState::Nacked)
            .map(|e| e.payload_len())
            .sum();
    }

    /// Advances the would-be FORWARD-TSN point over abandoned chunks
    /// adjacent to the cumulative ack.
    fn update_forward_tsn_point(&mut self) {
        if !self.enable_partial_reliability {
            return;
        }
        let mut point = self.advanced_peer_tsn_ack_point;
        loop {
            let next = point.wrapping_add(1);
            match self.inflight.get(&next) {
                Some(e) if e.state == ChunkState::Abandoned => point = next,
                _ => break,
            }
        }
        if sna32gt(point, self.advanced_peer_tsn_ack_point) {
            self.advanced_peer_tsn_ack_point = point;
        }
        self.will_send_forward_tsn =
            sna32gt(self.advanced_peer_tsn_ack_point, self.cumulative_tsn_ack_point);
    }

    /// True when abandoned chunks block the cumulative ack and the peer
    /// needs a FORWARD-TSN to move past them.
    pub(crate) fn should_send_forward_tsn(&self) -> bool {
        self.will_send_forward_tsn
    }

    pub(crate) fn forward_tsn_sent(&mut self) {
        self.will_send_forward_tsn = false;
    }

    /// Builds the FORWARD-TSN for the current advanced ack point, listing
    /// the highest skipped SSN per ordered stream.
    pub(crate) fn create_forward_tsn(&self) -> ChunkForwardTsn {
        let mut stream_map: FxHashMap<u16, u16> = FxHashMap::default();
        for (tsn, entry) in &self.inflight {
            if entry.state != ChunkState::Abandoned
                || sna32gt(*tsn, self.advanced_peer_tsn_ack_point)
                || entry.item.data.unordered
            {
                continue;
            }
            let ssn = entry.item.data.ssn;
            stream_map
                .entry(entry.item.data.stream_id)
                .and_modify(|cur| {
                    if sna16lt(*cur, ssn) {
                        *cur = ssn;
                    }
                })
                .or_insert(ssn);
        }

        let mut streams: Vec<ChunkForwardTsnStream> = stream_map
            .into_iter()
            .map(|(identifier, sequence)| ChunkForwardTsnStream {
                identifier,
                sequence,
            })
            .collect();
        streams.sort_unstable_by_key(|s| s.identifier);

        ChunkForwardTsn {
            new_cumulative_tsn: self.advanced_peer_tsn_ack_point,
            streams,
        }
    }

    /// Builds the I-FORWARD-TSN for the current advanced ack point,
    /// listing the highest skipped MID per (stream, unordered) pair.
    pub(crate) fn create_i_forward_tsn(&self) -> ChunkIForwardTsn {
        let mut stream_map: FxHashMap<(u16, bool), u32> = FxHashMap::default();
        for (tsn, entry) in &self.inflight {
            if entry.state != ChunkState::Abandoned
                || sna32gt(*tsn, self.advanced_peer_tsn_ack_point)
            {
                continue;
            }
            let mid = entry.item.data.mid;
            stream_map
                .entry((entry.item.data.stream_id, entry.item.data.unordered))
                .and_modify(|cur| {
                    if sna32lt(*cur, mid) {
                        *cur = mid;
                    }
                })
                .or_insert(mid);
        }

        let mut streams: Vec<ChunkIForwardTsnStream> = stream_map
            .into_iter()
            .map(|((identifier, unordered), message_identifier)| ChunkIForwardTsnStream {
                identifier,
                unordered,
                message_identifier,
            })
            .collect();
        streams.sort_unstable_by_key(|s| (s.identifier, s.unordered));

        ChunkIForwardTsn {
            new_cumulative_tsn: self.advanced_peer_tsn_ack_point,
            streams,
        }
    }

    /// Produces the chunks to put in the next packet: first queued
    /// retransmissions in TSN order, then fresh fragments pulled from the
    /// send queue and stamped with new TSNs. `max_bytes` is the room left
    /// in the packet; `chunk_overhead` the per-chunk header size on the
    /// wire.
    pub(crate) fn get_chunks_to_send(
        &mut self,
        now: TimeMs,
        max_bytes: usize,
        chunk_overhead: usize,
        send_queue: &mut SendQueue,
        events: &mut EventQueue,
    ) -> Vec<(u32, Data)> {
        let mut chunks: Vec<(u32, Data)> = vec![];
        let mut remaining = max_bytes;

        // Retransmissions first, in TSN order, within the congestion
        // window.
        let rtx_tsns: Vec<u32> = self
            .sorted
            .iter()
            .copied()
            .filter(|tsn| {
                self.inflight
                    .get(tsn)
                    .is_some_and(|e| e.state == ChunkState::ToBeRetransmitted)
            })
            .collect();
        for tsn in rtx_tsns {
            if self.outstanding_bytes >= self.cwnd {
                break;
            }
            let entry = self.inflight.get_mut(&tsn).expect("filtered on presence");
            let wire_size = chunk_overhead + entry.payload_len();
            let padded = wire_size + get_padding_size(wire_size);
            if padded > remaining {
                break;
            }
            remaining -= padded;
            entry.state = ChunkState::InFlight;
            entry.nsent += 1;
            entry.miss_indicator = 0;
            self.outstanding_bytes += entry.item.data.payload.len();
            log::trace!("[{}] retransmitting tsn={}", self.name, tsn);
            chunks.push((tsn, entry.item.data.clone()));
        }

        // Then fresh data, while the congestion and receiver windows
        // allow.
        loop {
            if remaining <= chunk_overhead + 16 {
                break;
            }
            if self.outstanding_bytes >= self.cwnd {
                break;
            }
            // Zero window probe: one chunk may go out against a closed
            // receiver window, but only when nothing else is in flight.
            if self.outstanding_bytes >= self.peer_rwnd as usize && self.outstanding_bytes > 0 {
                break;
            }
            let max_fragment = remaining - chunk_overhead;
            let Some(item) = send_queue.produce(now, max_fragment, events) else {
                break;
            };

            let tsn = self.next_tsn;
            self.next_tsn = self.next_tsn.wrapping_add(1);

            let wire_size = chunk_overhead + item.data.payload.len();
            remaining -= std::cmp::min(remaining, wire_size + get_padding_size(wire_size));
            self.outstanding_bytes += item.data.payload.len();
            let data = item.data.clone();
            self.inflight.insert(
                tsn,
                InflightEntry {
                    item,
                    state: ChunkState::InFlight,
                    nsent: 1,
                    since: now,
                    miss_indicator: 0,
                },
            );
            self.insert_sorted(tsn);
            chunks.push((tsn, data));
        }

        chunks
    }

    /// True when anything is awaiting retransmission.
    pub(crate) fn has_chunks_to_retransmit(&self) -> bool {
        self.inflight
            .values()
            .any(|e| e.state == ChunkState::ToBeRetransmitted)
    }

    /// Looks up the state of a TSN, for tests and invariant checks.
    #[cfg(test)]
    pub(crate) fn chunk_state(&self, tsn: u32) -> Option<ChunkState> {
        self.inflight.get(&tsn).map(|e| e.state)
    }
}
