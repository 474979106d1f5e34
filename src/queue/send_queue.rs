use std::collections::VecDeque;

use bytes::Bytes;
use fxhash::FxHashMap;

use super::{Data, DataToSend};
use crate::callbacks::TimeMs;
use crate::error::{Error, Result};
use crate::events::{EventQueue, SocketEvent};
use crate::message::{Message, SendOptions};

pub(crate) const DEFAULT_STREAM_PRIORITY: u16 = 256;

// Scale factor keeping the virtual time arithmetic in integers.
const WFQ_SCALE: u64 = 65536;

/// Lifecycle of a stream that is being reset. Messages that have not begun
/// transmission are discarded when pausing; a partially sent message is
/// finished first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StreamPauseState {
    NotPaused,
    /// Pause requested, a partially sent message still needs to drain.
    Pending,
    /// Excluded from scheduling, ready to be reset.
    Paused,
    /// A reset request naming this stream is in flight.
    Resetting,
}

#[derive(Debug)]
struct PendingMessage {
    ppid: crate::chunk::chunk_payload_data::PayloadProtocolIdentifier,
    payload: Bytes,
    unordered: bool,
    expires_at: Option<TimeMs>,
    max_retransmissions: Option<u32>,
    lifecycle_id: Option<crate::message::LifecycleId>,
    /// Bytes already handed out as fragments.
    progress: usize,
    /// Assigned on the first produced fragment.
    assigned: Option<AssignedIds>,
    next_fsn: u32,
}

#[derive(Debug, Copy, Clone)]
struct AssignedIds {
    ssn: u16,
    mid: u32,
}

impl PendingMessage {
    fn in_progress(&self) -> bool {
        self.progress > 0
    }

    fn remaining(&self) -> usize {
        self.payload.len() - self.progress
    }
}

#[derive(Debug)]
struct OutgoingStream {
    next_ssn: u16,
    next_ordered_mid: u32,
    next_unordered_mid: u32,
    priority: u16,
    pause_state: StreamPauseState,
    messages: VecDeque<PendingMessage>,
    buffered: usize,
    buffered_low_threshold: usize,
    virtual_time: u64,
}

impl Default for OutgoingStream {
    fn default() -> Self {
        OutgoingStream {
            next_ssn: 0,
            next_ordered_mid: 0,
            next_unordered_mid: 0,
            priority: DEFAULT_STREAM_PRIORITY,
            pause_state: StreamPauseState::NotPaused,
            messages: VecDeque::new(),
            buffered: 0,
            buffered_low_threshold: 0,
            virtual_time: 0,
        }
    }
}

impl OutgoingStream {
    /// A stream is schedulable while it is not paused, except that a
    /// partially sent message is always completed first.
    fn is_producible(&self) -> bool {
        match self.pause_state {
            StreamPauseState::NotPaused => !self.messages.is_empty(),
            StreamPauseState::Pending => {
                self.messages.front().is_some_and(|m| m.in_progress())
            }
            StreamPauseState::Paused | StreamPauseState::Resetting => false,
        }
    }
}

/// Buffers outgoing messages per stream, fragments them on demand and
/// schedules fragments across streams.
///
/// Without message interleaving the scheduler is round-robin over streams
/// and an entire message is sent before another stream gets a turn. With
/// interleaving negotiated it is weighted fair queuing: each stream keeps
/// a virtual time that advances by bytes/priority, and the stream with the
/// lowest virtual finish time produces next.
#[derive(Debug)]
pub(crate) struct SendQueue {
    max_send_buffer_size: usize,
    enable_interleaving: bool,
    streams: FxHashMap<u16, OutgoingStream>,
    /// Round-robin rotation of streams with pending data.
    rr_order: VecDeque<u16>,
    /// The stream that must produce next because its front message is
    /// partially sent (non-interleaved mode only).
    current: Option<u16>,
    total_buffered: usize,
    total_buffered_low_threshold: usize,
    virtual_time: u64,
}

impl SendQueue {
    pub(crate) fn new(max_send_buffer_size: usize) -> Self {
        SendQueue {
            max_send_buffer_size,
            enable_interleaving: false,
            streams: FxHashMap::default(),
            rr_order: VecDeque::new(),
            current: None,
            total_buffered: 0,
            total_buffered_low_threshold: 0,
            virtual_time: 0,
        }
    }

    pub(crate) fn set_interleaving(&mut self, enable: bool) {
        self.enable_interleaving = enable;
    }

    /// Enqueues a message. An empty payload is wire-encoded as one filler
    /// byte with the PPID swapped to its "empty" variant, preserving the
    /// semantically empty message end to end.
    pub(crate) fn add(&mut self, now: TimeMs, message: Message, opts: &SendOptions) -> Result<()> {
        let (ppid, payload) = if message.payload.is_empty() {
            (message.ppid.empty_variant(), Bytes::from_static(&[0]))
        } else {
            (message.ppid, message.payload)
        };

        if self.total_buffered + payload.len() > self.max_send_buffer_size {
            return Err(Error::ErrSendBufferFull);
        }

        let stream = self.streams.entry(message.stream_id).or_default();
        if stream.pause_state == StreamPauseState::Pending
            || stream.pause_state == StreamPauseState::Paused
            || stream.pause_state == StreamPauseState::Resetting
        {
            return Err(Error::ErrStreamResetting);
        }

        stream.buffered += payload.len();
        self.total_buffered += payload.len();
        stream.messages.push_back(PendingMessage {
            ppid,
            payload,
            unordered: opts.unordered,
            expires_at: opts.lifetime_ms.map(|l| now + l),
            max_retransmissions: opts.max_retransmissions,
            lifecycle_id: opts.lifecycle_id,
            progress: 0,
            assigned: None,
            next_fsn: 0,
        });
        if !self.rr_order.contains(&message.stream_id) {
            self.rr_order.push_back(message.stream_id);
        }
        Ok(())
    }

    /// True when any stream can produce a fragment.
    pub(crate) fn can_produce(&self) -> bool {
        self.streams.values().any(|s| s.is_producible())
    }

    /// Produces the next fragment of at most `max_size` payload bytes, or
    /// `None` when nothing can be sent. Expired messages that have not
    /// begun transmission are discarded here, without consuming an SSN or
    /// MID.
    pub(crate) fn produce(
        &mut self,
        now: TimeMs,
        max_size: usize,
        events: &mut EventQueue,
    ) -> Option<DataToSend> {
        loop {
            let stream_id = self.pick_stream()?;
            // Unwrap is fine: pick_stream only returns producible streams.
            let stream = self.streams.get_mut(&stream_id)?;

            // Expire the front message if its lifetime passed before the
            // first fragment went out.
            let expired = stream.messages.front().is_some_and(|m| {
                !m.in_progress() && m.expires_at.is_some_and(|at| now >= at)
            });
            if expired {
                let m = stream
                    .messages
                    .pop_front()
                    .expect("front checked right above");
                stream.buffered -= m.payload.len();
                let new_total = self.total_buffered - m.payload.len();
                Self::check_low_watermarks(
                    stream_id,
                    stream,
                    self.total_buffered,
                    new_total,
                    self.total_buffered_low_threshold,
                    events,
                );
                self.total_buffered = new_total;
                events.push(SocketEvent::SentMessageExpired(
                    stream_id,
                    m.ppid.into(),
                    true,
                ));
                if let Some(id) = m.lifecycle_id {
                    events.push(SocketEvent::LifecycleMessageExpired(id, false));
                    events.push(SocketEvent::LifecycleEnd(id));
                }
                continue;
            }

            let priority = stream.priority;
            let message = stream.messages.front_mut()?;

            if message.assigned.is_none() {
                let ids = if message.unordered {
                    let mid = stream.next_unordered_mid;
                    stream.next_unordered_mid = stream.next_unordered_mid.wrapping_add(1);
                    AssignedIds { ssn: 0, mid }
                } else {
                    let ssn = stream.next_ssn;
                    let mid = stream.next_ordered_mid;
                    stream.next_ordered_mid = stream.next_ordered_mid.wrapping_add(1);
                    AssignedIds { ssn, mid }
                };
                message.assigned = Some(ids);
            }
            let assigned = message.assigned.expect("assigned right above");

            let offset = message.progress;
            let take = message.remaining().min(max_size);
            let payload = message.payload.slice(offset..offset + take);
            stream.buffered -= take;
            let is_beginning = offset == 0;
            let is_end = offset + take == message.payload.len();
            let fsn = message.next_fsn;
            message.next_fsn += 1;
            message.progress += take;

            let data = DataToSend {
                data: Data {
                    stream_id,
                    ssn: assigned.ssn,
                    mid: assigned.mid,
                    fsn,
                    ppid: message.ppid,
                    payload,
                    unordered: message.unordered,
                    is_beginning,
                    is_end,
                },
                max_retransmissions: message.max_retransmissions,
                expires_at: message.expires_at,
                lifecycle_id: message.lifecycle_id,
            };

            if is_end {
                let m = stream.messages.pop_front().expect("front produced from");
                if !m.unordered {
                    stream.next_ssn = stream.next_ssn.wrapping_add(1);
                }
                if stream.pause_state == StreamPauseState::Pending {
                    stream.pause_state = StreamPauseState::Paused;
                }
                self.current = None;
                // Round-robin: the stream goes to the back of the line.
                if let Some(pos) = self.rr_order.iter().position(|s| *s == stream_id) {
                    self.rr_order.remove(pos);
                }
                if !stream.messages.is_empty() {
                    self.rr_order.push_back(stream_id);
                }
            } else {
                self.current = Some(stream_id);
            }

            // Advance the WFQ clock by the weighted cost of this fragment.
            let stream = self.streams.get_mut(&stream_id).expect("stream exists");
            stream.virtual_time += (take as u64) * WFQ_SCALE / u64::from(priority.max(1));
            if stream.virtual_time > self.virtual_time {
                self.virtual_time = stream.virtual_time;
            }

            let new_total = self.total_buffered - take;
            Self::check_low_watermarks(
                stream_id,
                stream,
                self.total_buffered,
                new_total,
                self.total_buffered_low_threshold,
                events,
            );
            self.total_buffered = new_total;
            if self.total_buffered == 0 {
                events.push(SocketEvent::OutgoingMessageBufferEmpty);
            }

            return Some(data);
        }
    }

    fn check_low_watermarks(
        stream_id: u16,
        stream: &mut OutgoingStream,
        old_total: usize,
        new_total: usize,
        total_threshold: usize,
        events: &mut EventQueue,
    ) {
        // `stream.buffered` has already been decremented by the caller.
        let new_stream = stream.buffered;
        let old_stream = new_stream + (old_total - new_total);
        if old_stream >= stream.buffered_low_threshold
            && new_stream < stream.buffered_low_threshold
        {
            events.push(SocketEvent::BufferedAmountLow(stream_id));
        }
        if old_total >= total_threshold && new_total < total_threshold {
            events.push(SocketEvent::TotalBufferedAmountLow);
        }
    }

    /// Chooses the stream that produces next. A partially sent message
    /// pins its stream in non-interleaved mode; otherwise round-robin or
    /// lowest virtual finish time, depending on the negotiated mode.
    fn pick_stream(&mut self) -> Option<u16> {
        if !self.enable_interleaving {
            if let Some(current) = self.current {
                if self
                    .streams
                    .get(&current)
                    .is_some_and(|s| s.messages.front().is_some_and(|m| m.in_progress()))
                {
                    return Some(current);
                }
                self.current = None;
            }
        }

        if self.enable_interleaving {
            self.streams
                .iter()
                .filter(|(_, s)| s.is_producible())
                .min_by_key(|(id, s)| (s.next_finish_time(), **id))
                .map(|(id, _)| *id)
        } else {
            // Rotate over the round-robin order, skipping streams that are
            // paused or empty.
            for _ in 0..self.rr_order.len() {
                let front = *self.rr_order.front()?;
                if self.streams.get(&front).is_some_and(|s| s.is_producible()) {
                    return Some(front);
                }
                self.rr_order.rotate_left(1);
            }
            None
        }
    }

    /// Drops the unsent remainder of a partially sent message, identified
    /// by its coordinate. Called when the retransmission queue abandons
    /// the message. Returns the message's PPID when something was
    /// discarded.
    pub(crate) fn discard(
        &mut self,
        stream_id: u16,
        unordered: bool,
        mid: u32,
        events: &mut EventQueue,
    ) -> bool {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return false;
        };
        let matches = stream.messages.front().is_some_and(|m| {
            m.in_progress()
                && m.unordered == unordered
                && m.assigned.is_some_and(|a| a.mid == mid)
        });
        if !matches {
            return false;
        }
        let m = stream.messages.pop_front().expect("front checked");
        let remaining = m.remaining();
        stream.buffered -= remaining;
        let new_total = self.total_buffered - remaining;
        Self::check_low_watermarks(
            stream_id,
            stream,
            self.total_buffered,
            new_total,
            self.total_buffered_low_threshold,
            events,
        );
        self.total_buffered = new_total;
        if self.current == Some(stream_id) {
            self.current = None;
        }
        if stream.pause_state == StreamPauseState::Pending {
            stream.pause_state = StreamPauseState::Paused;
        }
        true
    }

    /// Moves the listed streams toward `Paused`, discarding every message
    /// that has not begun transmission. A stream with a partially sent
    /// message stays `Pending` until that message has drained.
    pub(crate) fn pause_streams(&mut self, stream_ids: &[u16], events: &mut EventQueue) {
        for stream_id in stream_ids {
            let stream = self.streams.entry(*stream_id).or_default();
            let mut kept = VecDeque::new();
            let mut removed_bytes = 0usize;
            for m in stream.messages.drain(..) {
                if m.in_progress() {
                    kept.push_back(m);
                } else {
                    removed_bytes += m.payload.len();
                    events.push(SocketEvent::SentMessageExpired(
                        *stream_id,
                        m.ppid.into(),
                        true,
                    ));
                    if let Some(id) = m.lifecycle_id {
                        events.push(SocketEvent::LifecycleMessageExpired(id, false));
                        events.push(SocketEvent::LifecycleEnd(id));
                    }
                }
            }
            stream.messages = kept;
            stream.buffered -= removed_bytes;
            let new_total = self.total_buffered - removed_bytes;
            Self::check_low_watermarks(
                *stream_id,
                stream,
                self.total_buffered,
                new_total,
                self.total_buffered_low_threshold,
                events,
            );
            self.total_buffered = new_total;

            stream.pause_state = if stream.messages.is_empty() {
                StreamPauseState::Paused
            } else {
                StreamPauseState::Pending
            };
        }
    }

    /// True when every listed stream has fully drained its partial message
    /// and can be named in a reset request.
    pub(crate) fn streams_ready_to_reset(&self, stream_ids: &[u16]) -> bool {
        stream_ids.iter().all(|id| {
            self.streams
                .get(id)
                .map_or(true, |s| s.pause_state == StreamPauseState::Paused)
        })
    }

    /// Marks the listed streams as named in an in-flight reset request.
    pub(crate) fn start_resetting(&mut self, stream_ids: &[u16]) {
        for id in stream_ids {
            let stream = self.streams.entry(*id).or_default();
            stream.pause_state = StreamPauseState::Resetting;
        }
    }

    /// The peer accepted the reset: sequence numbers start over and the
    /// streams resume.
    pub(crate) fn commit_reset(&mut self, stream_ids: &[u16]) {
        for id in stream_ids {
            if let Some(stream) = self.streams.get_mut(id) {
                stream.next_ssn = 0;
                stream.next_ordered_mid = 0;
                stream.next_unordered_mid = 0;
                stream.pause_state = StreamPauseState::NotPaused;
            }
        }
    }

    /// The reset failed terminally: resume the streams without touching
    /// sequence numbers.
    pub(crate) fn rollback_reset(&mut self, stream_ids: &[u16]) {
        for id in stream_ids {
            if let Some(stream) = self.streams.get_mut(id) {
                stream.pause_state = StreamPauseState::NotPaused;
            }
        }
    }

    pub(crate) fn total_buffered_amount(&self) -> usize {
        self.total_buffered
    }

    pub(crate) fn buffered_amount(&self, stream_id: u16) -> usize {
        self.streams.get(&stream_id).map_or(0, |s| s.buffered)
    }

    pub(crate) fn set_buffered_amount_low_threshold(&mut self, stream_id: u16, bytes: usize) {
        self.streams.entry(stream_id).or_default().buffered_low_threshold = bytes;
    }

    pub(crate) fn set_total_buffered_amount_low_threshold(&mut self, bytes: usize) {
        self.total_buffered_low_threshold = bytes;
    }

    pub(crate) fn set_stream_priority(&mut self, stream_id: u16, priority: u16) {
        self.streams.entry(stream_id).or_default().priority = priority.max(1);
    }

    pub(crate) fn stream_priority(&self, stream_id: u16) -> u16 {
        self.streams
            .get(&stream_id)
            .map_or(DEFAULT_STREAM_PRIORITY, |s| s.priority)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.total_buffered == 0
    }

    /// Wipes all pending data, e.g. on association restart.
    pub(crate) fn flush(&mut self) {
        for stream in self.streams.values_mut() {
            stream.messages.clear();
            stream.buffered = 0;
        }
        self.total_buffered = 0;
        self.current = None;
        self.rr_order.clear();
    }

    /// Per-stream sequence state for handover, as
    /// (stream id, next ssn, next ordered mid, next unordered mid,
    /// priority).
    pub(crate) fn stream_state(&self) -> Vec<(u16, u16, u32, u32, u16)> {
        let mut out: Vec<(u16, u16, u32, u32, u16)> = self
            .streams
            .iter()
            .map(|(id, s)| {
                (
                    *id,
                    s.next_ssn,
                    s.next_ordered_mid,
                    s.next_unordered_mid,
                    s.priority,
                )
            })
            .collect();
        out.sort_unstable_by_key(|(id, ..)| *id);
        out
    }

    pub(crate) fn restore_stream_state(&mut self, state: &[(u16, u16, u32, u32, u16)]) {
        for (id, next_ssn, next_ordered_mid, next_unordered_mid, priority) in state {
            let stream = self.streams.entry(*id).or_default();
            stream.next_ssn = *next_ssn;
            stream.next_ordered_mid = *next_ordered_mid;
            stream.next_unordered_mid = *next_unordered_mid;
            stream.priority = *priority;
        }
    }
}

impl OutgoingStream {
    /// The virtual finish time of this stream's next fragment, used to
    /// order streams under weighted fair queuing. Cheaper fragments and
    /// higher priorities finish earlier.
    fn next_finish_time(&self) -> u64 {
        let next_bytes = self
            .messages
            .front()
            .map_or(0, |m| m.remaining())
            .min(1 << 16) as u64;
        self.virtual_time + next_bytes * WFQ_SCALE / u64::from(self.priority.max(1))
    }
}
