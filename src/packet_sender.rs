use std::collections::VecDeque;

use crate::callbacks::{PacketObserver, SendPacketStatus, SocketCallbacks, TimeMs};
use crate::timer::{TimerId, TimerManager, TimerOptions};

/// How long to wait before retrying after a temporary egress failure.
const RETRY_TIMER_DURATION_MS: u64 = 1;

/// The outbound packet path. Hands serialized packets to the host;
/// packets the host could not take right now wait in a small FIFO behind
/// a 1 ms retry timer and are flushed in order before fresh traffic.
/// Packets the host rejected permanently are dropped silently.
pub(crate) struct PacketSender {
    retry_queue: VecDeque<Vec<u8>>,
    retry_timer: TimerId,
}

impl PacketSender {
    pub(crate) fn new<C: SocketCallbacks>(
        callbacks: &mut C,
        timer_manager: &mut TimerManager,
    ) -> Self {
        let timeout = callbacks.create_timeout();
        let retry_timer = timer_manager.create_timer(
            "packet-retry",
            timeout,
            TimerOptions::new(RETRY_TIMER_DURATION_MS),
        );
        PacketSender {
            retry_queue: VecDeque::new(),
            retry_timer,
        }
    }

    pub(crate) fn retry_timer(&self) -> TimerId {
        self.retry_timer
    }

    /// Sends one packet, after flushing any queued ones so ordering is
    /// preserved. Returns true when this packet reached the host.
    pub(crate) fn send<C: SocketCallbacks>(
        &mut self,
        callbacks: &mut C,
        timer_manager: &mut TimerManager,
        observer: &mut Option<Box<dyn PacketObserver>>,
        now: TimeMs,
        payload: Vec<u8>,
    ) -> bool {
        if !self.flush(callbacks, timer_manager, observer, now) {
            self.enqueue_for_retry(timer_manager, payload);
            return false;
        }

        if let Some(observer) = observer {
            observer.on_sent_packet(now, &payload);
        }
        match callbacks.send_packet(&payload) {
            SendPacketStatus::Success => true,
            SendPacketStatus::TemporaryFailure => {
                self.enqueue_for_retry(timer_manager, payload);
                false
            }
            SendPacketStatus::Error => {
                log::warn!("discarding packet after permanent send failure");
                false
            }
        }
    }

    /// Attempts to drain the retry FIFO in order. Returns true when it is
    /// empty afterwards.
    pub(crate) fn flush<C: SocketCallbacks>(
        &mut self,
        callbacks: &mut C,
        timer_manager: &mut TimerManager,
        observer: &mut Option<Box<dyn PacketObserver>>,
        now: TimeMs,
    ) -> bool {
        while let Some(front) = self.retry_queue.front() {
            if let Some(observer) = observer {
                observer.on_sent_packet(now, front);
            }
            match callbacks.send_packet(front) {
                SendPacketStatus::Success => {
                    self.retry_queue.pop_front();
                }
                SendPacketStatus::TemporaryFailure => {
                    return false;
                }
                SendPacketStatus::Error => {
                    self.retry_queue.pop_front();
                    return false;
                }
            }
        }
        timer_manager.stop(self.retry_timer);
        true
    }

    fn enqueue_for_retry(&mut self, timer_manager: &mut TimerManager, payload: Vec<u8>) {
        self.retry_queue.push_back(payload);
        if !timer_manager.is_running(self.retry_timer) {
            timer_manager.start(self.retry_timer);
        }
    }

    pub(crate) fn has_queued_packets(&self) -> bool {
        !self.retry_queue.is_empty()
    }
}
