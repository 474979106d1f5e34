use crate::events::{EventQueue, SocketEvent};
use crate::param::param_outgoing_reset_request::ParamOutgoingResetRequest;
use crate::param::param_reconfig_response::{ParamReconfigResponse, ReconfigResult};
use crate::queue::reassembly_queue::ReassemblyQueue;
use crate::queue::send_queue::SendQueue;
use crate::util::{sna32gt, sna32lte};

/// What the association should do after a reconfiguration event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ResetResponseOutcome {
    /// Nothing further; stop the reconfig retry timer if running.
    Done,
    /// The peer is not ready yet; retry the request after a timer.
    RetryLater,
}

/// Negotiates outgoing stream resets (RFC 6525) and applies incoming
/// ones. Logically, resetting a stream closes a data channel.
///
/// Exactly one outgoing request may be outstanding; streams asked to
/// reset while one is in flight wait in line. Streams are first paused in
/// the send queue, and the request is only sent once every named stream
/// has drained its partially sent message.
#[derive(Debug)]
pub(crate) struct StreamResetHandler {
    name: String,
    /// Sequence number of the next outgoing request.
    next_outgoing_req_seq: u32,
    /// The next request sequence number expected from the peer.
    next_incoming_req_seq: u32,
    /// Streams named in the in-flight request.
    outstanding: Option<OutstandingRequest>,
    /// Streams waiting for the next request.
    queued: Vec<u16>,
    /// An incoming reset whose `sender_last_tsn` is still in the future,
    /// applied once the cumulative TSN catches up.
    deferred_incoming: Option<ParamOutgoingResetRequest>,
}

#[derive(Debug)]
struct OutstandingRequest {
    req_seq: u32,
    streams: Vec<u16>,
}

impl StreamResetHandler {
    pub(crate) fn new(name: &str, initial_req_seq: u32, peer_initial_req_seq: u32) -> Self {
        StreamResetHandler {
            name: name.to_owned(),
            next_outgoing_req_seq: initial_req_seq,
            next_incoming_req_seq: peer_initial_req_seq,
            outstanding: None,
            queued: Vec::new(),
            deferred_incoming: None,
        }
    }

    /// Queues streams for reset. The caller pauses them in the send
    /// queue.
    pub(crate) fn queue_reset(&mut self, stream_ids: &[u16]) {
        for id in stream_ids {
            if !self.queued.contains(id)
                && self
                    .outstanding
                    .as_ref()
                    .map_or(true, |o| !o.streams.contains(id))
            {
                self.queued.push(*id);
            }
        }
    }

    pub(crate) fn has_outstanding_request(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Builds the next reset request once the queued streams have drained,
    /// marking them `Resetting`. Returns `None` while a request is in
    /// flight or the streams are not ready.
    pub(crate) fn prepare_request(
        &mut self,
        last_assigned_tsn: u32,
        send_queue: &mut SendQueue,
    ) -> Option<ParamOutgoingResetRequest> {
        if self.outstanding.is_some() || self.queued.is_empty() {
            return None;
        }
        if !send_queue.streams_ready_to_reset(&self.queued) {
            return None;
        }

        let streams = std::mem::take(&mut self.queued);
        send_queue.start_resetting(&streams);
        let req_seq = self.next_outgoing_req_seq;
        self.next_outgoing_req_seq = self.next_outgoing_req_seq.wrapping_add(1);
        log::debug!(
            "[{}] sending reset request seq={} streams={:?}",
            self.name,
            req_seq,
            streams
        );
        let param = ParamOutgoingResetRequest {
            reconfig_request_sequence_number: req_seq,
            reconfig_response_sequence_number: self.next_incoming_req_seq.wrapping_sub(1),
            sender_last_tsn: last_assigned_tsn,
            stream_identifiers: streams.clone(),
        };
        self.outstanding = Some(OutstandingRequest { req_seq, streams });
        Some(param)
    }

    /// Re-sends the in-flight request verbatim, for the retry timer.
    pub(crate) fn retry_request(&self, last_assigned_tsn: u32) -> Option<ParamOutgoingResetRequest> {
        let outstanding = self.outstanding.as_ref()?;
        Some(ParamOutgoingResetRequest {
            reconfig_request_sequence_number: outstanding.req_seq,
            reconfig_response_sequence_number: self.next_incoming_req_seq.wrapping_sub(1),
            sender_last_tsn: last_assigned_tsn,
            stream_identifiers: outstanding.streams.clone(),
        })
    }

    /// Handles the peer's answer to our request.
    pub(crate) fn handle_response(
        &mut self,
        response: &ParamReconfigResponse,
        send_queue: &mut SendQueue,
        events: &mut EventQueue,
    ) -> ResetResponseOutcome {
        let Some(outstanding) = self.outstanding.as_ref() else {
            log::debug!("[{}] dropping response to no request", self.name);
            return ResetResponseOutcome::Done;
        };
        if response.reconfig_response_sequence_number != outstanding.req_seq {
            log::debug!(
                "[{}] response seq={} does not match outstanding seq={}",
                self.name,
                response.reconfig_response_sequence_number,
                outstanding.req_seq
            );
            return ResetResponseOutcome::Done;
        }

        match response.result {
            ReconfigResult::SuccessPerformed | ReconfigResult::SuccessNop => {
                let outstanding = self.outstanding.take().expect("probed above");
                send_queue.commit_reset(&outstanding.streams);
                events.push(SocketEvent::StreamsResetPerformed(outstanding.streams));
                ResetResponseOutcome::Done
            }
            ReconfigResult::InProgress => ResetResponseOutcome::RetryLater,
            result => {
                let outstanding = self.outstanding.take().expect("probed above");
                send_queue.rollback_reset(&outstanding.streams);
                events.push(SocketEvent::StreamsResetFailed(
                    outstanding.streams,
                    result.to_string(),
                ));
                ResetResponseOutcome::Done
            }
        }
    }

    /// Handles the peer's request to reset its outgoing streams, which are
    /// our incoming ones. Applied immediately when all data up to
    /// `sender_last_tsn` has arrived; deferred otherwise.
    pub(crate) fn handle_incoming_request(
        &mut self,
        request: &ParamOutgoingResetRequest,
        cumulative_received_tsn: u32,
        reassembly: &mut ReassemblyQueue,
        events: &mut EventQueue,
    ) -> ParamReconfigResponse {
        let req_seq = request.reconfig_request_sequence_number;
        if req_seq != self.next_incoming_req_seq {
            // A retransmitted request for something already handled gets a
            // benign answer; anything else is a sequence error.
            let result = if sna32gt(self.next_incoming_req_seq, req_seq) {
                ReconfigResult::SuccessNop
            } else {
                ReconfigResult::ErrorBadSequenceNumber
            };
            return ParamReconfigResponse {
                reconfig_response_sequence_number: req_seq,
                result,
            };
        }

        if sna32lte(request.sender_last_tsn, cumulative_received_tsn) {
            self.next_incoming_req_seq = self.next_incoming_req_seq.wrapping_add(1);
            reassembly.reset_streams(&request.stream_identifiers);
            events.push(SocketEvent::IncomingStreamsReset(
                request.stream_identifiers.clone(),
            ));
            ParamReconfigResponse {
                reconfig_response_sequence_number: req_seq,
                result: ReconfigResult::SuccessPerformed,
            }
        } else {
            log::debug!(
                "[{}] deferring incoming reset: last_tsn={} cum={}",
                self.name,
                request.sender_last_tsn,
                cumulative_received_tsn
            );
            self.deferred_incoming = Some(request.clone());
            ParamReconfigResponse {
                reconfig_response_sequence_number: req_seq,
                result: ReconfigResult::InProgress,
            }
        }
    }

    /// Applies a deferred incoming reset once the cumulative TSN caught
    /// up. Returns the streams that were reset.
    pub(crate) fn apply_deferred(
        &mut self,
        cumulative_received_tsn: u32,
        reassembly: &mut ReassemblyQueue,
        events: &mut EventQueue,
    ) {
        let ready = self
            .deferred_incoming
            .as_ref()
            .is_some_and(|r| sna32lte(r.sender_last_tsn, cumulative_received_tsn));
        if !ready {
            return;
        }
        let request = self.deferred_incoming.take().expect("probed above");
        self.next_incoming_req_seq = self.next_incoming_req_seq.wrapping_add(1);
        reassembly.reset_streams(&request.stream_identifiers);
        events.push(SocketEvent::IncomingStreamsReset(
            request.stream_identifiers,
        ));
    }

    pub(crate) fn next_outgoing_req_seq(&self) -> u32 {
        self.next_outgoing_req_seq
    }

    pub(crate) fn next_incoming_req_seq(&self) -> u32 {
        self.next_incoming_req_seq
    }
}
