use bytes::Bytes;

use super::data_tracker::DataTracker;
use super::reassembly_queue::ReassemblyQueue;
use super::retransmission_queue::{ChunkState, RetransmissionQueue};
use super::send_queue::SendQueue;
use super::Data;
use crate::chunk::chunk_payload_data::PayloadProtocolIdentifier;
use crate::chunk::chunk_selective_ack::{ChunkSelectiveAck, GapAckBlock};
use crate::config::Options;
use crate::error::Error;
use crate::events::{EventQueue, SocketEvent};
use crate::message::{Message, SendOptions};

fn msg(stream_id: u16, payload: &[u8]) -> Message {
    Message::new(
        stream_id,
        PayloadProtocolIdentifier::Binary,
        Bytes::copy_from_slice(payload),
    )
}

fn sack(cumulative_tsn_ack: u32, gaps: &[(u16, u16)]) -> ChunkSelectiveAck {
    ChunkSelectiveAck {
        cumulative_tsn_ack,
        advertised_receiver_window_credit: 1024 * 1024,
        gap_ack_blocks: gaps
            .iter()
            .map(|(start, end)| GapAckBlock {
                start: *start,
                end: *end,
            })
            .collect(),
        duplicate_tsn: vec![],
    }
}

// ----------------------------------------------------------------------
// Send queue

#[test]
fn test_send_queue_fragments_one_message() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    q.add(0, msg(1, &[0xab; 2500]), &SendOptions::default())
        .unwrap();

    let mut fragments = vec![];
    while let Some(item) = q.produce(0, 1000, &mut events) {
        fragments.push(item);
    }
    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].data.is_beginning);
    assert!(!fragments[0].data.is_end);
    assert!(!fragments[1].data.is_beginning);
    assert!(!fragments[1].data.is_end);
    assert!(fragments[2].data.is_end);
    assert_eq!(fragments[0].data.payload.len(), 1000);
    assert_eq!(fragments[2].data.payload.len(), 500);
    // One message: one SSN/MID, contiguous FSNs from 0.
    for (i, f) in fragments.iter().enumerate() {
        assert_eq!(f.data.ssn, 0);
        assert_eq!(f.data.mid, 0);
        assert_eq!(f.data.fsn, i as u32);
    }
    assert!(q.is_empty());
}

#[test]
fn test_send_queue_assigns_sequence_numbers_per_stream() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    q.add(0, msg(1, b"one"), &SendOptions::default()).unwrap();
    q.add(0, msg(1, b"two"), &SendOptions::default()).unwrap();
    let unordered = SendOptions {
        unordered: true,
        ..Default::default()
    };
    q.add(0, msg(1, b"three"), &unordered).unwrap();

    let a = q.produce(0, 100, &mut events).unwrap();
    let b = q.produce(0, 100, &mut events).unwrap();
    let c = q.produce(0, 100, &mut events).unwrap();
    assert_eq!((a.data.ssn, a.data.mid), (0, 0));
    assert_eq!((b.data.ssn, b.data.mid), (1, 1));
    // Unordered messages draw from their own MID space and carry no SSN.
    assert!(c.data.unordered);
    assert_eq!((c.data.ssn, c.data.mid), (0, 0));
}

#[test]
fn test_send_queue_empty_message_becomes_filler_byte() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    let message = Message::new(1, PayloadProtocolIdentifier::String, Bytes::new());
    q.add(0, message, &SendOptions::default()).unwrap();

    let item = q.produce(0, 100, &mut events).unwrap();
    assert_eq!(item.data.ppid, PayloadProtocolIdentifier::StringEmpty);
    assert_eq!(&item.data.payload[..], &[0]);
    assert!(item.data.is_beginning && item.data.is_end);
}

#[test]
fn test_send_queue_round_robin_finishes_message_first() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    for _ in 0..2 {
        q.add(0, msg(1, &[1; 250]), &SendOptions::default()).unwrap();
        q.add(0, msg(2, &[2; 250]), &SendOptions::default()).unwrap();
    }

    let mut order = vec![];
    while let Some(item) = q.produce(0, 100, &mut events) {
        order.push(item.data.stream_id);
    }
    // Entire messages go out before the scheduler rotates to the next
    // stream.
    assert_eq!(order, vec![1, 1, 1, 2, 2, 2, 1, 1, 1, 2, 2, 2]);
}

#[test]
fn test_send_queue_wfq_respects_priorities() {
    let mut q = SendQueue::new(1024 * 1024);
    q.set_interleaving(true);
    q.set_stream_priority(1, 100);
    q.set_stream_priority(2, 200);
    let mut events = EventQueue::default();
    for _ in 0..10 {
        q.add(0, msg(1, &[1; 100]), &SendOptions::default()).unwrap();
        q.add(0, msg(2, &[2; 100]), &SendOptions::default()).unwrap();
    }

    let mut counts = [0usize; 2];
    for _ in 0..15 {
        let item = q.produce(0, 100, &mut events).unwrap();
        counts[(item.data.stream_id - 1) as usize] += 1;
    }
    // Twice the priority, roughly twice the bytes.
    assert!(
        counts[1] > counts[0],
        "higher priority stream must get more bandwidth: {counts:?}"
    );
    assert!(counts[0] >= 3, "lower priority stream must not starve");
}

#[test]
fn test_send_queue_interleaves_messages_across_streams() {
    let mut q = SendQueue::new(1024 * 1024);
    q.set_interleaving(true);
    let mut events = EventQueue::default();
    q.add(0, msg(1, &[1; 300]), &SendOptions::default()).unwrap();
    q.add(0, msg(2, &[2; 300]), &SendOptions::default()).unwrap();

    let mut order = vec![];
    while let Some(item) = q.produce(0, 100, &mut events) {
        order.push(item.data.stream_id);
    }
    // With equal priorities the streams alternate mid-message.
    assert_eq!(order.len(), 6);
    assert!(
        order.windows(2).any(|w| w[0] != w[1]),
        "expected interleaving, got {order:?}"
    );
}

#[test]
fn test_send_queue_expires_unsent_message() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    let opts = SendOptions {
        lifetime_ms: Some(100),
        lifecycle_id: Some(7),
        ..Default::default()
    };
    q.add(1000, msg(1, b"doomed"), &opts).unwrap();
    q.add(1000, msg(1, b"alive"), &SendOptions::default()).unwrap();

    let item = q.produce(1100, 100, &mut events).unwrap();
    assert_eq!(&item.data.payload[..], b"alive");
    // The expired message consumed no SSN.
    assert_eq!(item.data.ssn, 0);

    let fired = events.take_all();
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::SentMessageExpired(1, _, true))));
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::LifecycleMessageExpired(7, false))));
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::LifecycleEnd(7))));
}

#[test]
fn test_send_queue_buffer_accounting() {
    let mut q = SendQueue::new(1000);
    let mut events = EventQueue::default();
    q.add(0, msg(1, &[0; 400]), &SendOptions::default()).unwrap();
    q.add(0, msg(2, &[0; 400]), &SendOptions::default()).unwrap();
    assert_eq!(q.total_buffered_amount(), 800);
    assert_eq!(q.buffered_amount(1), 400);
    assert_eq!(q.buffered_amount(2), 400);

    assert_eq!(
        q.add(0, msg(1, &[0; 400]), &SendOptions::default()),
        Err(Error::ErrSendBufferFull)
    );

    let item = q.produce(0, 150, &mut events).unwrap();
    assert_eq!(item.data.payload.len(), 150);
    assert_eq!(q.total_buffered_amount(), 650);
    assert_eq!(
        q.buffered_amount(1) + q.buffered_amount(2),
        q.total_buffered_amount()
    );
}

#[test]
fn test_send_queue_buffered_amount_low_events() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    q.set_buffered_amount_low_threshold(1, 100);
    q.set_total_buffered_amount_low_threshold(100);
    q.add(0, msg(1, &[0; 300]), &SendOptions::default()).unwrap();

    let _ = q.produce(0, 150, &mut events);
    assert!(events.take_all().is_empty(), "still above the watermark");

    let _ = q.produce(0, 150, &mut events);
    let fired = events.take_all();
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::BufferedAmountLow(1))));
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::TotalBufferedAmountLow)));
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::OutgoingMessageBufferEmpty)));
}

#[test]
fn test_send_queue_pause_discards_unsent_and_finishes_partial() {
    let mut q = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    q.add(0, msg(1, &[0; 250]), &SendOptions::default()).unwrap();
    q.add(0, msg(1, b"queued"), &SendOptions::default()).unwrap();

    // Begin the first message, then ask for the stream to be paused.
    let first = q.produce(0, 100, &mut events).unwrap();
    assert!(first.data.is_beginning);
    q.pause_streams(&[1], &mut events);
    assert!(!q.streams_ready_to_reset(&[1]), "partial message pending");

    // The queued-but-unstarted message was discarded.
    let fired = events.take_all();
    assert!(fired
        .iter()
        .any(|e| matches!(e, SocketEvent::SentMessageExpired(1, _, true))));

    // The partial message still drains.
    let mut last = None;
    while let Some(item) = q.produce(0, 100, &mut events) {
        last = Some(item);
    }
    assert!(last.expect("partial message completes").data.is_end);
    assert!(q.streams_ready_to_reset(&[1]));

    // After the reset the stream starts over at SSN 0.
    q.start_resetting(&[1]);
    q.commit_reset(&[1]);
    q.add(0, msg(1, b"fresh"), &SendOptions::default()).unwrap();
    let fresh = q.produce(0, 100, &mut events).unwrap();
    assert_eq!(fresh.data.ssn, 0);
    assert_eq!(fresh.data.mid, 0);
}

// ----------------------------------------------------------------------
// Retransmission queue

fn filled_queue(
    initial_tsn: u32,
    payload_sizes: &[usize],
) -> (RetransmissionQueue, SendQueue, EventQueue) {
    let options = Options::default();
    let mut tx = RetransmissionQueue::new("test", &options, initial_tsn, 1024 * 1024);
    let mut sq = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    for size in payload_sizes {
        sq.add(0, msg(1, &vec![0xaa; *size]), &SendOptions::default())
            .unwrap();
    }
    let chunks = tx.get_chunks_to_send(0, usize::MAX / 2, 16, &mut sq, &mut events);
    assert_eq!(chunks.len(), payload_sizes.len());
    (tx, sq, events)
}

#[test]
fn test_rtx_stamps_monotonic_tsns() {
    let (mut tx, mut sq, mut events) = filled_queue(1000, &[100, 100]);
    sq.add(0, msg(1, &[0; 100]), &SendOptions::default()).unwrap();
    let chunks = tx.get_chunks_to_send(0, usize::MAX / 2, 16, &mut sq, &mut events);
    let tsns: Vec<u32> = chunks.iter().map(|(tsn, _)| *tsn).collect();
    assert_eq!(tsns, vec![1002], "fresh TSNs continue where stamping left off");
    assert_eq!(tx.next_tsn(), 1003);
}

#[test]
fn test_rtx_cumulative_ack_empties_the_queue() {
    let (mut tx, _sq, _events) = filled_queue(100, &[100, 100, 100]);
    assert_eq!(tx.outstanding_bytes(), 300);

    let outcome = tx.handle_sack(10, &sack(102, &[]), false).unwrap();
    assert!(outcome.cumulative_ack_advanced);
    assert_eq!(outcome.bytes_acked_total, 300);
    assert_eq!(tx.outstanding_bytes(), 0);
    assert!(tx.is_empty());
}

#[test]
fn test_rtx_ghost_sack_is_rejected() {
    let (mut tx, _sq, _events) = filled_queue(100, &[100, 100]);
    assert!(tx.handle_sack(10, &sack(101, &[]), false).is_some());
    // A cumulative ack behind the previous one changes nothing.
    assert!(tx.handle_sack(20, &sack(100, &[]), false).is_none());
    assert_eq!(tx.cumulative_tsn_ack_point(), 101);
}

#[test]
fn test_rtx_rtt_sampled_from_once_transmitted_chunk() {
    let (mut tx, _sq, _events) = filled_queue(100, &[100]);
    let outcome = tx.handle_sack(250, &sack(100, &[]), false).unwrap();
    assert_eq!(outcome.rtt, Some(250));
}

#[test]
fn test_rtx_three_nacks_trigger_fast_retransmit() {
    let (mut tx, mut sq, mut events) = filled_queue(100, &[100, 100, 100, 100, 100]);

    // TSN 101 goes missing; three SACKs, each acknowledging newly
    // arrived data past the hole, report it missing.
    assert!(tx.handle_sack(0, &sack(100, &[(2, 2)]), false).is_some());
    assert_eq!(tx.chunk_state(101), Some(ChunkState::Nacked));
    assert!(tx.handle_sack(0, &sack(100, &[(2, 3)]), false).is_some());
    assert_eq!(tx.chunk_state(101), Some(ChunkState::Nacked));
    assert!(tx.handle_sack(0, &sack(100, &[(2, 4)]), false).is_some());
    assert_eq!(tx.chunk_state(101), Some(ChunkState::ToBeRetransmitted));

    // The loss shrank the window.
    assert_eq!(tx.ssthresh(), tx.cwnd());

    let chunks = tx.get_chunks_to_send(0, usize::MAX / 2, 16, &mut sq, &mut events);
    assert_eq!(chunks[0].0, 101, "retransmission keeps its TSN");
    assert_eq!(tx.chunk_state(101), Some(ChunkState::InFlight));
}

#[test]
fn test_rtx_t3_marks_everything_for_retransmission() {
    let (mut tx, mut sq, mut events) = filled_queue(100, &[100, 100]);
    let mtu = Options::default().mtu;

    let outcome = tx.handle_t3_rtx_expiry(1000);
    assert!(outcome.abandoned.is_empty());
    assert_eq!(tx.chunk_state(100), Some(ChunkState::ToBeRetransmitted));
    assert_eq!(tx.chunk_state(101), Some(ChunkState::ToBeRetransmitted));
    assert_eq!(tx.outstanding_bytes(), 0);
    assert_eq!(tx.cwnd(), mtu);

    let chunks = tx.get_chunks_to_send(1000, usize::MAX / 2, 16, &mut sq, &mut events);
    let tsns: Vec<u32> = chunks.iter().map(|(tsn, _)| *tsn).collect();
    assert_eq!(tsns, vec![100, 101], "retransmitted in TSN order");
}

#[test]
fn test_rtx_zero_max_retransmissions_abandons_on_t3() {
    let options = Options::default();
    let mut tx = RetransmissionQueue::new("test", &options, 100, 1024 * 1024);
    let mut sq = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    let opts = SendOptions {
        max_retransmissions: Some(0),
        ..Default::default()
    };
    sq.add(0, msg(1, &[0; 100]), &opts).unwrap();
    sq.add(0, msg(1, &[0; 100]), &SendOptions::default()).unwrap();
    let chunks = tx.get_chunks_to_send(0, usize::MAX / 2, 16, &mut sq, &mut events);
    assert_eq!(chunks.len(), 2);

    let outcome = tx.handle_t3_rtx_expiry(1000);
    assert_eq!(outcome.abandoned.len(), 1);
    assert_eq!(outcome.abandoned[0].stream_id, 1);
    assert_eq!(tx.chunk_state(100), Some(ChunkState::Abandoned));
    // The unconstrained message is still retransmittable.
    assert_eq!(tx.chunk_state(101), Some(ChunkState::ToBeRetransmitted));

    // The abandoned chunk sits right above the cumulative ack, so the
    // peer must be walked past it.
    assert!(tx.should_send_forward_tsn());
    let fwd = tx.create_forward_tsn();
    assert_eq!(fwd.new_cumulative_tsn, 100);
    assert_eq!(fwd.streams.len(), 1);
    assert_eq!(fwd.streams[0].identifier, 1);
    assert_eq!(fwd.streams[0].sequence, 0);

    // Nothing of the abandoned message is retransmitted.
    let chunks = tx.get_chunks_to_send(1000, usize::MAX / 2, 16, &mut sq, &mut events);
    let tsns: Vec<u32> = chunks.iter().map(|(tsn, _)| *tsn).collect();
    assert_eq!(tsns, vec![101]);
}

#[test]
fn test_rtx_respects_congestion_window() {
    let options = Options::default();
    let mut tx = RetransmissionQueue::new("test", &options, 0, 1024 * 1024);
    let mut sq = SendQueue::new(1024 * 1024);
    let mut events = EventQueue::default();
    for _ in 0..10 {
        sq.add(0, msg(1, &[0; 1000]), &SendOptions::default()).unwrap();
    }
    let chunks = tx.get_chunks_to_send(0, usize::MAX / 2, 16, &mut sq, &mut events);
    // Initial cwnd is min(4*MTU, max(2*MTU, 4380)) = 4380 bytes.
    assert_eq!(chunks.len(), 5);
    assert!(tx.outstanding_bytes() >= tx.cwnd());

    // No more until something is acked.
    assert!(tx
        .get_chunks_to_send(0, usize::MAX / 2, 16, &mut sq, &mut events)
        .is_empty());
}

// ----------------------------------------------------------------------
// Reassembly queue

fn data(
    stream_id: u16,
    ssn: u16,
    payload: &[u8],
    is_beginning: bool,
    is_end: bool,
) -> Data {
    Data {
        stream_id,
        ssn,
        mid: u32::from(ssn),
        fsn: 0,
        ppid: PayloadProtocolIdentifier::Binary,
        payload: Bytes::copy_from_slice(payload),
        unordered: false,
        is_beginning,
        is_end,
    }
}

#[test]
fn test_reassembly_delivers_in_order() {
    let mut q = ReassemblyQueue::new(1024);
    q.push(10, data(1, 0, b"first", true, true)).unwrap();
    q.push(11, data(1, 1, b"second", true, true)).unwrap();
    let ready = q.take_ready();
    assert_eq!(ready.len(), 2);
    assert_eq!(&ready[0].payload[..], b"first");
    assert_eq!(&ready[1].payload[..], b"second");
    assert!(q.is_empty());
}

#[test]
fn test_reassembly_holds_out_of_order_until_cursor() {
    let mut q = ReassemblyQueue::new(1024);
    q.push(11, data(1, 1, b"second", true, true)).unwrap();
    assert!(q.take_ready().is_empty(), "ssn 0 has not arrived");

    q.push(10, data(1, 0, b"first", true, true)).unwrap();
    let ready = q.take_ready();
    assert_eq!(ready.len(), 2);
    assert_eq!(&ready[0].payload[..], b"first");
    assert_eq!(&ready[1].payload[..], b"second");
}

#[test]
fn test_reassembly_assembles_fragments() {
    let mut q = ReassemblyQueue::new(1024);
    q.push(10, data(1, 0, b"AAA", true, false)).unwrap();
    q.push(12, data(1, 0, b"CCC", false, true)).unwrap();
    assert!(q.take_ready().is_empty(), "middle fragment missing");
    q.push(11, data(1, 0, b"BBB", false, false)).unwrap();
    let ready = q.take_ready();
    assert_eq!(ready.len(), 1);
    assert_eq!(&ready[0].payload[..], b"AAABBBCCC");
}

#[test]
fn test_reassembly_unordered_delivers_on_completion() {
    let mut q = ReassemblyQueue::new(1024);
    let mut d = data(1, 0, b"whenever", true, true);
    d.unordered = true;
    // Arrives way out of TSN order, delivered anyway.
    q.push(99, d).unwrap();
    let ready = q.take_ready();
    assert_eq!(ready.len(), 1);
    assert_eq!(&ready[0].payload[..], b"whenever");
}

#[test]
fn test_reassembly_forward_tsn_skips_partial_message() {
    let mut q = ReassemblyQueue::new(1024);
    // ssn 0 is incomplete (its end never arrives); ssn 1 is complete but
    // blocked.
    q.push(10, data(1, 0, b"lost", true, false)).unwrap();
    q.push(12, data(1, 1, b"kept", true, true)).unwrap();
    assert!(q.take_ready().is_empty());

    q.handle_forward_ordered(1, 0);
    let ready = q.take_ready();
    assert_eq!(ready.len(), 1);
    assert_eq!(&ready[0].payload[..], b"kept");
}

#[test]
fn test_reassembly_enforces_buffer_bound() {
    let mut q = ReassemblyQueue::new(10);
    assert_eq!(
        q.push(10, data(1, 0, &[0; 11], true, true)),
        Err(Error::ErrReceiveBufferExhausted)
    );
    assert_eq!(q.remaining_bytes(), 10);
}

#[test]
fn test_reassembly_empty_ppid_delivers_empty_payload() {
    let mut q = ReassemblyQueue::new(1024);
    let mut d = data(1, 0, &[0], true, true);
    d.ppid = PayloadProtocolIdentifier::StringEmpty;
    q.push(10, d).unwrap();
    let ready = q.take_ready();
    assert_eq!(ready.len(), 1);
    assert!(ready[0].payload.is_empty());
    assert_eq!(ready[0].ppid, PayloadProtocolIdentifier::StringEmpty);
}

#[test]
fn test_reassembly_interleaved_uses_mid_and_fsn() {
    let mut q = ReassemblyQueue::new(1024);
    q.set_interleaved(true);

    let frag = |mid: u32, fsn: u32, payload: &[u8], b: bool, e: bool| Data {
        stream_id: 1,
        ssn: 0,
        mid,
        fsn,
        ppid: PayloadProtocolIdentifier::Binary,
        payload: Bytes::copy_from_slice(payload),
        unordered: false,
        is_beginning: b,
        is_end: e,
    };

    // Fragments of two messages interleaved on one stream; TSNs are not
    // contiguous per message, FSNs are.
    q.push(10, frag(0, 0, b"a0", true, false)).unwrap();
    q.push(11, frag(1, 0, b"b0", true, false)).unwrap();
    q.push(12, frag(0, 1, b"a1", false, true)).unwrap();
    assert_eq!(q.take_ready().len(), 1, "message 0 is complete");
    q.push(13, frag(1, 1, b"b1", false, true)).unwrap();
    let ready = q.take_ready();
    assert_eq!(ready.len(), 1);
    assert_eq!(&ready[0].payload[..], b"b0b1");
}

#[test]
fn test_reassembly_stream_reset_restarts_numbering() {
    let mut q = ReassemblyQueue::new(1024);
    q.push(10, data(1, 0, b"a", true, true)).unwrap();
    assert_eq!(q.take_ready().len(), 1);

    q.reset_streams(&[1]);
    // The peer restarts at ssn 0 after the reset.
    q.push(20, data(1, 0, b"b", true, true)).unwrap();
    assert_eq!(q.take_ready().len(), 1);
}

// ----------------------------------------------------------------------
// Data tracker

#[test]
fn test_tracker_advances_in_order() {
    let mut t = DataTracker::new(100);
    assert_eq!(t.cumulative_received_tsn(), 99);
    assert!(t.observe(100, false));
    assert!(t.observe(101, false));
    assert_eq!(t.cumulative_received_tsn(), 101);
    assert!(!t.should_sack_immediately());
}

#[test]
fn test_tracker_gap_forces_immediate_sack() {
    let mut t = DataTracker::new(100);
    assert!(t.observe(100, false));
    assert!(t.observe(102, false));
    assert!(t.should_sack_immediately());
    assert!(t.has_gaps());

    let sack = t.create_sack(1000);
    assert_eq!(sack.cumulative_tsn_ack, 100);
    assert_eq!(sack.gap_ack_blocks, vec![GapAckBlock { start: 2, end: 2 }]);

    // Filling the hole drains the out-of-order set.
    assert!(t.observe(101, false));
    assert_eq!(t.cumulative_received_tsn(), 102);
    assert!(!t.has_gaps());
}

#[test]
fn test_tracker_duplicates_are_reported_once() {
    let mut t = DataTracker::new(100);
    assert!(t.observe(100, false));
    assert!(!t.observe(100, false), "duplicate is not new data");
    assert!(t.should_sack_immediately());
    let sack = t.create_sack(1000);
    assert_eq!(sack.duplicate_tsn, vec![100]);
    let sack = t.create_sack(1000);
    assert!(sack.duplicate_tsn.is_empty());
}

#[test]
fn test_tracker_acks_every_other_packet() {
    let mut t = DataTracker::new(100);
    assert!(t.observe(100, false));
    t.observe_packet_with_data();
    assert!(!t.should_sack_immediately());
    assert!(t.observe(101, false));
    t.observe_packet_with_data();
    assert!(t.should_sack_immediately());
}

#[test]
fn test_tracker_immediate_ack_flag() {
    let mut t = DataTracker::new(100);
    assert!(t.observe(100, true));
    assert!(t.should_sack_immediately());
}

#[test]
fn test_tracker_forward_tsn_advances_over_holes() {
    let mut t = DataTracker::new(100);
    assert!(t.observe(103, false));
    t.handle_forward_tsn(102);
    assert_eq!(t.cumulative_received_tsn(), 103, "abuts tsn 103");
    assert!(t.should_sack_immediately());
}
