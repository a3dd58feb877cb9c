use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn gate_with_ttl(ttl_seconds: u64) -> DedupGate {
    DedupGate::new(&DedupConfig { ttl_seconds })
}

fn event(event_id: &str) -> InboundEvent {
    InboundEvent {
        event_id: event_id.to_string(),
        text: "what changed this week?".to_string(),
        channel: "C123".to_string(),
        ts: "1700000000.000100".to_string(),
        thread_ts: None,
    }
}

#[test]
fn first_delivery_is_admitted() {
    let gate = gate_with_ttl(60);
    assert_eq!(gate.admit("ev-1"), Admission::FirstSeen);
}

#[test]
fn redelivery_within_window_is_a_duplicate() {
    let gate = gate_with_ttl(60);
    assert_eq!(gate.admit("ev-1"), Admission::FirstSeen);
    assert_eq!(gate.admit("ev-1"), Admission::Duplicate);
    assert_eq!(gate.admit("ev-1"), Admission::Duplicate);
}

#[test]
fn distinct_event_ids_do_not_interfere() {
    let gate = gate_with_ttl(60);
    assert_eq!(gate.admit("ev-1"), Admission::FirstSeen);
    assert_eq!(gate.admit("ev-2"), Admission::FirstSeen);
}

#[test]
fn expired_entries_are_admitted_again() {
    let gate = gate_with_ttl(1);
    assert_eq!(gate.admit("ev-1"), Admission::FirstSeen);
    std::thread::sleep(Duration::from_millis(1100));
    assert_eq!(gate.admit("ev-1"), Admission::FirstSeen);
}

#[test]
fn retried_delivery_triggers_exactly_one_reply() {
    let gate = gate_with_ttl(60);
    let replies = AtomicUsize::new(0);

    // The platform retries the same event because the first handling was
    // slow. Both deliveries are acknowledged, only one produces a reply.
    for _ in 0..2 {
        handle_event(&gate, &event("ev-retry"), |_| {
            replies.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert_eq!(replies.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_deliveries_admit_exactly_one() {
    let gate = std::sync::Arc::new(gate_with_ttl(60));
    let admitted = std::sync::Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = std::sync::Arc::clone(&gate);
            let admitted = std::sync::Arc::clone(&admitted);
            std::thread::spawn(move || {
                if gate.admit("ev-race") == Admission::FirstSeen {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread joins");
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
}

#[test]
fn replies_thread_under_the_original_message() {
    let top_level = event("ev-1");
    assert_eq!(top_level.reply_thread_ts(), "1700000000.000100");

    let mut threaded = event("ev-2");
    threaded.thread_ts = Some("1699999999.000001".to_string());
    assert_eq!(threaded.reply_thread_ts(), "1699999999.000001");
}
