//! Impairment scenarios: under loss, duplication, and reordering the
//! protocol must still converge to exactly-once, in-order delivery.
//!
//! Impairment decisions are seeded and deterministic; only wall-clock
//! pacing (retransmission timers) is real.

use std::time::Duration;

use riptide_sim::link::{ImpairedLink, LinkConditions};
use riptide_sim::init_logging;
use riptide_transport::engine::{Engine, EngineConfig};

const DEADLINE: Duration = Duration::from_secs(30);
const TICK: Duration = Duration::from_millis(2);

/// Aggressive timers so lossy scenarios converge quickly.
fn fast_config() -> EngineConfig {
    EngineConfig {
        interval_ms: 10,
        nodelay: true,
        fast_resend: 2,
        ..Default::default()
    }
}

fn drain(engine: &mut Engine) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(size) = engine.peek_size() {
        let mut buf = vec![0u8; size];
        let n = engine.recv(&mut buf).expect("peeked message must read");
        buf.truncate(n);
        out.push(buf);
    }
    out
}

// ─── Loss ───────────────────────────────────────────────────────────────────

#[test]
fn lossy_link_delivers_everything_in_order() {
    init_logging();
    let conditions = LinkConditions {
        loss: 0.10,
        seed: 42,
        ..Default::default()
    };
    let mut link = ImpairedLink::new(1, conditions, fast_config()).unwrap();

    for i in 0..60u32 {
        link.a.send(format!("payload-{i:03}").as_bytes()).unwrap();
    }

    let mut delivered = Vec::new();
    let done = link
        .run_until(DEADLINE, TICK, |link| {
            delivered.extend(drain(&mut link.b));
            delivered.len() == 60
        })
        .unwrap();
    assert!(done, "delivered only {} of 60 before deadline", delivered.len());

    for (i, message) in delivered.iter().enumerate() {
        assert_eq!(message, format!("payload-{i:03}").as_bytes());
    }

    let stats = link.a.stats();
    assert!(
        stats.retransmissions + stats.fast_retransmissions > 0,
        "10% loss must force retransmission"
    );
}

// ─── Duplication ────────────────────────────────────────────────────────────

#[test]
fn duplicated_datagrams_deliver_exactly_once() {
    init_logging();
    let conditions = LinkConditions {
        duplicate: 0.30,
        seed: 7,
        ..Default::default()
    };
    let mut link = ImpairedLink::new(2, conditions, fast_config()).unwrap();

    for i in 0..40u32 {
        link.a.send(&i.to_le_bytes()).unwrap();
    }

    let mut delivered = Vec::new();
    let done = link
        .run_until(DEADLINE, TICK, |link| {
            delivered.extend(drain(&mut link.b));
            delivered.len() >= 40
        })
        .unwrap();
    assert!(done);
    assert_eq!(delivered.len(), 40, "duplicates must not surface twice");

    for (i, message) in delivered.iter().enumerate() {
        assert_eq!(message, &(i as u32).to_le_bytes());
    }
}

// ─── Reordering ─────────────────────────────────────────────────────────────

#[test]
fn reordered_datagrams_deliver_in_sequence() {
    init_logging();
    let conditions = LinkConditions {
        reorder: 0.50,
        seed: 1234,
        ..Default::default()
    };
    let mut link = ImpairedLink::new(3, conditions, fast_config()).unwrap();

    for i in 0..40u32 {
        link.a.send(format!("seq-{i}").as_bytes()).unwrap();
    }

    let mut delivered = Vec::new();
    let done = link
        .run_until(DEADLINE, TICK, |link| {
            delivered.extend(drain(&mut link.b));
            delivered.len() == 40
        })
        .unwrap();
    assert!(done);

    for (i, message) in delivered.iter().enumerate() {
        assert_eq!(message, format!("seq-{i}").as_bytes());
    }
}

// ─── Everything At Once ─────────────────────────────────────────────────────

#[test]
fn fragmented_messages_survive_mixed_impairment() {
    init_logging();
    let conditions = LinkConditions {
        loss: 0.05,
        duplicate: 0.05,
        reorder: 0.20,
        seed: 0xBEEF,
    };
    let mut link = ImpairedLink::new(4, conditions, fast_config()).unwrap();

    // Multi-fragment messages: 5000 bytes spans 4 segments at the default
    // MTU.
    let messages: Vec<Vec<u8>> = (0..15u8).map(|i| vec![i; 5_000]).collect();
    for message in &messages {
        link.a.send(message).unwrap();
    }

    let mut delivered = Vec::new();
    let done = link
        .run_until(DEADLINE, TICK, |link| {
            delivered.extend(drain(&mut link.b));
            delivered.len() == 15
        })
        .unwrap();
    assert!(done, "delivered only {} of 15 before deadline", delivered.len());
    assert_eq!(delivered, messages);
}
