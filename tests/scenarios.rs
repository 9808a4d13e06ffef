//! End-to-end scenarios driven through `Engine::ingest`, matching the fragment
//! sequences used to validate the reassembly algorithm during design.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ip_reassembly::fragment::Fragment;
use ip_reassembly::{DropReason, Engine, EngineConfig, EngineError, IngestResult, NullNotifier, Notifier, ReassemblyKey};

fn key() -> ReassemblyKey {
    ReassemblyKey::new(42, 0x0a000001, 0x0a000002, 17)
}

fn raw(offset_units: u16, len: usize, more: bool) -> ip_reassembly::RawFragment {
    ip_reassembly::fragment::RawFragment {
        key: key(),
        header_len: 20,
        more_fragments: more,
        fragment_offset_units: offset_units,
        payload: vec![0xCD; len],
        checksum_state: ip_reassembly::ChecksumState::Unnecessary,
        device_id: 7,
        timestamp: 1,
        accounted_size: len,
    }
}

fn engine() -> Arc<Engine> {
    Engine::new(EngineConfig::default(), Arc::new(NullNotifier)).unwrap()
}

fn delivered_payload_len(result: IngestResult) -> usize {
    match result {
        IngestResult::Delivered(datagram) => datagram.payload.len(),
        other => panic!("expected Delivered, got {other:?}"),
    }
}

#[tokio::test]
async fn s1_in_order_arrival_assembles() -> anyhow::Result<()> {
    let engine = engine();

    assert!(matches!(engine.ingest(raw(0, 1480, true))?, IngestResult::Pending));
    assert!(matches!(engine.ingest(raw(185, 1480, true))?, IngestResult::Pending));
    let result = engine.ingest(raw(370, 40, false))?;
    assert_eq!(delivered_payload_len(result), 3000);
    assert_eq!(engine.queue_count(), 0);
    assert_eq!(engine.stats().reasm_oks, 1);
    Ok(())
}

#[tokio::test]
async fn s2_reverse_order_arrival_assembles_identically() {
    let engine = engine();

    assert!(matches!(engine.ingest(raw(370, 40, false)).unwrap(), IngestResult::Pending));
    assert!(matches!(engine.ingest(raw(0, 1480, true)).unwrap(), IngestResult::Pending));
    let result = engine.ingest(raw(185, 1480, true)).unwrap();
    assert_eq!(delivered_payload_len(result), 3000);
    assert_eq!(engine.queue_count(), 0);
}

#[tokio::test]
async fn s3_full_overlap_replacement_keeps_one_copy_of_bytes() {
    let engine = engine();

    assert!(matches!(engine.ingest(raw(0, 800, true)).unwrap(), IngestResult::Pending));
    // Includes one queue descriptor's worth of overhead alongside the 800
    // fragment bytes; the descriptor is charged once at queue creation and
    // does not grow as more fragments arrive.
    let after_first = engine.memory_in_use();
    assert!(after_first >= 800);

    assert!(matches!(engine.ingest(raw(0, 1480, true)).unwrap(), IngestResult::Pending));
    // The 800-byte fragment was fully covered and its bytes released, so
    // accounted memory grows by exactly the 680-byte difference, not by the
    // full 1480 bytes of the replacement.
    assert_eq!(engine.memory_in_use(), after_first + 680);

    let result = engine.ingest(raw(185, 20, false)).unwrap();
    assert_eq!(delivered_payload_len(result), 1500);
}

#[tokio::test]
async fn s4_partial_right_overlap_trims_and_assembles() {
    let engine = engine();

    assert!(matches!(engine.ingest(raw(0, 1000, true)).unwrap(), IngestResult::Pending));
    assert!(matches!(engine.ingest(raw(100, 800, true)).unwrap(), IngestResult::Pending));
    let result = engine.ingest(raw(200, 100, false)).unwrap();
    assert_eq!(delivered_payload_len(result), 1700);
}

/// The Engine checks completeness once per `ingest` call and reassembles
/// immediately when it is satisfied, exactly as the reference algorithm's
/// single per-packet completeness check does. With this fragment order the
/// datagram is already complete (and the queue already killed) after the
/// *second* fragment, so the contradictory third fragment lands in a brand
/// new queue for the same key rather than being evaluated against the one
/// that was delivered. See DESIGN.md's Open Question resolutions.
#[tokio::test]
async fn s5_contradictory_terminator_does_not_corrupt_the_delivered_datagram() {
    let engine = engine();

    assert!(matches!(engine.ingest(raw(0, 1480, true)).unwrap(), IngestResult::Pending));
    let result = engine.ingest(raw(185, 100, false)).unwrap();
    assert_eq!(delivered_payload_len(result), 1580);
    assert_eq!(engine.stats().reasm_oks, 1);

    // The third fragment starts a fresh, still-incomplete queue: it is
    // non-terminal and doesn't start at offset zero, so it can never
    // self-complete, and it must not be folded into the datagram already
    // delivered above.
    let third = engine.ingest(raw(200, 40, true)).unwrap();
    assert!(matches!(third, IngestResult::Pending));
    assert_eq!(engine.queue_count(), 1);
    assert_eq!(engine.stats().reasm_oks, 1);
}

#[tokio::test]
async fn s7_eviction_under_pressure_keeps_most_recent_queues() {
    let config = EngineConfig {
        high_watermark_bytes: 4096,
        low_watermark_bytes: 2048,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, Arc::new(NullNotifier)).unwrap();

    for id in 0..10u16 {
        let mut fragment = raw(0, 800, true);
        fragment.key = ReassemblyKey::new(id, 0x0a000001, 0x0a000002, 17);
        let result = engine.ingest(fragment).unwrap();
        assert!(matches!(result, IngestResult::Pending));
    }

    // Eviction must have run at least once: ten pending 800-byte queues
    // (8000 bytes of fragment data alone) cannot coexist under a 4096-byte
    // high watermark.
    assert!(engine.queue_count() < 10);
    assert!(engine.memory_in_use() <= config.low_watermark_bytes + 800 + 256);

    // The most recently admitted key must have survived eviction: finishing
    // its datagram with a terminal fragment must deliver the combined
    // payload, which is only possible if its first fragment is still there.
    let mut finisher = raw(100, 100, false);
    finisher.key = ReassemblyKey::new(9, 0x0a000001, 0x0a000002, 17);
    let result = engine.ingest(finisher).unwrap();
    assert_eq!(delivered_payload_len(result), 900);
}

#[tokio::test]
async fn s6_expiry_emits_icmp_notification_exactly_once() {
    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<u32>>,
    }
    impl Notifier for RecordingNotifier {
        fn on_expiry_notify(&self, fragment: &Fragment) {
            self.calls.lock().unwrap().push(fragment.device_id);
        }
    }

    // Install a subscriber so `tracing::instrument`/`tracing::debug!` output
    // from `Engine` is visible when diagnosing a failing run, the same way
    // `elvis-core::logging::init_events` installs one for the simulation.
    // Ignored if another test in this binary already installed one first.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tokio::time::pause();
    let notifier = Arc::new(RecordingNotifier::default());
    let config = EngineConfig {
        frag_ttl: Duration::from_secs(30),
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, notifier.clone()).unwrap();

    assert!(matches!(engine.ingest(raw(0, 1480, true)).unwrap(), IngestResult::Pending));

    tokio::time::advance(Duration::from_secs(31)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    assert_eq!(notifier.calls.lock().unwrap().as_slice(), &[7]);
    assert_eq!(engine.queue_count(), 0);
    assert_eq!(engine.stats().reasm_timeout, 1);
    assert_eq!(engine.stats().reasm_fails, 1);
}

#[tokio::test]
async fn non_fragment_is_rejected() {
    let engine = engine();
    let whole_datagram = raw(0, 100, false);
    assert_eq!(engine.ingest(whole_datagram).unwrap_err(), EngineError::NotAFragment);
}

#[test]
fn invalid_watermarks_are_rejected_at_construction() -> anyhow::Result<()> {
    let config = EngineConfig {
        high_watermark_bytes: 100,
        low_watermark_bytes: 100,
        ..EngineConfig::default()
    };
    let Err(err) = Engine::new(config, Arc::new(NullNotifier)) else {
        anyhow::bail!("expected construction to fail");
    };
    assert_eq!(
        err,
        EngineError::InvalidWatermarks { low: 100, high: 100 }
    );
    Ok(())
}

#[test]
fn non_power_of_two_bucket_count_is_rejected() -> anyhow::Result<()> {
    let config = EngineConfig {
        bucket_count: 63,
        ..EngineConfig::default()
    };
    let Err(err) = Engine::new(config, Arc::new(NullNotifier)) else {
        anyhow::bail!("expected construction to fail");
    };
    assert_eq!(err, EngineError::InvalidBucketCount(63));
    Ok(())
}

#[tokio::test]
async fn stats_snapshot_tracks_requests_and_outcomes() {
    let engine = engine();
    engine.ingest(raw(0, 1480, true)).unwrap();
    engine.ingest(raw(185, 1480, true)).unwrap();
    engine.ingest(raw(370, 40, false)).unwrap();

    let snapshot = engine.stats();
    assert_eq!(snapshot.reasm_reqds, 3);
    assert_eq!(snapshot.reasm_oks, 1);
    assert_eq!(snapshot.reasm_fails, 0);
}

#[tokio::test]
async fn flush_kills_pending_queues_without_notifying() {
    #[derive(Default)]
    struct PanicOnNotify;
    impl Notifier for PanicOnNotify {
        fn on_expiry_notify(&self, _fragment: &Fragment) {
            panic!("flush must not notify");
        }
    }

    let engine = Engine::new(EngineConfig::default(), Arc::new(PanicOnNotify)).unwrap();
    engine.ingest(raw(0, 1480, true)).unwrap();
    assert_eq!(engine.queue_count(), 1);

    engine.flush();
    assert_eq!(engine.queue_count(), 0);
    assert_eq!(engine.memory_in_use(), 0);
}

#[tokio::test]
async fn zero_length_fragment_is_dropped_without_disturbing_the_queue() {
    let engine = engine();
    let whole = raw(0, 40, true);
    let before = engine.memory_in_use();
    assert!(matches!(engine.ingest(whole).unwrap(), IngestResult::Pending));
    assert!(engine.memory_in_use() > before);

    // A zero-length fragment contributes nothing and is dropped outright.
    let mut zero = raw(5, 0, true);
    zero.key = key();
    let result = engine.ingest(zero).unwrap();
    assert!(matches!(result, IngestResult::Dropped(DropReason::ZeroLength)));
}
