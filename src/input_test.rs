// ============================================================================
// Demux Reader Tests
// ============================================================================

use std::time::Duration;

use super::{Input, ReaderState};
use crate::config::FeedConfig;
use crate::error::OpenError;
use crate::metadata::NullFixer;
use crate::mock::{MockDemuxer, wait_until};
use crate::packet::SharedPacket;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> FeedConfig {
    FeedConfig::builder().locator("mock://source").build()
}

fn open(mock: MockDemuxer, config: FeedConfig) -> Input {
    Input::open(mock, &NullFixer, config).unwrap()
}

/// Pops the next packet, waiting for the read task to produce one.
async fn pop_wait(input: &Input) -> SharedPacket {
    loop {
        if let Some(packet) = input.try_pop() {
            return packet;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

// ------------------------------------------------------------------------
// Open
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_open_rejects_unsupported_options() {
    let mock = MockDemuxer::video_only(10).reject_options(&["video_size", "pixel_format"]);
    let config = FeedConfig::builder()
        .locator("mock://source")
        .option("video_size", "1280x720")
        .option("pixel_format", "yuv420p")
        .build();

    match Input::open(mock, &NullFixer, config) {
        Err(OpenError::UnsupportedOptions(keys)) => {
            assert_eq!(keys, "video_size, pixel_format");
        }
        Err(other) => panic!("expected UnsupportedOptions, got {other}"),
        Ok(_) => panic!("open unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_open_propagates_backend_failure() {
    let mock = MockDemuxer::video_only(10).fail_open("connection refused");

    match Input::open(mock, &NullFixer, config()) {
        Err(OpenError::Open { locator, source }) => {
            assert_eq!(locator, "mock://source");
            assert!(source.to_string().contains("connection refused"));
        }
        Err(other) => panic!("expected Open error, got {other}"),
        Ok(_) => panic!("open unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_out_bound_extends_by_margin() {
    // Requested bound far from the estimate: extend 50 frames past it.
    let mock = MockDemuxer::video_only(1000).estimate(1000);
    let config = FeedConfig::builder()
        .locator("mock://source")
        .out_frame(100)
        .build();

    let input = open(mock, config);
    assert_eq!(input.out_frame(), 150);
}

#[tokio::test]
async fn test_out_bound_snaps_to_estimate() {
    // Within 50 frames of the estimate: snap to the estimate.
    let mock = MockDemuxer::video_only(1000).estimate(1000);
    let config = FeedConfig::builder()
        .locator("mock://source")
        .out_frame(980)
        .build();

    let input = open(mock, config);
    assert_eq!(input.out_frame(), 1000);
}

// ------------------------------------------------------------------------
// Seek
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_initial_seek_emits_flush_marker_first() {
    let mock = MockDemuxer::video_only(200);
    let seeks = mock.seeks.clone();
    let config = FeedConfig::builder()
        .locator("mock://source")
        .in_frame(100)
        .build();
    let input = open(mock, config);

    // Seek issued at open, on the primary stream, bounded by the extremes.
    {
        let seeks = seeks.lock().unwrap();
        assert_eq!(seeks.len(), 1);
        assert_eq!(seeks[0].stream_index, 0);
        assert_eq!(seeks[0].min_ts, i64::MIN);
        assert_eq!(seeks[0].target_ts, 100); // 100 / 25fps in 1/25 time base
        assert_eq!(seeks[0].max_ts, i64::MAX);
    }

    let marker = pop_wait(&input).await;
    assert!(marker.is_flush());
    assert_eq!(marker.pos, 100);

    let first = pop_wait(&input).await;
    assert_eq!(first.pos, 100);
    let second = pop_wait(&input).await;
    assert_eq!(second.pos, 101);
}

#[tokio::test]
async fn test_seek_resumes_from_target() {
    init_logs();
    let mock = MockDemuxer::video_only(1000);
    let input = open(mock, config());

    // Let the reader fill up to the backpressure gate, then seek.
    wait_until("reader gated", || input.buffered_count() > 100).await;
    input.seek(500);

    // Packets buffered before the seek surface first, then the marker.
    let marker = loop {
        let packet = pop_wait(&input).await;
        if packet.is_flush() {
            break packet;
        }
    };
    assert_eq!(marker.pos, 500);

    let mut expected = 500;
    for _ in 0..10 {
        let packet = pop_wait(&input).await;
        assert!(!packet.is_flush());
        assert_eq!(packet.pos, expected);
        expected += 1;
    }
}

#[tokio::test]
async fn test_seek_after_stop_is_ignored() {
    let mock = MockDemuxer::video_only(3);
    let seeks = mock.seeks.clone();
    let input = open(mock, config());

    wait_until("reader drained", || input.eof()).await;
    input.seek(1);

    // No seek reaches the demuxer once the task has stopped.
    assert!(seeks.lock().unwrap().is_empty());
}

// ------------------------------------------------------------------------
// Backpressure
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_backpressure_count_gate() {
    let mock = MockDemuxer::video_only(10_000);
    let reads = mock.reads.clone();
    let input = open(mock, config());

    // Pauses once the unit count crosses the high threshold.
    wait_until("reader gated", || input.buffered_count() == 101).await;
    let stalled = reads.load(std::sync::atomic::Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(reads.load(std::sync::atomic::Ordering::Relaxed), stalled);

    // A single pop drops the count back under the gate and reading resumes.
    assert!(input.try_pop().is_some());
    wait_until("reader resumed", || {
        reads.load(std::sync::atomic::Ordering::Relaxed) > stalled
    })
    .await;
}

#[tokio::test]
async fn test_backpressure_byte_gate_drains_to_low_count() {
    // 1.5 MB units: the byte total crosses 64 MB long before the count
    // gate, but pausing still waits for the 50-unit low threshold.
    let mock = MockDemuxer::video_only(10_000).unit_size(1_500_000);
    let reads = mock.reads.clone();
    let input = open(mock, config());

    wait_until("reader gated", || input.buffered_count() == 51).await;
    assert!(input.buffered_bytes() > 64_000_000);
    let stalled = reads.load(std::sync::atomic::Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(reads.load(std::sync::atomic::Ordering::Relaxed), stalled);

    // Draining to the low threshold resumes reading.
    assert!(input.try_pop().is_some());
    wait_until("reader resumed", || {
        reads.load(std::sync::atomic::Ordering::Relaxed) > stalled
    })
    .await;
}

// ------------------------------------------------------------------------
// End of range
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_no_loop_emits_final_flush_and_stops() {
    let mock = MockDemuxer::video_only(5);
    let input = open(mock, config());

    for expected in 0..5 {
        let packet = pop_wait(&input).await;
        assert!(!packet.is_flush());
        assert_eq!(packet.pos, expected);
    }

    let marker = pop_wait(&input).await;
    assert!(marker.is_flush());
    assert_eq!(marker.pos, -1);

    wait_until("reader eof", || input.eof()).await;
    assert!(input.try_pop().is_none());
    assert_eq!(input.state(), ReaderState::Stopped);
}

#[tokio::test]
async fn test_out_bound_cuts_the_stream() {
    let mock = MockDemuxer::video_only(1000).estimate(1000);
    let config = FeedConfig::builder()
        .locator("mock://source")
        .out_frame(100)
        .build();
    let input = open(mock, config);

    // Bound adjusted to 150; exactly that many packets surface.
    for expected in 0..150 {
        let packet = pop_wait(&input).await;
        assert_eq!(packet.pos, expected);
    }
    let marker = pop_wait(&input).await;
    assert!(marker.is_flush());
    assert_eq!(marker.pos, -1);
}

#[tokio::test]
async fn test_loop_restarts_at_in_bound() {
    init_logs();
    let mock = MockDemuxer::video_only(5);
    let config = FeedConfig::builder()
        .locator("mock://source")
        .looping(true)
        .build();
    let input = open(mock, config);

    // Two full passes: packets 0..5, a seek marker back to 0, packets again.
    for pass in 0..2 {
        for expected in 0..5 {
            let packet = pop_wait(&input).await;
            assert!(!packet.is_flush(), "pass {pass}");
            assert_eq!(packet.pos, expected, "pass {pass}");
        }
        let marker = pop_wait(&input).await;
        assert!(marker.is_flush(), "pass {pass}");
        assert_eq!(marker.pos, 0, "pass {pass}");
    }

    // The reader never stops while looping.
    assert!(!input.eof());
    assert!(matches!(
        input.state(),
        ReaderState::Reading | ReaderState::Seeking
    ));
}

// ------------------------------------------------------------------------
// Failure semantics
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_fatal_read_stops_without_marker() {
    let mock = MockDemuxer::video_only(100).fail_read_at(3);
    let input = open(mock, config());

    wait_until("reader failed", || input.eof()).await;
    assert_eq!(input.state(), ReaderState::Failed);

    // The two packets read before the failure are still delivered; no flush
    // marker follows a fail-stop.
    assert_eq!(pop_wait(&input).await.pos, 0);
    assert_eq!(pop_wait(&input).await.pos, 1);
    assert!(input.try_pop().is_none());
    assert_eq!(input.state(), ReaderState::Failed);
}

#[tokio::test]
async fn test_stop_releases_the_reader() {
    let mock = MockDemuxer::video_only(10_000);
    let input = open(mock, config());

    input.stop();
    wait_until("reader stopped", || input.eof()).await;
    assert_eq!(input.state(), ReaderState::Stopped);
}
