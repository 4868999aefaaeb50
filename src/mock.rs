//! Scripted demuxer collaborator for the unit tests. Emits one unit per
//! stream per frame (streams with fewer frames drop out early), with
//! `pos`/`pts` equal to the frame number. The time base is `1/fps` with zero
//! start time, so seek target timestamps equal frame numbers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::demux::{Demuxer, InterruptGuard, OpenOptions, Opened, ReadOutcome};
use crate::error::DemuxError;
use crate::packet::Packet;
use crate::stream::{MediaKind, Rational, SourceInfo, StreamInfo};

#[derive(Clone, Copy, Debug)]
pub struct SeekRecord {
    pub stream_index: usize,
    pub min_ts: i64,
    pub target_ts: i64,
    pub max_ts: i64,
}

pub struct MockDemuxer {
    kinds: Vec<MediaKind>,
    /// Units available per stream, indexed like `kinds`.
    frames: Vec<u32>,
    unit_size: usize,
    fps: i32,
    duration_us: i64,
    estimate: u32,
    fail_open: Option<String>,
    rejected_options: Vec<String>,
    fail_read_at: Option<usize>,
    pub seeks: Arc<Mutex<Vec<SeekRecord>>>,
    pub reads: Arc<AtomicUsize>,
}

pub struct MockHandle {
    frame: u32,
    stream: usize,
}

impl MockDemuxer {
    pub fn new(kinds: Vec<MediaKind>) -> Self {
        let frames = vec![0; kinds.len()];
        Self {
            kinds,
            frames,
            unit_size: 4,
            fps: 25,
            duration_us: 10_000_000,
            estimate: 0,
            fail_open: None,
            rejected_options: Vec::new(),
            fail_read_at: None,
            seeks: Arc::new(Mutex::new(Vec::new())),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn video_only(frames: u32) -> Self {
        Self::new(vec![MediaKind::Video]).frames(vec![frames])
    }

    pub fn frames(mut self, frames: Vec<u32>) -> Self {
        assert_eq!(frames.len(), self.kinds.len());
        self.frames = frames;
        self
    }

    pub fn unit_size(mut self, size: usize) -> Self {
        self.unit_size = size;
        self
    }

    pub fn estimate(mut self, frames: u32) -> Self {
        self.estimate = frames;
        self
    }

    pub fn fail_open(mut self, message: &str) -> Self {
        self.fail_open = Some(message.to_string());
        self
    }

    pub fn reject_options(mut self, keys: &[&str]) -> Self {
        self.rejected_options = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// The n-th `read_next_unit` call (1-based) fails fatally.
    pub fn fail_read_at(mut self, call: usize) -> Self {
        self.fail_read_at = Some(call);
        self
    }

    fn max_frames(&self) -> u32 {
        self.frames.iter().copied().max().unwrap_or(0)
    }
}

impl Demuxer for MockDemuxer {
    type Handle = MockHandle;

    fn open(
        &mut self,
        _locator: &str,
        _options: &OpenOptions,
        _interrupt: Arc<InterruptGuard>,
    ) -> Result<Opened<MockHandle>, DemuxError> {
        if let Some(message) = &self.fail_open {
            return Err(DemuxError::Backend(message.clone()));
        }
        let mut opened = Opened::new(MockHandle {
            frame: 0,
            stream: 0,
        });
        opened.rejected_options = self.rejected_options.clone();
        Ok(opened)
    }

    fn read_next_unit(&mut self, handle: &mut MockHandle) -> ReadOutcome {
        let call = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_read_at == Some(call) {
            return ReadOutcome::Fatal(DemuxError::Backend("scripted read failure".to_string()));
        }
        loop {
            if handle.stream >= self.kinds.len() {
                handle.stream = 0;
                handle.frame += 1;
            }
            if handle.frame >= self.max_frames() {
                return ReadOutcome::TrueEnd;
            }
            let stream = handle.stream;
            handle.stream += 1;
            if handle.frame < self.frames[stream] {
                let frame = handle.frame as i64;
                return ReadOutcome::Unit(Packet::new(
                    stream,
                    Bytes::from(vec![0u8; self.unit_size]),
                    Some(frame),
                    Some(frame),
                    frame,
                ));
            }
        }
    }

    fn seek(
        &mut self,
        handle: &mut MockHandle,
        stream_index: usize,
        min_ts: i64,
        target_ts: i64,
        max_ts: i64,
    ) -> Result<(), DemuxError> {
        self.seeks.lock().unwrap().push(SeekRecord {
            stream_index,
            min_ts,
            target_ts,
            max_ts,
        });
        handle.frame = target_ts.max(0) as u32;
        handle.stream = 0;
        Ok(())
    }

    fn probe_stream_info(&mut self, _handle: &MockHandle) -> SourceInfo {
        let streams = self
            .kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| StreamInfo {
                index,
                kind: *kind,
                time_base: Rational::new(1, self.fps),
                start_time: 0,
                avg_frame_rate: Rational::new(self.fps, 1),
            })
            .collect();
        let primary_index = self
            .kinds
            .iter()
            .position(|k| *k == MediaKind::Video)
            .unwrap_or(0);
        SourceInfo {
            streams,
            primary_index,
            duration_us: self.duration_us,
        }
    }

    fn estimate_total_frames(&mut self, _handle: &MockHandle, _fps: f64) -> u32 {
        self.estimate
    }
}

/// Polls `cond` for up to five seconds before panicking.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
