use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::FeedConfig;
use crate::demux::{Demuxer, InterruptGuard, ReadOutcome};
use crate::error::OpenError;
use crate::metadata::MetadataFixer;
use crate::packet::{Packet, SharedPacket};
use crate::stream::{SourceInfo, StreamInfo};

const MAX_BUFFER_COUNT: usize = 100;
const MIN_BUFFER_COUNT: usize = 50;
const MAX_BUFFER_SIZE: usize = 64 * 1_000_000;
/// Margin added past a requested out bound for late-stream alignment.
const OUT_FRAME_MARGIN: i64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    Idle = 0,
    Opening,
    Reading,
    Seeking,
    /// Read task has exited, buffered packets are still being consumed.
    Draining,
    Stopped,
    Failed,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::Idle,
            1 => ReaderState::Opening,
            2 => ReaderState::Reading,
            3 => ReaderState::Seeking,
            4 => ReaderState::Draining,
            5 => ReaderState::Stopped,
            _ => ReaderState::Failed,
        }
    }
}

/// Demux reader: owns the opened resource through its background read-ahead
/// task and hands packets out through a single bounded-by-hysteresis buffer.
///
/// The task is a single cooperative tokio task. It suspends between packets
/// only: while the buffer is full it parks on a notification that `try_pop`
/// fires, and a stop is observed after the packet in flight.
pub struct Input {
    shared: Arc<InputShared>,
    info: SourceInfo,
    rx: Mutex<mpsc::UnboundedReceiver<SharedPacket>>,
}

impl Input {
    /// Opens the resource, applies the metadata fixer once, performs the
    /// initial seek when `in_frame > 0` and spawns the read-ahead task.
    /// Must be called from within a tokio runtime.
    pub fn open<D: Demuxer>(
        mut demuxer: D,
        fixer: &dyn MetadataFixer,
        config: FeedConfig,
    ) -> Result<Self, OpenError> {
        let guard = Arc::new(InterruptGuard::new(config.interrupt_timeout));
        let shared = Arc::new(InputShared::new(&config, Arc::clone(&guard)));

        shared.set_state(ReaderState::Opening);
        guard.refresh();
        let opened = demuxer
            .open(&config.locator, &config.options, Arc::clone(&guard))
            .map_err(|source| {
                shared.set_state(ReaderState::Failed);
                OpenError::Open {
                    locator: config.locator.clone(),
                    source,
                }
            })?;
        if !opened.rejected_options.is_empty() {
            shared.set_state(ReaderState::Failed);
            return Err(OpenError::UnsupportedOptions(
                opened.rejected_options.join(", "),
            ));
        }
        let handle = opened.handle;

        let mut info = demuxer.probe_stream_info(&handle);
        fixer.fix(&mut info);

        let fps = info.fps(0.0);
        if shared.out_frame() != u32::MAX {
            let estimate = demuxer.estimate_total_frames(&handle, fps) as i64;
            let out = shared.out_frame() as i64;
            let adjusted = if estimate - out > OUT_FRAME_MARGIN {
                out + OUT_FRAME_MARGIN
            } else {
                estimate
            };
            shared.out_frame.store(adjusted as u32, Ordering::Relaxed);
        }

        let primary = info.primary().cloned().ok_or_else(|| {
            shared.set_state(ReaderState::Failed);
            OpenError::MissingPrimaryStream(info.primary_index, config.locator.clone())
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut task = ReadTask {
            demuxer,
            handle,
            tx,
            shared: Arc::clone(&shared),
            primary,
            fps,
            frame_counter: 0,
        };

        if shared.in_frame() > 0 {
            let frame = shared.in_frame();
            task.queued_seek(frame).map_err(|e| {
                shared.set_state(ReaderState::Failed);
                OpenError::InitialSeek {
                    frame,
                    source: crate::error::DemuxError::Backend(format!("{e:#}")),
                }
            })?;
        }

        shared.set_state(ReaderState::Reading);
        tokio::spawn(task.run());

        Ok(Self {
            shared,
            info,
            rx: Mutex::new(rx),
        })
    }

    /// Non-blocking dequeue. A successful pop updates the buffer accounting
    /// and nudges a read task parked on backpressure.
    pub fn try_pop(&self) -> Option<SharedPacket> {
        let packet = self.rx.lock().unwrap().try_recv().ok();
        match packet {
            Some(packet) => {
                self.shared.buffer_count.fetch_sub(1, Ordering::Relaxed);
                self.shared
                    .buffer_bytes
                    .fetch_sub(packet.size(), Ordering::Relaxed);
                self.shared.wake.notify_one();
                Some(packet)
            }
            None => {
                if self.shared.state() == ReaderState::Draining {
                    self.shared.set_state(ReaderState::Stopped);
                }
                None
            }
        }
    }

    /// True once the background task is no longer running. Buffered packets
    /// may still be pending in the queue.
    pub fn eof(&self) -> bool {
        !matches!(
            self.shared.state(),
            ReaderState::Opening | ReaderState::Reading | ReaderState::Seeking
        )
    }

    pub fn state(&self) -> ReaderState {
        self.shared.state()
    }

    /// Requests an asynchronous seek to the given frame. Processed by the
    /// read task before its next packet; ignored once the reader has stopped.
    pub fn seek(&self, frame: u32) {
        if self.eof() {
            log::warn!("input[{}]: seek to {} after stop", self.locator(), frame);
            return;
        }
        *self.shared.seek_request.lock().unwrap() = Some(frame);
        self.shared.wake.notify_one();
    }

    pub fn in_frame(&self) -> u32 {
        self.shared.in_frame()
    }

    pub fn set_in_frame(&self, frame: u32) {
        self.shared.in_frame.store(frame, Ordering::Relaxed);
    }

    pub fn out_frame(&self) -> u32 {
        self.shared.out_frame()
    }

    /// Affects future end-of-range evaluation only, not already-buffered data.
    pub fn set_out_frame(&self, frame: u32) {
        self.shared.out_frame.store(frame, Ordering::Relaxed);
    }

    pub fn looping(&self) -> bool {
        self.shared.looping()
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Relaxed);
    }

    pub fn source_info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn locator(&self) -> &str {
        &self.shared.locator
    }

    pub fn buffered_count(&self) -> usize {
        self.shared.buffer_count.load(Ordering::Relaxed)
    }

    pub fn buffered_bytes(&self) -> usize {
        self.shared.buffer_bytes.load(Ordering::Relaxed)
    }

    /// Cooperative stop: the task finishes its packet in flight, then exits
    /// and releases the resource handle.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
        self.shared.wake.notify_one();
    }
}

impl Drop for Input {
    fn drop(&mut self) {
        self.stop();
    }
}

struct InputShared {
    locator: String,
    in_frame: AtomicU32,
    out_frame: AtomicU32,
    looping: AtomicBool,
    buffer_count: AtomicUsize,
    buffer_bytes: AtomicUsize,
    state: AtomicU8,
    seek_request: Mutex<Option<u32>>,
    /// Fired by `try_pop` and `seek` to unpark a task gated on backpressure.
    wake: Notify,
    cancel: CancellationToken,
    guard: Arc<InterruptGuard>,
}

impl InputShared {
    fn new(config: &FeedConfig, guard: Arc<InterruptGuard>) -> Self {
        Self {
            locator: config.locator.clone(),
            in_frame: AtomicU32::new(config.in_frame),
            out_frame: AtomicU32::new(config.out_frame),
            looping: AtomicBool::new(config.looping),
            buffer_count: AtomicUsize::new(0),
            buffer_bytes: AtomicUsize::new(0),
            state: AtomicU8::new(ReaderState::Idle as u8),
            seek_request: Mutex::new(None),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            guard,
        }
    }

    fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ReaderState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn in_frame(&self) -> u32 {
        self.in_frame.load(Ordering::Relaxed)
    }

    fn out_frame(&self) -> u32 {
        self.out_frame.load(Ordering::Relaxed)
    }

    fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    fn take_seek_request(&self) -> Option<u32> {
        self.seek_request.lock().unwrap().take()
    }

    /// Backpressure gate with hysteresis: pausing requires crossing the high
    /// byte/count threshold, resuming requires draining to the low count.
    fn full(&self) -> bool {
        let count = self.buffer_count.load(Ordering::Relaxed);
        let bytes = self.buffer_bytes.load(Ordering::Relaxed);
        (bytes > MAX_BUFFER_SIZE || count > MAX_BUFFER_COUNT) && count > MIN_BUFFER_COUNT
    }
}

enum ReadStep {
    Packet,
    EndOfRange,
}

struct ReadTask<D: Demuxer> {
    demuxer: D,
    handle: D::Handle,
    tx: mpsc::UnboundedSender<SharedPacket>,
    shared: Arc<InputShared>,
    primary: StreamInfo,
    fps: f64,
    /// Packets seen on the primary stream since the last seek.
    frame_counter: u32,
}

impl<D: Demuxer> ReadTask<D> {
    async fn run(mut self) {
        loop {
            if self.shared.cancel.is_cancelled() {
                self.shared.set_state(ReaderState::Stopped);
                break;
            }

            if let Some(target) = self.shared.take_seek_request() {
                self.shared.set_state(ReaderState::Seeking);
                match self.queued_seek(target) {
                    Ok(()) => self.shared.set_state(ReaderState::Reading),
                    Err(e) => {
                        log::error!("input[{}]: seek failed: {:#}", self.shared.locator, e);
                        self.shared.set_state(ReaderState::Failed);
                        break;
                    }
                }
                continue;
            }

            if self.shared.full() {
                tokio::select! {
                    _ = self.shared.cancel.cancelled() => {
                        self.shared.set_state(ReaderState::Stopped);
                        break;
                    }
                    _ = self.shared.wake.notified() => {}
                }
                continue;
            }

            match self.read_one() {
                Ok(ReadStep::Packet) => {
                    tokio::task::yield_now().await;
                }
                Ok(ReadStep::EndOfRange) => {
                    self.frame_counter = 0;
                    if self.shared.looping() {
                        self.shared.set_state(ReaderState::Seeking);
                        let in_frame = self.shared.in_frame();
                        match self.queued_seek(in_frame) {
                            Ok(()) => {
                                log::debug!("input[{}]: looping", self.shared.locator);
                                self.shared.set_state(ReaderState::Reading);
                            }
                            Err(e) => {
                                log::error!(
                                    "input[{}]: loop seek failed: {:#}",
                                    self.shared.locator,
                                    e
                                );
                                self.shared.set_state(ReaderState::Failed);
                                break;
                            }
                        }
                    } else {
                        // Decoders flush remaining frames off this marker.
                        self.push(Arc::new(Packet::flush(self.primary.index, -1)));
                        self.shared.set_state(ReaderState::Draining);
                        break;
                    }
                }
                Err(e) => {
                    // Fail-stop: never re-thrown across the task boundary,
                    // observable only through eof().
                    log::error!("input[{}]: read task failed: {:#}", self.shared.locator, e);
                    self.shared.set_state(ReaderState::Failed);
                    break;
                }
            }
        }
    }

    fn read_one(&mut self) -> anyhow::Result<ReadStep> {
        match self.demuxer.read_next_unit(&mut self.handle) {
            ReadOutcome::Unit(packet) => {
                if self.frame_counter >= self.shared.out_frame() {
                    return Ok(ReadStep::EndOfRange);
                }
                if packet.stream_index == self.primary.index {
                    self.frame_counter += 1;
                }
                self.push(Arc::new(packet));
                Ok(ReadStep::Packet)
            }
            ReadOutcome::TrueEnd => {
                log::trace!("input[{}]: received end of stream", self.shared.locator);
                Ok(ReadStep::EndOfRange)
            }
            ReadOutcome::IoEnd => {
                log::trace!(
                    "input[{}]: received i/o end, assuming end of stream",
                    self.shared.locator
                );
                Ok(ReadStep::EndOfRange)
            }
            ReadOutcome::Fatal(e) => Err(e).context("read_next_unit"),
        }
    }

    /// Seeks the primary stream to `target` and queues the flush marker that
    /// tells downstream decoders to reset.
    fn queued_seek(&mut self, target: u32) -> anyhow::Result<()> {
        self.shared.guard.refresh();

        let time_base = self.primary.time_base;
        let fps = if self.fps > 0.0 { self.fps } else { 25.0 };
        let target_ts = ((target as f64 / fps * time_base.den as f64) / time_base.num as f64)
            as i64
            + self.primary.start_time;

        self.demuxer
            .seek(
                &mut self.handle,
                self.primary.index,
                i64::MIN,
                target_ts,
                i64::MAX,
            )
            .with_context(|| format!("seek to frame {target}"))?;

        self.frame_counter = target;
        self.push(Arc::new(Packet::flush(self.primary.index, target as i64)));
        Ok(())
    }

    fn push(&self, packet: SharedPacket) {
        self.shared
            .buffer_bytes
            .fetch_add(packet.size(), Ordering::Relaxed);
        self.shared.buffer_count.fetch_add(1, Ordering::Relaxed);
        // Send only fails when the Input is gone; the task then observes the
        // cancelled token on its next pass.
        let _ = self.tx.send(packet);
    }
}

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;
