use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::DemuxError;
use crate::packet::Packet;
use crate::stream::SourceInfo;

pub const DEFAULT_INTERRUPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Key/value options forwarded verbatim to the demuxer's open call.
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    entries: Vec<(String, String)>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one `read_next_unit` call.
pub enum ReadOutcome {
    Unit(Packet),
    /// Normal end of stream.
    TrueEnd,
    /// I/O-level end. Some sources never report a true end; treated
    /// identically to [`ReadOutcome::TrueEnd`].
    IoEnd,
    /// Unexpected failure; stops the read task.
    Fatal(DemuxError),
}

/// Successful open. `rejected_options` holds the option keys the library did
/// not consume; a non-empty list is surfaced as a configuration error.
pub struct Opened<H> {
    pub handle: H,
    pub rejected_options: Vec<String>,
}

impl<H> Opened<H> {
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            rejected_options: Vec::new(),
        }
    }
}

/// Contract of the container demuxing collaborator. Implementations wrap the
/// native library; this crate never parses container data itself.
pub trait Demuxer: Send + 'static {
    type Handle: Send + 'static;

    /// Open the resource. Implementations are expected to poll
    /// `interrupt.should_abort()` during blocking native calls.
    fn open(
        &mut self,
        locator: &str,
        options: &OpenOptions,
        interrupt: Arc<InterruptGuard>,
    ) -> Result<Opened<Self::Handle>, DemuxError>;

    fn read_next_unit(&mut self, handle: &mut Self::Handle) -> ReadOutcome;

    /// Seek the given stream to the interval `[min_ts, max_ts]` around
    /// `target_ts`, in the stream's own time base.
    fn seek(
        &mut self,
        handle: &mut Self::Handle,
        stream_index: usize,
        min_ts: i64,
        target_ts: i64,
        max_ts: i64,
    ) -> Result<(), DemuxError>;

    fn probe_stream_info(&mut self, handle: &Self::Handle) -> SourceInfo;

    /// Estimated total frame count of the resource (duration x fps).
    fn estimate_total_frames(&mut self, handle: &Self::Handle, fps: f64) -> u32;
}

/// Watchdog for stalled native calls. Open/seek refresh the last-checked
/// timestamp; the demuxer polls `should_abort` from inside blocking calls and
/// bails out once the timeout has elapsed without a refresh.
pub struct InterruptGuard {
    inner: Mutex<GuardState>,
}

struct GuardState {
    last_check: Instant,
    timeout: Duration,
}

impl InterruptGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(GuardState {
                last_check: Instant::now(),
                timeout,
            }),
        }
    }

    /// Restart the timeout window.
    pub fn refresh(&self) {
        self.inner.lock().unwrap().last_check = Instant::now();
    }

    /// Restart the timeout window with a new timeout.
    pub fn refresh_with(&self, timeout: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.last_check = Instant::now();
        state.timeout = timeout;
    }

    pub fn should_abort(&self) -> bool {
        let state = self.inner.lock().unwrap();
        state.last_check.elapsed() > state.timeout
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new(DEFAULT_INTERRUPT_TIMEOUT)
    }
}

#[cfg(test)]
#[path = "demux_test.rs"]
mod demux_test;
