use std::time::Duration;

use crate::demux::{DEFAULT_INTERRUPT_TIMEOUT, OpenOptions};

/// Configuration for one feed: resource locator, frame range, loop flag and
/// demuxer open options.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub locator: String,
    pub looping: bool,
    /// First frame to deliver.
    pub in_frame: u32,
    /// Frame bound after which reading ends. `u32::MAX` = unbounded.
    pub out_frame: u32,
    pub options: OpenOptions,
    pub interrupt_timeout: Duration,
}

impl FeedConfig {
    pub fn builder() -> FeedConfigBuilder {
        FeedConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct FeedConfigBuilder {
    locator: Option<String>,
    looping: bool,
    in_frame: u32,
    out_frame: Option<u32>,
    options: OpenOptions,
    interrupt_timeout: Option<Duration>,
}

impl FeedConfigBuilder {
    /// Set the resource locator (file path or URL)
    pub fn locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn in_frame(mut self, frame: u32) -> Self {
        self.in_frame = frame;
        self
    }

    pub fn out_frame(mut self, frame: u32) -> Self {
        self.out_frame = Some(frame);
        self
    }

    /// Add a demuxer open option (passed through verbatim)
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> FeedConfig {
        FeedConfig {
            locator: self.locator.expect("locator is required"),
            looping: self.looping,
            in_frame: self.in_frame,
            out_frame: self.out_frame.unwrap_or(u32::MAX),
            options: self.options,
            interrupt_timeout: self.interrupt_timeout.unwrap_or(DEFAULT_INTERRUPT_TIMEOUT),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
