use thiserror::Error;

/// Failure inside the demuxer collaborator (native library, transport).
#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("demuxer error: {0}")]
    Backend(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised synchronously by [`crate::input::Input::open`].
#[derive(Debug, Error)]
pub enum OpenError {
    /// Open options the underlying library did not recognize. This is a
    /// user-facing configuration error, not a transient I/O failure.
    #[error("unsupported options: {0}")]
    UnsupportedOptions(String),
    #[error("failed to open {locator}: {source}")]
    Open {
        locator: String,
        #[source]
        source: DemuxError,
    },
    #[error("no stream with index {0} in {1}")]
    MissingPrimaryStream(usize, String),
    #[error("initial seek to frame {frame} failed: {source}")]
    InitialSeek {
        frame: u32,
        #[source]
        source: DemuxError,
    },
}

#[derive(Debug, Error)]
pub enum ProducerError {
    /// Video is the pacing stream; a source without one cannot be routed.
    #[error("no video stream found in source")]
    NoVideoStream,
    #[error("failed to spawn router thread: {0}")]
    Spawn(#[from] std::io::Error),
}
