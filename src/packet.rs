use std::sync::Arc;

use bytes::Bytes;

/// One packet instance may be held by the reader's accounting and several
/// per-stream queues at once; the payload is immutable and dropped with the
/// last holder.
pub type SharedPacket = Arc<Packet>;

/// Compressed media unit (after demux, before decode).
#[derive(Clone, Debug)]
pub struct Packet {
    pub stream_index: usize,
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Position reported by the demuxer. Flush markers reuse this field for
    /// the seek target frame, or -1 at end of range.
    pub pos: i64,
}

impl Packet {
    pub fn new(
        stream_index: usize,
        data: Bytes,
        pts: Option<i64>,
        dts: Option<i64>,
        pos: i64,
    ) -> Self {
        Self {
            stream_index,
            data,
            pts,
            dts,
            pos,
        }
    }

    /// Zero-payload marker signalling a discontinuity. `pos` is the seek
    /// target frame, or -1 when no more data will follow until a seek.
    pub fn flush(stream_index: usize, pos: i64) -> Self {
        Self {
            stream_index,
            data: Bytes::new(),
            pts: None,
            dts: None,
            pos,
        }
    }

    pub fn is_flush(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
#[path = "packet_test.rs"]
mod packet_test;
