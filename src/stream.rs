#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn value(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

/// One elementary stream as probed by the demuxer.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: Rational,
    /// First presentation timestamp, in `time_base` units.
    pub start_time: i64,
    pub avg_frame_rate: Rational,
}

impl StreamInfo {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }

    pub fn is_subtitle(&self) -> bool {
        self.kind == MediaKind::Subtitle
    }
}

/// Stream layout of an opened resource.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub streams: Vec<StreamInfo>,
    /// Default stream the demuxer seeks on.
    pub primary_index: usize,
    /// Container duration in microseconds.
    pub duration_us: i64,
}

impl SourceInfo {
    pub fn primary(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == self.primary_index)
    }

    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.is_video())
    }

    pub fn num_audio_streams(&self) -> usize {
        self.streams.iter().filter(|s| s.is_audio()).count()
    }

    pub fn num_subtitle_streams(&self) -> usize {
        self.streams.iter().filter(|s| s.is_subtitle()).count()
    }

    /// Frame rate of the first video stream, or `fail_value` when the probed
    /// rate is unusable.
    pub fn fps(&self, fail_value: f64) -> f64 {
        match self.first_video() {
            Some(video) => {
                let rate = video.avg_frame_rate;
                if rate.num > 0 && rate.den > 0 {
                    rate.value()
                } else {
                    fail_value
                }
            }
            None => fail_value,
        }
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
