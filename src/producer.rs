use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::ProducerError;
use crate::input::Input;
use crate::packet::SharedPacket;
use crate::queue::PacketQueue;

/// Video-queue depth above which the router idles; video is the pacing
/// stream, so this throttles the whole pipeline.
const PKT_BUFFER_COUNT: usize = 50;
const ROUTER_IDLE: Duration = Duration::from_millis(20);

/// Pull interface handed to downstream decode stages.
pub trait PacketProducer: Send + Sync {
    /// Pops the next video packet, or `None` when the video queue is empty.
    fn receive_v(&self) -> Option<SharedPacket>;

    /// Round-robin pull across the audio queues. See [`Fetched`].
    fn receive_a(&self) -> Fetched;

    /// Round-robin pull across the subtitle queues. See [`Fetched`].
    fn receive_s(&self) -> Fetched;
}

/// Outcome of a round-robin pull.
#[derive(Clone, Debug)]
pub enum Fetched {
    /// A packet from queue slot `stream` (0-based within its kind).
    Packet { packet: SharedPacket, stream: usize },
    /// No streams of this kind exist; nothing to do.
    Vacant,
    /// The current queue slot has nothing buffered. The cursor does not
    /// advance; the same slot is retried on the next call.
    Starved,
}

impl Fetched {
    pub fn is_packet(&self) -> bool {
        matches!(self, Fetched::Packet { .. })
    }
}

/// Routes the reader's single output into per-stream queues on a dedicated
/// thread and exposes the round-robin pull API.
pub struct StreamProducer {
    input: Arc<Input>,
    video: Arc<PacketQueue>,
    audio: Vec<Arc<PacketQueue>>,
    subtitle: Vec<Arc<PacketQueue>>,
    audio_cursor: AtomicUsize,
    subtitle_cursor: AtomicUsize,
    running: Arc<AtomicBool>,
    router: Option<thread::JoinHandle<()>>,
}

impl StreamProducer {
    /// Builds one queue per elementary stream (one video, N audio,
    /// M subtitle) and starts the router thread.
    pub fn start(input: Input) -> Result<Self, ProducerError> {
        let input = Arc::new(input);
        let info = input.source_info();

        let mut video = None;
        let mut audio = Vec::new();
        let mut subtitle = Vec::new();
        for stream in &info.streams {
            if stream.is_video() {
                if video.is_none() {
                    video = Some(Arc::new(PacketQueue::new(stream.index)));
                }
            } else if stream.is_audio() {
                audio.push(Arc::new(PacketQueue::new(stream.index)));
            } else if stream.is_subtitle() {
                subtitle.push(Arc::new(PacketQueue::new(stream.index)));
            }
        }
        let video = video.ok_or(ProducerError::NoVideoStream)?;
        if audio.is_empty() {
            log::warn!("producer[{}]: no audio stream found", input.locator());
        }

        let running = Arc::new(AtomicBool::new(true));
        let router = {
            let running = Arc::clone(&running);
            let input = Arc::clone(&input);
            let video = Arc::clone(&video);
            let audio: Vec<_> = audio.iter().map(Arc::clone).collect();
            let subtitle: Vec<_> = subtitle.iter().map(Arc::clone).collect();
            thread::Builder::new()
                .name("packet-router".to_string())
                .spawn(move || {
                    Self::route(&running, &input, &video, &audio, &subtitle);
                })?
        };

        Ok(Self {
            input,
            video,
            audio,
            subtitle,
            audio_cursor: AtomicUsize::new(0),
            subtitle_cursor: AtomicUsize::new(0),
            running,
            router: Some(router),
        })
    }

    /// Router loop: throttle on video depth, otherwise broadcast one packet
    /// (possibly none) to every queue; the queues filter by stream index.
    fn route(
        running: &AtomicBool,
        input: &Input,
        video: &PacketQueue,
        audio: &[Arc<PacketQueue>],
        subtitle: &[Arc<PacketQueue>],
    ) {
        while running.load(Ordering::Relaxed) {
            if video.len() > PKT_BUFFER_COUNT {
                thread::sleep(ROUTER_IDLE);
                continue;
            }

            let packet = input.try_pop();
            let packet = packet.as_ref();
            video.push(packet);
            for queue in audio {
                queue.push(packet);
            }
            for queue in subtitle {
                queue.push(packet);
            }
        }
    }

    fn round_robin(queues: &[Arc<PacketQueue>], cursor: &AtomicUsize) -> Fetched {
        if queues.is_empty() {
            return Fetched::Vacant;
        }
        let c = cursor.load(Ordering::Relaxed);
        let i = c % queues.len();
        match queues[i].poll() {
            Some(packet) => {
                cursor.store(c.wrapping_add(1), Ordering::Relaxed);
                Fetched::Packet { packet, stream: i }
            }
            None => Fetched::Starved,
        }
    }

    pub fn num_audio_streams(&self) -> usize {
        self.audio.len()
    }

    pub fn num_subtitle_streams(&self) -> usize {
        self.subtitle.len()
    }

    /// Shared reader handle, for seek and range/loop control.
    pub fn input(&self) -> &Arc<Input> {
        &self.input
    }
}

impl PacketProducer for StreamProducer {
    fn receive_v(&self) -> Option<SharedPacket> {
        self.video.poll()
    }

    fn receive_a(&self) -> Fetched {
        Self::round_robin(&self.audio, &self.audio_cursor)
    }

    fn receive_s(&self) -> Fetched {
        Self::round_robin(&self.subtitle, &self.subtitle_cursor)
    }
}

impl Drop for StreamProducer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(router) = self.router.take() {
            // The router only does non-blocking pops and bounded sleeps, so
            // the join completes within one iteration.
            let _ = router.join();
        }
    }
}

#[cfg(test)]
#[path = "producer_test.rs"]
mod producer_test;
