use std::collections::VecDeque;

use crate::FPS;

/// Timing attached to one recorded mix buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecordMeta {
    /// Wall-clock time the buffer was rendered.
    pub wall_time: f64,
    pub frames: usize,
    /// Seconds between rendering and the buffer reaching the speaker.
    pub output_delay: f64,
}

/// A bounded tail of the mono mix, captured by the audio callback.
///
/// The recorder always runs as a short ring so the last second of output
/// is inspectable; `start` widens the window for a deliberate capture and
/// `stop` hands back the accumulated audio.
pub struct Recorder {
    chunks: VecDeque<(Vec<f32>, RecordMeta)>,
    limit_secs: f64,
    frames_buffered: usize,
}

const DEFAULT_LIMIT_SECS: f64 = 1.0;

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            limit_secs: DEFAULT_LIMIT_SECS,
            frames_buffered: 0,
        }
    }

    /// Append one rendered buffer, discarding the oldest chunks once the
    /// window exceeds the frame limit.
    pub fn push(&mut self, samples: Vec<f32>, meta: RecordMeta) {
        self.frames_buffered += samples.len();
        self.chunks.push_back((samples, meta));

        let limit = (self.limit_secs * FPS as f64) as usize;
        while self.frames_buffered > limit {
            let Some((oldest, _)) = self.chunks.pop_front() else {
                break;
            };
            self.frames_buffered -= oldest.len();
        }
    }

    /// Begin a capture of up to `limit_secs` seconds, dropping anything
    /// already buffered.
    pub fn start(&mut self, limit_secs: f64) {
        self.chunks.clear();
        self.frames_buffered = 0;
        self.limit_secs = limit_secs.max(DEFAULT_LIMIT_SECS);
    }

    /// End the capture: return the buffered audio with the metadata of its
    /// first chunk, and shrink back to the default window.
    pub fn stop(&mut self) -> (Vec<f32>, Option<RecordMeta>) {
        let meta = self.chunks.front().map(|(_, m)| *m);

        let mut samples = Vec::with_capacity(self.frames_buffered);
        for (chunk, _) in self.chunks.drain(..) {
            samples.extend(chunk);
        }
        self.frames_buffered = 0;
        self.limit_secs = DEFAULT_LIMIT_SECS;

        (samples, meta)
    }

    pub fn buffered_frames(&self) -> usize {
        self.frames_buffered
    }
}
