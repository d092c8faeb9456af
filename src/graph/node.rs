use std::f64::consts::LN_2;
use std::fmt;

use crate::{DEFAULT_AMP, FPS, MIDDLE_C};

/// Peak amplitude below which a warmed-up node is considered silent.
const DONE_FLOOR: f32 = 1e-4;

/// Frames a node must have rendered before done-detection engages
/// (1/8 second of audio).
const DONE_WARMUP: u64 = FPS as u64 / 8;

const LOG_CC: f64 = LN_2 / 12.0;

#[inline]
fn log_cx() -> f64 {
    MIDDLE_C.ln() - 60.0 * LOG_CC
}

/// Convert semitone key units to frequency in Hz (60 = middle C).
#[inline]
pub fn key2freq(key: f64) -> f64 {
    (key * LOG_CC + log_cx()).exp()
}

/// Convert frequency in Hz to semitone key units (middle C = 60).
#[inline]
pub fn freq2key(freq: f64) -> f64 {
    (freq.ln() - log_cx()) / LOG_CC
}

/// Errors surfaced by node construction or synthesis.
///
/// Synthesis errors never escape the graph: [`Sound::render`] traps them,
/// substitutes silence and latches the node done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundError {
    /// A node received an input buffer whose length does not match the
    /// propagated frame count.
    FrameCountMismatch { expected: usize, got: usize },
    /// An unknown waveform shape name.
    UnknownShape(String),
    /// A gate consumer was rendered without any gate input for the window.
    MissingGateInput,
}

impl fmt::Display for SoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundError::FrameCountMismatch { expected, got } => {
                write!(f, "frame count mismatch: expected {expected}, got {got}")
            }
            SoundError::UnknownShape(name) => write!(f, "unknown waveform shape {name:?}"),
            SoundError::MissingGateInput => write!(f, "no gate input for this render window"),
        }
    }
}

impl std::error::Error for SoundError {}

/// State shared by every sound node: pitch, level, frame bookkeeping and
/// the done latch.
#[derive(Debug, Clone)]
pub struct SoundCore {
    /// Fundamental frequency in Hz.
    pub freq: f64,
    /// Output amplitude, 0 to 1.
    pub amp: f32,
    /// MIDI-style velocity of the pressed key, 0 to 128.
    pub velocity: f32,
    /// Number of frames the next `forward()` is expected to return.
    pub frames: usize,
    /// Monotonically increasing frame counter.
    pub index: u64,
    shared: bool,
    /// Frame index at which the node latched "possibly done"; 0 = not yet.
    done_at: u64,
    error: bool,
    /// The most recent `forward()` output.
    last: Option<Vec<f32>>,
}

impl SoundCore {
    pub fn new(freq: f64, amp: f32) -> Self {
        Self {
            freq,
            amp,
            velocity: 64.0,
            frames: 1024,
            index: 0,
            shared: false,
            done_at: 0,
            error: false,
            last: None,
        }
    }

    /// Current frequency in semitone key units (60 = middle C).
    pub fn key(&self) -> f64 {
        freq2key(self.freq)
    }

    pub fn set_key(&mut self, key: f64) {
        self.freq = key2freq(key);
    }

    /// Mark this node as shared between multiple parents; shared nodes are
    /// not reset when a parent replays.
    pub fn set_shared(&mut self, shared: bool) {
        self.shared = shared;
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn last_buffer(&self) -> Option<&[f32]> {
        self.last.as_deref()
    }

    pub(crate) fn store_last(&mut self, buffer: Vec<f32>) {
        self.last = Some(buffer);
    }

    pub(crate) fn is_done_latched(&self) -> bool {
        self.done_at != 0
    }

    pub(crate) fn clear_runtime(&mut self) {
        self.index = 0;
        self.done_at = 0;
        self.error = false;
        self.last = None;
    }
}

impl Default for SoundCore {
    fn default() -> Self {
        Self::new(MIDDLE_C, DEFAULT_AMP)
    }
}

/// The capability set shared by every node in a sound tree.
///
/// Implementors provide access to their [`SoundCore`], an explicit list of
/// owned children, and a `forward()` synthesis step producing the next
/// buffer. Everything else — frame-count propagation, reset, the public
/// render entry with its error trapping, output scaling and the
/// done-detection policy — is provided here so all nodes share one
/// lifecycle.
pub trait Sound: Send {
    fn core(&self) -> &SoundCore;

    fn core_mut(&mut self) -> &mut SoundCore;

    /// The node's exclusively owned children; iterated directly for
    /// propagation and reset.
    fn children_mut(&mut self) -> Vec<&mut dyn Sound> {
        Vec::new()
    }

    /// Compute the next `core().frames` samples.
    ///
    /// Failures are trapped by [`Sound::render`]: the node outputs silence
    /// for the window and latches permanently done.
    fn forward(&mut self) -> Result<Vec<f32>, SoundError>;

    /// Lazily push the required frame count down the subtree.
    ///
    /// The recursive walk is skipped when the value is already current,
    /// unless `force` is set.
    fn set_required_frames(&mut self, frames: usize, force: bool) {
        if force || self.core().frames != frames {
            for child in self.children_mut() {
                child.set_required_frames(frames, true);
            }
        }
        self.core_mut().frames = frames;
    }

    /// Zero the frame index, clear the done latch and cached buffer, and
    /// recurse into owned children.
    ///
    /// `shared` marks that the reset originates from a replaying parent;
    /// nodes wrapping shared state use it to keep running (see
    /// `graph::shared`).
    fn reset(&mut self, shared: bool) {
        let shared = shared || self.core().shared;
        self.core_mut().clear_runtime();
        for child in self.children_mut() {
            child.reset(shared);
        }
    }

    /// The public render entry: produce the next buffer, unscaled.
    ///
    /// Skips synthesis when the node has latched "possibly done" and the
    /// cached buffer already has the requested length; otherwise invokes
    /// `forward()`, substituting a silent buffer of the correct shape on
    /// failure. Synthesis failures are logged and latch the node done;
    /// they never propagate and never block other playing nodes.
    /// Advances the frame index by the buffer length.
    fn render(&mut self) -> Vec<f32> {
        let frames = self.core().frames;

        let needs_forward = {
            let core = self.core();
            !core.is_done_latched()
                || core.last.as_ref().map_or(true, |b| b.len() != frames)
        };

        if needs_forward {
            match self.forward() {
                Ok(buffer) => self.core_mut().store_last(buffer),
                Err(err) => {
                    tracing::error!(error = %err, "synthesis failed; substituting silence");
                    let core = self.core_mut();
                    core.error = true;
                    core.store_last(vec![0.0; frames]);
                }
            }
        }

        let core = self.core_mut();
        let buffer = core.last.clone().unwrap_or_else(|| vec![0.0; frames]);
        core.index += buffer.len() as u64;
        buffer
    }

    /// Render `frames` samples scaled by `velocity/128 × amp`.
    ///
    /// This is the entry point the player uses on root nodes: it propagates
    /// the frame count to the whole subtree before rendering.
    fn consume(&mut self, frames: usize) -> Vec<f32> {
        let mut buffer = self.consume_raw(frames);

        let core = self.core();
        let gain = core.velocity / 128.0 * core.amp;
        for sample in &mut buffer {
            *sample *= gain;
        }

        buffer
    }

    /// Like [`Sound::consume`] but without velocity/amplitude scaling, for
    /// parents that post-process raw child output.
    fn consume_raw(&mut self, frames: usize) -> Vec<f32> {
        self.set_required_frames(frames, false);
        self.render()
    }

    /// Two-phase done predicate used by the player to discard nodes.
    ///
    /// A node is never done before 1/8 second of playback. Past that, when
    /// the latest buffer's peak falls below the amplitude floor, the node
    /// latches "possibly done" and zeroes its cached buffer, but is only
    /// reported done on the following check. The grace period keeps
    /// decaying tails alive for effects applied later in a chain. A
    /// permanent synthesis error latches done immediately.
    fn check_done(&mut self) -> bool {
        let core = self.core_mut();

        if core.error {
            return true;
        }
        if core.index < DONE_WARMUP {
            return false;
        }
        if core.last.is_none() {
            return false;
        }

        if !core.is_done_latched() {
            let last = core.last.as_ref().expect("checked above");
            let peak = last.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            if peak < DONE_FLOOR {
                core.done_at = core.index.max(1);
                core.last.as_mut().expect("checked above").fill(0.0);
            }
            return false;
        }

        true
    }
}

impl Sound for Box<dyn Sound> {
    fn core(&self) -> &SoundCore {
        (**self).core()
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        (**self).core_mut()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Sound> {
        (**self).children_mut()
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        (**self).forward()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A node emitting a constant value; value 0.0 models a silent tail.
    struct Constant {
        core: SoundCore,
        value: f32,
    }

    impl Constant {
        fn new(value: f32) -> Self {
            Self {
                core: SoundCore::new(MIDDLE_C, 1.0),
                value,
            }
        }
    }

    impl Sound for Constant {
        fn core(&self) -> &SoundCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut SoundCore {
            &mut self.core
        }

        fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
            Ok(vec![self.value; self.core.frames])
        }
    }

    struct Failing {
        core: SoundCore,
    }

    impl Sound for Failing {
        fn core(&self) -> &SoundCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut SoundCore {
            &mut self.core
        }

        fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
            Err(SoundError::MissingGateInput)
        }
    }

    #[test]
    fn key_conversions_round_trip() {
        assert!((key2freq(60.0) - MIDDLE_C).abs() < 1e-9);
        assert!((key2freq(72.0) - 2.0 * MIDDLE_C).abs() < 1e-9);
        assert!((freq2key(440.0) - 69.0).abs() < 0.01);
        assert!((freq2key(key2freq(53.5)) - 53.5).abs() < 1e-9);
    }

    #[test]
    fn consume_scales_by_velocity_and_amp() {
        let mut node = Constant::new(1.0);
        node.core_mut().velocity = 64.0;
        node.core_mut().amp = 0.5;

        let buffer = node.consume(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&s| (s - 0.25).abs() < 1e-7));

        let raw = node.consume_raw(16);
        assert!(raw.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn consume_advances_frame_index() {
        let mut node = Constant::new(0.3);
        node.consume(128);
        node.consume(128);
        assert_eq!(node.core().index, 256);
    }

    #[test]
    fn silent_node_reports_done_after_warmup_and_grace() {
        let mut node = Constant::new(0.0);

        // Not done while warming up.
        node.consume(1024);
        assert!(!node.check_done());

        while node.core().index < DONE_WARMUP {
            node.consume(1024);
        }

        // First check past warmup latches "possibly done" but still
        // reports alive: one callback of grace.
        assert!(!node.check_done());
        assert!(node.core().is_done_latched());

        assert!(node.check_done());
    }

    #[test]
    fn audible_node_never_reports_done() {
        let mut node = Constant::new(0.5);
        for _ in 0..20 {
            node.consume(1024);
            assert!(!node.check_done());
        }
    }

    #[test]
    fn latched_node_reuses_zeroed_buffer() {
        let mut node = Constant::new(0.0);
        while node.core().index < DONE_WARMUP {
            node.consume(1024);
        }
        node.check_done();

        let index = node.core().index;
        let buffer = node.consume(1024);
        assert!(buffer.iter().all(|&s| s == 0.0));
        assert_eq!(node.core().index, index + 1024);
    }

    #[test]
    fn synthesis_failure_yields_silence_and_done() {
        let mut node = Failing {
            core: SoundCore::default(),
        };

        let buffer = node.consume(64);
        assert_eq!(buffer.len(), 64);
        assert!(buffer.iter().all(|&s| s == 0.0));
        assert!(node.check_done());
    }

    #[test]
    fn reset_clears_runtime_state() {
        let mut node = Constant::new(0.0);
        node.consume(2048);
        node.reset(false);

        assert_eq!(node.core().index, 0);
        assert!(!node.core().is_done_latched());
        assert!(node.core().last_buffer().is_none());
    }
}
