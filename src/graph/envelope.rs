use crate::dsp::curve::{exponential_curve, linear_curve, segment_complete};
use crate::dsp::gate::{gate_to_events, GateEvent};
use crate::graph::node::{Sound, SoundCore, SoundError};
use crate::{DEFAULT_AMP, MIDDLE_C};

/*
ADSR Envelope
=============

The envelope converts a boolean gate signal into an amplitude curve:

  level
    1.0 ┐     ╱╲
        │    ╱  ╲___________
    S   │   ╱               ╲
        │  ╱                 ╲
    0.0 └─╱───────────────────╲──→ time
        Attack Decay  Sustain  Release

State transitions happen only at gate open/close boundaries or when a
curve segment completes naturally:

  open   (while not attacking)       → attack, starting from current value
  close  (while not releasing/idle)  → release, starting from current value
  attack complete                    → decay
  decay complete                     → sustain, or idle when sustain is 0
  release complete                   → idle

Starting attack and release from the *current* value rather than a fixed
origin is what makes retriggering mid-decay or mid-release click-free: the
curve is affine-rescaled from where the envelope happens to be to the
segment target (1 for attack, sustain·start for decay, 0 for release).

Segment shapes come from `dsp::curve`; the envelope tracks the frame at
which the current segment began so each render window continues the curve
exactly where the previous one stopped.
*/

/// Threshold of the exponential curve family: the curve reaches within
/// this distance of 1 by the segment duration.
const CURVE_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Gate input for the next render window.
enum GateInput {
    None,
    Buffer(Vec<f32>),
    Events(Vec<(u64, GateEvent)>),
}

/// ADSR envelope generator node.
///
/// Feed it a gate buffer (or a pre-computed event list) via
/// [`Envelope::process`] / [`Envelope::process_events`]; it renders the
/// matching amplitude curve for the window.
pub struct Envelope {
    core: SoundCore,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    /// Linear or exponential curve segments.
    pub linear: bool,

    state: EnvelopeState,
    /// First frame index of the current state's curve segment.
    start: u64,
    /// Value the current segment started from.
    valu0: f64,
    /// Most recently computed value.
    valu1: f64,
    /// Gate value held at the end of the previous buffer.
    last_gate: bool,
    input: GateInput,
}

impl Envelope {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            core: SoundCore::new(MIDDLE_C, DEFAULT_AMP),
            attack,
            decay,
            sustain,
            release,
            linear: true,
            state: EnvelopeState::Idle,
            start: 0,
            valu0: 0.0,
            valu1: 0.0,
            last_gate: false,
            input: GateInput::None,
        }
    }

    /// Use exponential curve segments instead of linear ones.
    pub fn exponential(mut self) -> Self {
        self.linear = false;
        self
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// The envelope's most recently computed value.
    pub fn value(&self) -> f64 {
        self.valu1
    }

    /// Render the amplitude curve for a gate buffer.
    ///
    /// The buffer length must match the propagated frame count; a mismatch
    /// is trapped by the render entry (silence + permanent done).
    pub fn process(&mut self, gate: &[f32]) -> Vec<f32> {
        self.input = GateInput::Buffer(gate.to_vec());
        self.render()
    }

    /// Render the amplitude curve for a pre-computed event list, each event
    /// an absolute `(frame, Open|Close|Continue)` pair covering the window.
    pub fn process_events(&mut self, events: Vec<(u64, GateEvent)>) -> Vec<f32> {
        self.input = GateInput::Events(events);
        self.render()
    }

    /// Compute curve samples for absolute frames `start..end`, advancing
    /// the state machine when the segment completes inside the window.
    fn curve(&mut self, start: u64, end: u64) -> Vec<f64> {
        let end = end.max(start);

        let dt = match self.state {
            EnvelopeState::Idle | EnvelopeState::Sustain => {
                return vec![self.valu0; (end - start) as usize];
            }
            EnvelopeState::Attack => self.attack,
            EnvelopeState::Decay => self.decay,
            EnvelopeState::Release => self.release,
        };

        let rel_start = start - self.start;
        let rel_end = end - self.start;

        let curve = if self.linear {
            linear_curve(dt, rel_start, rel_end)
        } else {
            exponential_curve(dt, rel_start, rel_end, CURVE_THRESHOLD)
        };

        let Some(&raw_last) = curve.last() else {
            return curve;
        };

        let (target, next_state) = match self.state {
            EnvelopeState::Attack => (1.0, EnvelopeState::Decay),
            EnvelopeState::Decay => {
                let next = if self.sustain != 0.0 {
                    EnvelopeState::Sustain
                } else {
                    EnvelopeState::Idle
                };
                (self.sustain * self.valu0, next)
            }
            _ => (0.0, EnvelopeState::Idle),
        };

        let done = segment_complete(raw_last);

        let scaled: Vec<f64> = curve
            .iter()
            .map(|&v| (target - self.valu0) * v + self.valu0)
            .collect();
        let last = (target - self.valu0) * raw_last + self.valu0;

        if done {
            self.state = next_state;
            self.start += rel_start + scaled.len() as u64;
            self.valu0 = last;
        }
        self.valu1 = last;

        scaled
    }
}

impl Sound for Envelope {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        let frames = self.core.frames;

        let events = match std::mem::replace(&mut self.input, GateInput::None) {
            GateInput::Buffer(gate) => {
                if gate.len() != frames {
                    return Err(SoundError::FrameCountMismatch {
                        expected: frames,
                        got: gate.len(),
                    });
                }
                let (events, held, _end) = gate_to_events(&gate, self.last_gate, self.core.index);
                self.last_gate = held;
                events
            }
            GateInput::Events(events) => events,
            GateInput::None => return Err(SoundError::MissingGateInput),
        };

        // The gate's frame indexing is assumed to be synchronized with the
        // envelope's own index (both advance by the same frame count per
        // window).
        let mut index = self.core.index;
        let mut out: Vec<f32> = Vec::with_capacity(frames);

        for (event_index, event) in events {
            while index < event_index {
                let segment = self.curve(index, event_index);
                if segment.is_empty() {
                    break;
                }
                index += segment.len() as u64;
                out.extend(segment.iter().map(|&v| v as f32));
            }

            match event {
                GateEvent::Open if self.state != EnvelopeState::Attack => {
                    self.state = EnvelopeState::Attack;
                    self.start = index;
                    self.valu0 = self.valu1;
                }
                GateEvent::Close
                    if !matches!(self.state, EnvelopeState::Release | EnvelopeState::Idle) =>
                {
                    self.state = EnvelopeState::Release;
                    self.start = index;
                    self.valu0 = self.valu1;
                }
                _ => {}
            }
        }

        Ok(out)
    }

    fn reset(&mut self, _shared: bool) {
        self.core_mut().clear_runtime();
        self.state = EnvelopeState::Idle;
        self.start = 0;
        self.valu0 = 0.0;
        self.valu1 = 0.0;
        self.last_gate = false;
        self.input = GateInput::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EPSILON, FPS};

    fn run_gate(env: &mut Envelope, gate: &[f32], chunk: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(gate.len());
        for window in gate.chunks(chunk) {
            env.set_required_frames(window.len(), false);
            out.extend(env.process(window));
        }
        out
    }

    #[test]
    fn adsr_timing_matches_gate() {
        let sustain_eps = 1e-3;
        let mut env = Envelope::new(0.1, 0.0, 1.0, 0.2);

        let close_at = (0.3 * FPS as f64) as usize;
        let total = (0.6 * FPS as f64) as usize;
        let mut gate = vec![0.0f32; total];
        for s in gate[..close_at].iter_mut() {
            *s = 1.0;
        }

        let out = run_gate(&mut env, &gate, 1024);

        // Rises to full level within the attack time.
        let attack_frames = (0.1 * FPS as f64).ceil() as usize;
        assert!(out[attack_frames] >= 1.0 - sustain_eps as f32);

        // Holds at 1 until the gate closes (decay=0, sustain=1).
        assert!(out[close_at - 1] >= 1.0 - sustain_eps as f32);

        // Decays to ~0 by close + release.
        let released = close_at + (0.2 * FPS as f64).ceil() as usize;
        assert!(out[released] <= sustain_eps as f32);
        assert_eq!(env.state(), EnvelopeState::Idle);
    }

    #[test]
    fn decay_skips_sustain_when_level_is_zero() {
        let mut env = Envelope::new(0.0, 0.05, 0.0, 0.1);

        let gate = vec![1.0f32; (0.2 * FPS as f64) as usize];
        let out = run_gate(&mut env, &gate, 512);

        assert_eq!(env.state(), EnvelopeState::Idle);
        assert!(out.last().copied().unwrap() <= EPSILON as f32);
    }

    #[test]
    fn reopen_mid_release_restarts_attack_from_current_value() {
        let mut env = Envelope::new(0.05, 0.0, 1.0, 0.5);
        let frames = 1024;

        env.set_required_frames(frames, false);

        // Open, reach sustain.
        let open = vec![1.0f32; frames];
        for _ in 0..5 {
            env.process(&open);
        }
        assert_eq!(env.state(), EnvelopeState::Sustain);

        // Close, decay partway into the release.
        let closed = vec![0.0f32; frames];
        for _ in 0..4 {
            env.process(&closed);
        }
        assert_eq!(env.state(), EnvelopeState::Release);
        let mid_release = env.value();
        assert!(mid_release > 0.05 && mid_release < 1.0, "got {mid_release}");

        // Reopen: the attack must continue from the mid-release value, not 0.
        let out = env.process(&open);
        assert!(
            out[0] as f64 >= mid_release - 0.01,
            "attack restarted from {} instead of {mid_release}",
            out[0]
        );
        assert!(out.windows(2).all(|w| w[1] >= w[0] - 1e-6));
    }

    #[test]
    fn event_list_input_matches_gate_buffer_input() {
        let frames = 2048;
        let mut gate = vec![0.0f32; frames];
        for s in gate[100..1500].iter_mut() {
            *s = 1.0;
        }

        let mut from_buffer = Envelope::new(0.01, 0.02, 0.6, 0.05);
        from_buffer.set_required_frames(frames, false);
        let a = from_buffer.process(&gate);

        let mut from_events = Envelope::new(0.01, 0.02, 0.6, 0.05);
        from_events.set_required_frames(frames, false);
        let (events, _, _) = gate_to_events(&gate, false, 0);
        let b = from_events.process_events(events);

        assert_eq!(a, b);
    }

    #[test]
    fn missing_gate_input_latches_done() {
        let mut env = Envelope::new(0.1, 0.1, 0.5, 0.1);
        let out = env.consume_raw(256);

        assert_eq!(out.len(), 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(env.check_done());
    }

    #[test]
    fn exponential_envelope_completes() {
        let mut env = Envelope::new(0.0, 0.1, 0.0, 0.0).exponential();

        let gate = vec![1.0f32; (0.15 * FPS as f64) as usize];
        let out = run_gate(&mut env, &gate, 700);

        // Attack is instantaneous, decay is exponential toward 0.
        assert!(out[0] >= 0.9);
        assert!(out.last().copied().unwrap() <= 0.02);
        assert_eq!(env.state(), EnvelopeState::Idle);
    }
}
