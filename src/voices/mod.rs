//! Ready-made gated instruments built from the graph primitives.
//!
//! Each voice is one sound tree: a [`LatencyGate`] feeding one or more
//! [`Envelope`]s shaping an [`Oscillator`]. They double as worked examples
//! of wiring a `forward()` by hand.

use crate::graph::envelope::Envelope;
use crate::graph::gate::{GatedSound, LatencyGate};
use crate::graph::node::{Sound, SoundCore, SoundError};
use crate::graph::oscillator::{Oscillator, Shape};
use crate::{DEFAULT_AMP, MIDDLE_C};

/// A single-oscillator subtractive-style voice: gate → ADSR → oscillator.
pub struct SimpleSynth {
    core: SoundCore,
    gate: LatencyGate,
    env: Envelope,
    osc: Oscillator,
}

impl SimpleSynth {
    pub fn new(shape: Shape, env: Envelope) -> Self {
        Self {
            core: SoundCore::new(MIDDLE_C, DEFAULT_AMP),
            gate: LatencyGate::new(),
            env,
            osc: Oscillator::new(shape),
        }
    }

    pub fn osc_mut(&mut self) -> &mut Oscillator {
        &mut self.osc
    }

    pub fn env_mut(&mut self) -> &mut Envelope {
        &mut self.env
    }
}

impl Sound for SimpleSynth {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Sound> {
        vec![&mut self.gate, &mut self.env, &mut self.osc]
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        let gate = self.gate.render();
        let env = self.env.process(&gate);

        // Track pitch set on the voice between windows.
        self.osc.set_freq(self.core.freq);
        let wave = self.osc.render();

        Ok(wave.iter().zip(&env).map(|(w, e)| w * e).collect())
    }
}

impl GatedSound for SimpleSynth {
    fn gate_mut(&mut self) -> &mut LatencyGate {
        &mut self.gate
    }
}

/// A percussive voice with a pitch envelope: the oscillator starts
/// `pitch_drop` key units above the base pitch and falls to it as the
/// (exponential) pitch envelope decays.
pub struct Pluck {
    core: SoundCore,
    gate: LatencyGate,
    amp_env: Envelope,
    pitch_env: Envelope,
    osc: Oscillator,
    /// Pitch offset at note onset, in semitone key units.
    pub pitch_drop: f64,
}

impl Pluck {
    pub fn new(shape: Shape, amp_env: Envelope, pitch_env: Envelope, pitch_drop: f64) -> Self {
        Self {
            core: SoundCore::new(MIDDLE_C, DEFAULT_AMP),
            gate: LatencyGate::new(),
            amp_env,
            pitch_env: pitch_env.exponential(),
            osc: Oscillator::new(shape),
            pitch_drop,
        }
    }
}

impl Sound for Pluck {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Sound> {
        vec![
            &mut self.gate,
            &mut self.amp_env,
            &mut self.pitch_env,
            &mut self.osc,
        ]
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        let gate = self.gate.render();
        let amp = self.amp_env.process(&gate);
        let pitch = self.pitch_env.process(&gate);

        self.osc.set_key(self.core.key());
        self.osc
            .set_key_modulation(pitch.iter().map(|&p| p as f64 * self.pitch_drop).collect());
        let wave = self.osc.render();

        Ok(wave.iter().zip(&amp).map(|(w, a)| w * a).collect())
    }
}

impl GatedSound for Pluck {
    fn gate_mut(&mut self) -> &mut LatencyGate {
        &mut self.gate
    }
}

/// A bright sawtooth lead.
pub fn saw_lead() -> SimpleSynth {
    SimpleSynth::new(Shape::Sawtooth, Envelope::new(0.02, 0.1, 0.8, 0.3))
}

/// A punchy pulse-wave bass with a narrowed duty cycle.
pub fn square_bass() -> SimpleSynth {
    let mut synth = SimpleSynth::new(Shape::Square, Envelope::new(0.01, 0.05, 0.6, 0.15));
    synth.osc.set_duty(0.3);
    synth.core.set_key(36.0);
    synth
}

/// A kick drum: a sine that sweeps down three octaves as it decays.
pub fn kick() -> Pluck {
    let mut voice = Pluck::new(
        Shape::Sine,
        Envelope::new(0.0, 0.0, 1.0, 0.25),
        Envelope::new(0.0, 0.35, 0.0, 0.0),
        36.0,
    );
    voice.core.set_key(36.0);
    voice
}
