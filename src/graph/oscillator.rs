use std::str::FromStr;

use crate::dsp::waveform::{self, Control};
use crate::graph::node::{key2freq, Sound, SoundCore, SoundError};
use crate::{DEFAULT_AMP, MIDDLE_C};

/// The waveform families the oscillator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl FromStr for Shape {
    type Err = SoundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(Shape::Sine),
            "triangle" | "tri" => Ok(Shape::Triangle),
            "sawtooth" | "saw" => Ok(Shape::Sawtooth),
            "square" | "pulse" => Ok(Shape::Square),
            other => Err(SoundError::UnknownShape(other.to_string())),
        }
    }
}

/// Band-limited wavetable oscillator node.
///
/// Phase runs in radians and is carried across render windows, so
/// consecutive buffers are continuous even when frequency or duty change
/// between (or within) windows. Pitch and pulse duty accept per-sample
/// modulation buffers, set freshly for each window by a parent's
/// `forward()`.
pub struct Oscillator {
    core: SoundCore,
    pub shape: Shape,
    phase: f64,
    /// Ramp direction of the sawtooth, +1 rising or -1 falling.
    sign: f64,
    /// Pulse duty cycle of the square wave, 0 to 1.
    duty: f64,
    /// Band-limit override; `None` fills the spectrum up to Nyquist.
    harmonics: Option<u32>,
    /// Per-sample pitch offsets in semitone key units.
    key_modulation: Option<Vec<f64>>,
    /// Per-sample duty buffer overriding `duty`.
    duty_modulation: Option<Vec<f64>>,
}

impl Oscillator {
    pub fn new(shape: Shape) -> Self {
        Self {
            core: SoundCore::new(MIDDLE_C, DEFAULT_AMP),
            shape,
            phase: 0.0,
            sign: 1.0,
            duty: 0.5,
            harmonics: None,
            key_modulation: None,
            duty_modulation: None,
        }
    }

    pub fn with_freq(mut self, freq: f64) -> Self {
        self.core.freq = freq;
        self
    }

    pub fn with_key(mut self, key: f64) -> Self {
        self.core.set_key(key);
        self
    }

    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_sign(mut self, sign: f64) -> Self {
        self.sign = sign;
        self
    }

    pub fn with_duty(mut self, duty: f64) -> Self {
        self.duty = duty;
        self
    }

    pub fn with_harmonics(mut self, harmonics: u32) -> Self {
        self.harmonics = Some(harmonics);
        self
    }

    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub fn set_freq(&mut self, freq: f64) {
        self.core.freq = freq;
    }

    pub fn set_key(&mut self, key: f64) {
        self.core.set_key(key);
    }

    pub fn set_sign(&mut self, sign: f64) {
        self.sign = sign;
    }

    pub fn set_duty(&mut self, duty: f64) {
        self.duty = duty;
    }

    /// Per-sample pitch offsets in semitone key units for the next window;
    /// cleared after each render.
    pub fn set_key_modulation(&mut self, offsets: Vec<f64>) {
        self.key_modulation = Some(offsets);
    }

    /// Per-sample duty values for the next window; cleared after each
    /// render.
    pub fn set_duty_modulation(&mut self, duty: Vec<f64>) {
        self.duty_modulation = Some(duty);
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl Sound for Oscillator {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        let frames = self.core.frames;

        let key_mod = self.key_modulation.take();
        let duty_mod = self.duty_modulation.take();

        for buffer in [key_mod.as_ref(), duty_mod.as_ref()].into_iter().flatten() {
            if buffer.len() != frames {
                return Err(SoundError::FrameCountMismatch {
                    expected: frames,
                    got: buffer.len(),
                });
            }
        }

        // Pitch modulation is applied in key units so offsets are musical
        // intervals regardless of the base frequency.
        let freqs: Option<Vec<f64>> = key_mod.map(|offsets| {
            let base_key = self.core.key();
            offsets.iter().map(|&k| key2freq(base_key + k)).collect()
        });
        let freq = match &freqs {
            Some(f) => Control::Samples(f),
            None => Control::Fixed(self.core.freq),
        };

        let (samples, next_phase) = match self.shape {
            Shape::Sine => waveform::sine_wave(freq, self.phase, frames),
            Shape::Triangle => waveform::triangle_wave(freq, self.phase, frames),
            Shape::Sawtooth => {
                waveform::sawtooth_wave(freq, self.phase, frames, self.sign, self.harmonics)
            }
            Shape::Square => {
                let duty = match &duty_mod {
                    Some(d) => Control::Samples(d),
                    None => Control::Fixed(self.duty),
                };
                waveform::square_wave(freq, self.phase, frames, duty, self.harmonics)
            }
        };

        self.phase = next_phase;
        Ok(samples)
    }

    fn reset(&mut self, _shared: bool) {
        self.core_mut().clear_runtime();
        self.phase = 0.0;
        self.key_modulation = None;
        self.duty_modulation = None;
    }
}
