use std::f64::consts::{PI, TAU};

use crate::dsp::wavetable::{
    harmonics_for, phase_to_index, sawtooth_cycle, square_cycle, Cycle, DUTY_STEPS,
};
use crate::FPS;

/*
Waveform Generators
===================

Every generator here is driven by an accumulated phase in radians. The
caller passes the phase reached at the end of the previous buffer and gets
back the phase to resume from, so waveforms stay phase-continuous across
buffer boundaries even when frequency changes between (or within) calls.

Sine and triangle are computed directly from the phase. Sawtooth and square
are band-limited: one cycle is synthesized from a finite harmonic series
(see `wavetable`) and played back by indexing the cached cycle with the
current phase.

The square wave's duty cycle may vary per sample. Duty is discretized into
DUTY_STEPS buckets selecting a table variant per sample; the switch is not
synchronized to cycle boundaries, so fast duty modulation can alias. This
mirrors the reference behavior and is an accepted approximation.
*/

/// A control input that is either a single scalar or one value per frame.
#[derive(Clone, Copy, Debug)]
pub enum Control<'a> {
    Fixed(f64),
    Samples(&'a [f64]),
}

impl Control<'_> {
    #[inline]
    pub fn at(&self, i: usize) -> f64 {
        match self {
            Control::Fixed(v) => *v,
            Control::Samples(s) => s[i],
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Control::Fixed(v) => *v,
            Control::Samples(s) if s.is_empty() => 0.0,
            Control::Samples(s) => s.iter().sum::<f64>() / s.len() as f64,
        }
    }
}

/// Accumulate per-sample phase for `frames` samples starting at `phase`.
///
/// Returns the phase of each sample and the phase to resume from on the
/// next call.
pub fn radians(freq: Control, phase: f64, frames: usize) -> (Vec<f64>, f64) {
    let step = TAU / FPS as f64;

    let mut out = Vec::with_capacity(frames);
    let mut acc = phase;
    for i in 0..frames {
        out.push(acc);
        acc += step * freq.at(i);
    }

    (out, acc)
}

pub fn sine_wave(freq: Control, phase: f64, frames: usize) -> (Vec<f32>, f64) {
    let (rads, next) = radians(freq, phase, frames);
    let samples = rads.iter().map(|&r| r.sin() as f32).collect();
    (samples, next)
}

pub fn triangle_wave(freq: Control, phase: f64, frames: usize) -> (Vec<f32>, f64) {
    let (rads, next) = radians(freq, phase, frames);
    let samples = rads
        .iter()
        .map(|&r| {
            let ramp = r.rem_euclid(TAU) / PI - 1.0;
            (1.0 - 2.0 * ramp.abs()) as f32
        })
        .collect();
    (samples, next)
}

/// Band-limited sawtooth. `sign` of -1 flips the waveform upside down.
/// `nharmonics` overrides the Nyquist-derived harmonic count when given.
pub fn sawtooth_wave(
    freq: Control,
    phase: f64,
    frames: usize,
    sign: f64,
    nharmonics: Option<u32>,
) -> (Vec<f32>, f64) {
    let (rads, next) = radians(freq, phase, frames);

    // The harmonic count comes from the mean frequency; when the frequency
    // modulates within the buffer this may admit some aliasing.
    let n = nharmonics.unwrap_or_else(|| harmonics_for(freq.mean()));
    let cycle = sawtooth_cycle(n);

    let samples = rads
        .iter()
        .map(|&r| (cycle[phase_to_index(r)] * sign) as f32)
        .collect();

    (samples, next)
}

/// Band-limited square/pulse wave with variable duty cycle.
pub fn square_wave(
    freq: Control,
    phase: f64,
    frames: usize,
    duty: Control,
    nharmonics: Option<u32>,
) -> (Vec<f32>, f64) {
    let (rads, next) = radians(freq, phase, frames);

    let n = nharmonics.unwrap_or_else(|| harmonics_for(freq.mean()));

    let samples = match duty {
        Control::Fixed(d) => {
            let step = (d * DUTY_STEPS as f64) as u32;
            let cycle = square_cycle(n, step);
            rads.iter()
                .map(|&r| cycle[phase_to_index(r)] as f32)
                .collect()
        }
        Control::Samples(_) => {
            // Modulated duty: at most DUTY_STEPS+1 table variants, fetched
            // lazily as buckets are first hit.
            let mut cycles: Vec<Option<Cycle>> = vec![None; DUTY_STEPS as usize + 1];
            rads.iter()
                .enumerate()
                .map(|(i, &r)| {
                    let d = duty.at(i).clamp(0.01, 0.99);
                    let step = (d * DUTY_STEPS as f64) as usize;
                    let cycle = cycles[step]
                        .get_or_insert_with(|| square_cycle(n, step as u32));
                    cycle[phase_to_index(r)] as f32
                })
                .collect()
        }
    };

    (samples, next)
}
