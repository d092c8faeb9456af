use std::collections::HashMap;
use std::f64::consts::{PI, TAU};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::FPS;

/*
Band-Limited Harmonic Tables
============================

Naive sawtooth and square waveforms contain harmonics all the way up the
spectrum; sampling them directly aliases everything above Nyquist back into
the audible range. Instead we synthesize one cycle of the waveform from a
finite Fourier series and play it back by table lookup.

A table is one waveform cycle at TABLE_SIZE samples, built incrementally:

    table(k) = table(k−1) + harmonic_k           k in 1..=MAX_HARMONICS

Sawtooth harmonic:   -2/π · (−1)^k / k · sin(k·θ)
Square harmonic:      4/(π·k) · sin(π·k·d) · cos(k·θ)   (+ DC offset 2d−1 at k=1)

where d is the square wave's duty cycle, discretized into DUTY_STEPS + 1
buckets so tables can be cached per bucket.

Tables are built lazily on first request and cached for the lifetime of the
process; once built they are immutable. The oscillator picks k from the mean
frequency so the highest harmonic stays below Nyquist, capped at
MAX_HARMONICS.
*/

/// Samples per cached waveform cycle.
pub const TABLE_SIZE: usize = 1024;

/// Highest harmonic count a table may sum.
pub const MAX_HARMONICS: u32 = 128;

/// Number of duty-cycle buckets for square tables (buckets 0..=DUTY_STEPS).
pub const DUTY_STEPS: u32 = 64;

/// One immutable cached waveform cycle.
pub type Cycle = Arc<[f64]>;

fn saw_cache() -> &'static Mutex<HashMap<u32, Cycle>> {
    static CACHE: OnceLock<Mutex<HashMap<u32, Cycle>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn square_cache() -> &'static Mutex<HashMap<(u32, u32), Cycle>> {
    static CACHE: OnceLock<Mutex<HashMap<(u32, u32), Cycle>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[inline]
fn theta(i: usize) -> f64 {
    TAU * i as f64 / TABLE_SIZE as f64
}

fn add_sawtooth_harmonic(cycle: &mut [f64], k: u32) {
    let kf = k as f64;
    let parity = if k % 2 == 0 { 1.0 } else { -1.0 };
    let scale = -2.0 / PI * parity / kf;

    for (i, sample) in cycle.iter_mut().enumerate() {
        *sample += scale * (kf * theta(i)).sin();
    }
}

fn add_square_harmonic(cycle: &mut [f64], k: u32, duty: f64) {
    let kf = k as f64;
    let scale = 4.0 / PI / kf * (PI * kf * duty).sin();

    for (i, sample) in cycle.iter_mut().enumerate() {
        *sample += scale * (kf * theta(i)).cos();
    }
}

/// One cycle of a band-limited sawtooth summing the first `nharmonics`
/// harmonics. Built lazily, cached for the process lifetime.
pub fn sawtooth_cycle(nharmonics: u32) -> Cycle {
    let n = nharmonics.clamp(1, MAX_HARMONICS);
    let mut cache = lock(saw_cache());

    if let Some(cycle) = cache.get(&n) {
        return Arc::clone(cycle);
    }

    // Continue from the richest table already built below n.
    let (mut k, mut acc) = match (1..n).rev().find(|k| cache.contains_key(k)) {
        Some(k) => (k, cache[&k].to_vec()),
        None => (0, vec![0.0; TABLE_SIZE]),
    };

    while k < n {
        k += 1;
        add_sawtooth_harmonic(&mut acc, k);
        cache.insert(k, Arc::from(acc.as_slice()));
    }

    Arc::clone(&cache[&n])
}

/// One cycle of a band-limited square wave for the given harmonic count and
/// duty bucket (`0..=DUTY_STEPS`, bucket `d` meaning duty `d / DUTY_STEPS`).
pub fn square_cycle(nharmonics: u32, duty_step: u32) -> Cycle {
    let n = nharmonics.clamp(1, MAX_HARMONICS);
    let d = duty_step.min(DUTY_STEPS);
    let duty = d as f64 / DUTY_STEPS as f64;

    let mut cache = lock(square_cache());

    if let Some(cycle) = cache.get(&(n, d)) {
        return Arc::clone(cycle);
    }

    let (mut k, mut acc) = match (1..n).rev().find(|&k| cache.contains_key(&(k, d))) {
        Some(k) => (k, cache[&(k, d)].to_vec()),
        None => (0, vec![0.0; TABLE_SIZE]),
    };

    while k < n {
        k += 1;
        if k == 1 {
            // DC offset so a duty-d pulse is centered correctly.
            for sample in acc.iter_mut() {
                *sample += 2.0 * duty - 1.0;
            }
        }
        add_square_harmonic(&mut acc, k, duty);
        cache.insert((k, d), Arc::from(acc.as_slice()));
    }

    Arc::clone(&cache[&(n, d)])
}

/// Number of harmonics to sum for a fundamental frequency so the highest
/// harmonic stays below Nyquist, capped at [`MAX_HARMONICS`].
pub fn harmonics_for(freq: f64) -> u32 {
    let n = (FPS as f64 / 2.0 / freq).floor();
    n.clamp(1.0, MAX_HARMONICS as f64) as u32
}

/// Map an accumulated phase (radians) to a table index.
#[inline]
pub fn phase_to_index(radians: f64) -> usize {
    let i = (TABLE_SIZE as f64 / TAU * radians) as i64;
    i.rem_euclid(TABLE_SIZE as i64) as usize
}
