//! Process-wide playback state: master volume, tempo, the output stream's
//! schedule reference, and the render-pass serial.
//!
//! Everything here is a lock-free atomic so the audio callback and control
//! threads can touch it without blocking each other. Floats are stored as
//! their raw bit patterns.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static MASTER_VOLUME: AtomicU32 = AtomicU32::new(0x3F00_0000); // 0.5f32
static BPM: AtomicU64 = AtomicU64::new(0x406E_0000_0000_0000); // 240.0f64

/// Wall-clock time (seconds) the current audio buffer will start playing;
/// the raw bits of an `f64`, with 0 meaning "no stream active".
static SCHEDULE: AtomicU64 = AtomicU64::new(0);

/// Serial number of the current audio callback, used to detect whether a
/// shared node was already rendered this pass. Starts at 0 so the first
/// pass is 1 and a node's "never rendered" serial of 0 can't collide.
static RENDER_PASS: AtomicU64 = AtomicU64::new(0);

/// Count of output stream teardowns (device loss, reconfiguration).
static RESETS: AtomicU64 = AtomicU64::new(0);

pub fn master_volume() -> f32 {
    f32::from_bits(MASTER_VOLUME.load(Ordering::Relaxed))
}

pub fn set_master_volume(volume: f32) {
    let volume = volume.clamp(0.0, 1.0);
    MASTER_VOLUME.store(volume.to_bits(), Ordering::Relaxed);
}

pub fn bpm() -> f64 {
    f64::from_bits(BPM.load(Ordering::Relaxed))
}

pub fn set_bpm(bpm: f64) {
    BPM.store(bpm.to_bits(), Ordering::Relaxed);
}

/// The wall-clock time the current output buffer is scheduled to start
/// playing, or `None` when no stream is running.
pub fn schedule() -> Option<f64> {
    match SCHEDULE.load(Ordering::Acquire) {
        0 => None,
        bits => Some(f64::from_bits(bits)),
    }
}

pub fn set_schedule(t: f64) {
    SCHEDULE.store(t.to_bits(), Ordering::Release);
}

pub fn clear_schedule() {
    SCHEDULE.store(0, Ordering::Release);
}

pub fn render_pass() -> u64 {
    RENDER_PASS.load(Ordering::Acquire)
}

/// Advance to the next render pass and return its serial. Called once per
/// audio callback before any node renders.
pub fn begin_render_pass() -> u64 {
    RENDER_PASS.fetch_add(1, Ordering::AcqRel) + 1
}

pub fn record_reset() {
    RESETS.fetch_add(1, Ordering::Relaxed);
}

pub fn reset_count() -> u64 {
    RESETS.load(Ordering::Relaxed)
}

/// Seconds since the Unix epoch as a float.
pub fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Serializes tests that read or write the process-wide state above.
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
    GUARD.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
