//! Low-level DSP math used by the higher level graph nodes.
//!
//! These components are self-contained and perform no scheduling or
//! lifecycle bookkeeping. They intentionally stay focused on the
//! signal-processing math so the graph layer can layer on gating,
//! state machines and buffer management.

/// Linear and exponential envelope curve segments.
pub mod curve;
/// Gate buffer to open/close event-list compression.
pub mod gate;
/// Phase-accumulator waveform generators.
pub mod waveform;
/// Cached band-limited harmonic tables for sawtooth/square synthesis.
pub mod wavetable;

pub use gate::GateEvent;
