pub mod dsp;
pub mod graph; // Composable sound-node tree
pub mod player; // Real-time output, mixing, transport
pub mod voices; // Ready-made gated instruments

pub use dsp::gate::GateEvent;
pub use graph::envelope::{Envelope, EnvelopeState};
pub use graph::gate::{GateHandle, GatedSound, LatencyGate};
pub use graph::node::{freq2key, key2freq, Sound, SoundCore, SoundError};
pub use graph::oscillator::{Oscillator, Shape};
pub use graph::shared::SharedSound;
pub use player::{Player, SoundHandle};

/// Engine sample rate in frames per second.
pub const FPS: usize = 44_100;

/// Frequency of middle C (key 60) in Hz.
pub const MIDDLE_C: f64 = 261.63;

/// Default output amplitude for newly constructed sound nodes.
pub const DEFAULT_AMP: f32 = 0.5;

/// Tolerance used when deciding an envelope curve segment has completed.
pub const EPSILON: f64 = 1e-6;

/// Fixed latency-compensation offset, in seconds, added to scheduled gate
/// times so perceived timing matches requested timing.
pub const LATENCY: f64 = 0.03;
