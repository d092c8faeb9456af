//! The sound-node tree: the base abstraction shared by every node plus the
//! concrete generators.
//!
//! A node tree is constructed once, `play()`ed, and then pulled for buffers
//! by the player's rendering thread. Parents exclusively own their children
//! and call [`Sound::render`] on them from inside their own synthesis step;
//! the required frame count is propagated top-down before any node renders,
//! so all siblings produce buffers of the same length.

/// ADSR envelope node driven by gate buffers.
pub mod envelope;
/// Time-scheduled latency-compensated gate and the playable-sound trait.
pub mod gate;
/// Core trait, lifecycle rules and done-detection shared by all nodes.
pub mod node;
/// Band-limited waveform generator node.
pub mod oscillator;
/// Sub-nodes referenced from multiple places in a graph.
pub mod shared;
