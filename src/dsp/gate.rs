#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A gate or gate-derived transition.
///
/// `Continue` is the trailing sentinel emitted by [`gate_to_events`],
/// marking the end of the analyzed window so consumers know how far the
/// held gate value extends.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    Open,
    Close,
    Continue,
}

/// Compress a boolean gate buffer into a minimal ordered list of
/// `(frame, Open|Close)` transitions plus a trailing `(end, Continue)`
/// sentinel.
///
/// `last_value` is the gate value held at the end of the previous buffer,
/// so open/closed state stays continuous across buffer boundaries. `index`
/// is the absolute frame index of the buffer's first sample.
///
/// Returns the events, the value held at the end of this buffer, and the
/// absolute end index.
pub fn gate_to_events(
    gate: &[f32],
    last_value: bool,
    index: u64,
) -> (Vec<(u64, GateEvent)>, bool, u64) {
    let end = index + gate.len() as u64;

    let mut events = Vec::new();
    let mut value = last_value;
    let mut offset = 0usize;
    let mut frame = index;

    loop {
        let rest = &gate[offset..];
        let transition = if value {
            rest.iter().position(|&s| s <= 0.0)
        } else {
            rest.iter().position(|&s| s > 0.0)
        };

        let Some(at) = transition else { break };

        value = !value;
        offset += at;
        frame += at as u64;
        events.push((frame, if value { GateEvent::Open } else { GateEvent::Close }));
    }

    events.push((end, GateEvent::Continue));

    (events, value, end)
}
