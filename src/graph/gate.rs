use rtrb::{Consumer, Producer, RingBuffer};

use crate::dsp::gate::GateEvent;
use crate::graph::node::{Sound, SoundCore, SoundError};
use crate::player::transport;
use crate::{DEFAULT_AMP, FPS, LATENCY, MIDDLE_C};

/*
Latency gate
============

The gate turns wall-clock note timing into sample-accurate gate buffers.
A control thread says "open at time T" (or "T seconds after the previous
event"); the audio callback, which knows the wall-clock time its current
buffer will start playing, converts each pending event time to a frame
offset inside the buffer:

    offset = (T + LATENCY - buffer_start_time) * FPS

The fixed LATENCY pushes events slightly into the future so that an
"open now" lands inside the *next* buffer instead of in the past.
Events whose offset falls beyond the current buffer stay pending;
events in the past are truncated to offset 0 and so apply immediately.

The output is the gate level: 1.0 from the frame an open lands until the
frame its close lands (exclusive), 0.0 elsewhere. An open that is still
held at the end of the buffer fills through to the end; the held state
carries into the next buffer.

Scheduling from another thread goes through a `GateHandle`, a lock-free
single-producer queue drained at the start of each `forward()`.
*/

const COMMAND_QUEUE_SIZE: usize = 64;

/// A thread-safe scheduling endpoint for one [`LatencyGate`].
///
/// Commands are timestamped here, on the control thread, so relative
/// delays chain off this handle's last event even before the audio thread
/// has drained them.
pub struct GateHandle {
    tx: Producer<GateCommand>,
    last_t: f64,
}

pub(crate) struct GateCommand {
    t: f64,
    kind: GateEvent,
}

impl GateHandle {
    /// Open the gate.
    ///
    /// `t` is an absolute wall-clock time; `dt` is seconds after this
    /// handle's previous event. With neither, the event fires now. Times
    /// in the past are clamped to now.
    pub fn open(&mut self, t: Option<f64>, dt: Option<f64>) {
        self.push(t, dt, GateEvent::Open);
    }

    /// Close the gate; same timing rules as [`GateHandle::open`].
    pub fn close(&mut self, t: Option<f64>, dt: Option<f64>) {
        self.push(t, dt, GateEvent::Close);
    }

    fn push(&mut self, t: Option<f64>, dt: Option<f64>, kind: GateEvent) {
        let now = transport::wall_clock();
        let t = match (t, dt) {
            (Some(t), _) => t,
            (None, Some(dt)) => self.last_t + dt,
            (None, None) => now,
        };
        let t = t.max(now);
        self.last_t = t;

        if self.tx.push(GateCommand { t, kind }).is_err() {
            tracing::warn!(?kind, t, "gate command queue full; event dropped");
        }
    }
}

/// Sample-accurate gate signal generator.
pub struct LatencyGate {
    core: SoundCore,
    /// Events not yet emitted, ordered by time.
    pending: Vec<(f64, GateEvent)>,
    /// Whether the gate is currently open.
    value: bool,
    /// Set once the gate has opened at least once since reset.
    opened: bool,
    rx: Consumer<GateCommand>,
    handle: Option<GateHandle>,
}

impl Default for LatencyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyGate {
    pub fn new() -> Self {
        let (tx, rx) = RingBuffer::new(COMMAND_QUEUE_SIZE);
        Self {
            core: SoundCore::new(MIDDLE_C, DEFAULT_AMP),
            pending: Vec::new(),
            value: false,
            opened: false,
            rx,
            handle: Some(GateHandle {
                tx,
                last_t: transport::wall_clock(),
            }),
        }
    }

    /// Take the scheduling endpoint for use on another thread. Available
    /// once; `None` thereafter.
    pub fn take_handle(&mut self) -> Option<GateHandle> {
        self.handle.take()
    }

    /// Open the gate directly (single-threaded use); same timing rules as
    /// [`GateHandle::open`].
    pub fn open(&mut self, t: Option<f64>, dt: Option<f64>) {
        self.schedule(t, dt, GateEvent::Open);
    }

    /// Close the gate directly; same timing rules as [`GateHandle::open`].
    pub fn close(&mut self, t: Option<f64>, dt: Option<f64>) {
        self.schedule(t, dt, GateEvent::Close);
    }

    fn schedule(&mut self, t: Option<f64>, dt: Option<f64>, kind: GateEvent) {
        let now = transport::wall_clock();
        let last_t = self.pending.last().map_or(now, |&(t, _)| t);
        let t = match (t, dt) {
            (Some(t), _) => t,
            (None, Some(dt)) => last_t + dt,
            (None, None) => now,
        };
        self.apply(t.max(now), kind);
    }

    /// Insert an event, dropping any queued events later than it. Also the
    /// merge point for commands drained from the handle queue.
    fn apply(&mut self, t: f64, kind: GateEvent) {
        tracing::debug!(?kind, t, "gate event");
        while self.pending.last().is_some_and(|&(last, _)| last > t) {
            self.pending.pop();
        }
        self.pending.push((t, kind));
    }

    pub fn is_open(&self) -> bool {
        self.value
    }

    /// Whether the gate has opened at least once since the last reset.
    pub fn has_opened(&self) -> bool {
        self.opened
    }

    #[cfg(test)]
    fn pending(&self) -> &[(f64, GateEvent)] {
        &self.pending
    }
}

impl Sound for LatencyGate {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        while let Ok(cmd) = self.rx.pop() {
            self.apply(cmd.t, cmd.kind);
        }

        let frames = self.core.frames;
        let mut out = vec![0.0f32; frames];

        let t0 = transport::wall_clock();
        let schedule = transport::schedule();
        let mut i0 = 0usize;

        while let Some(&(t, kind)) = self.pending.first() {
            // With a live stream the buffer start time is known exactly;
            // without one, fall back to elapsed wall-clock time.
            let dt = match schedule {
                Some(start) => (t + LATENCY - start).max(0.0),
                None => (t - t0).max(0.0),
            };
            let df = (FPS as f64 * dt) as usize;
            let i1 = df.min(frames);
            if df > i1 {
                break;
            }

            match kind {
                GateEvent::Open if !self.value => {
                    self.value = true;
                    self.opened = true;
                    i0 = i1;
                }
                GateEvent::Close if self.value => {
                    self.value = false;
                    for s in out[i0..i1].iter_mut() {
                        *s += 1.0;
                    }
                }
                _ => {}
            }

            self.pending.remove(0);
        }

        if self.value {
            for s in out[i0..].iter_mut() {
                *s += 1.0;
            }
        }

        Ok(out)
    }

    fn reset(&mut self, _shared: bool) {
        self.core_mut().clear_runtime();
        self.pending.clear();
        self.value = false;
        self.opened = false;
    }
}

/// A playable instrument: a sound tree driven by a [`LatencyGate`].
///
/// The provided [`GatedSound::play_note`] is the one-call entry for
/// triggering a note: it rewinds the tree, sets the pitch and schedules
/// the gate to open now and close after the note's duration in beats.
pub trait GatedSound: Sound {
    fn gate_mut(&mut self) -> &mut LatencyGate;

    /// Trigger a note.
    ///
    /// `note` is a pitch in semitone key units (60 = middle C); `None`
    /// keeps the current pitch. `duration` is the gate-open time in
    /// whole-note units, converted to seconds via the transport tempo;
    /// `None` leaves the gate open until an explicit close.
    fn play_note(&mut self, note: Option<f64>, duration: Option<f64>) {
        self.reset(false);
        if let Some(note) = note {
            self.core_mut().set_key(note);
        }
        let dt = duration.map(|whole_notes| whole_notes * 4.0 * 60.0 / transport::bpm());

        let gate = self.gate_mut();
        gate.open(None, None);
        if let Some(dt) = dt {
            gate.close(None, Some(dt));
        }
    }
}
