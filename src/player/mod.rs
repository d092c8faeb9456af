//! Concurrent playback: a background audio worker drives a cpal output
//! stream, mixing every playing sound tree into one master buffer per
//! callback.
//!
//! Control threads never share locks with the steady-state audio path:
//! new sounds are handed off through a lock-free queue, and tempo, volume
//! and stream timing live in [`transport`]'s atomics. The one mutex the
//! callback takes guards state only it and the sound-handoff consumer
//! touch, so it is effectively uncontended.

pub mod recorder;
pub mod transport;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::graph::node::Sound;
use crate::player::recorder::{RecordMeta, Recorder};
use crate::FPS;

/// A sound tree shared between a control thread and the audio worker.
pub type SoundHandle = Arc<Mutex<dyn Sound>>;

const CHANNELS: usize = 2;
const HANDOFF_CAPACITY: usize = 256;
/// Interval between checks for a changed default output device.
const DEVICE_POLL: Duration = Duration::from_secs(1);
/// Length of the fade-in after an output glitch.
const FADE_SECONDS: f64 = 1.0;
const FADE_FLOOR: f64 = 0.01;

/// State owned by the audio callback.
struct RenderState {
    incoming: Consumer<SoundHandle>,
    live: Vec<SoundHandle>,
}

/// State shared between control threads and the audio callback.
struct PlayerShared {
    recorder: Mutex<Recorder>,
    stop_all: AtomicBool,
    /// Wall-clock time of the last output glitch, as `f64` bits; 0 = none.
    safety_event: AtomicU64,
}

impl PlayerShared {
    fn arm_fade(&self) {
        self.safety_event
            .store(transport::wall_clock().to_bits(), Ordering::Release);
    }

    /// Gain ramp applied after a glitch: silence-adjacent immediately
    /// after the event, back to unity within [`FADE_SECONDS`].
    fn fade_gain(&self, t0: f64) -> f32 {
        match self.safety_event.load(Ordering::Acquire) {
            0 => 1.0,
            bits => {
                let armed = f64::from_bits(bits);
                if t0 < armed + FADE_SECONDS {
                    (t0 - armed).clamp(FADE_FLOOR, 1.0) as f32
                } else {
                    1.0
                }
            }
        }
    }
}

/// Stream settings a control thread can change; applied on rebuild.
struct StreamParams {
    buffer_frames: Option<u32>,
}

/// Handle to the playback engine.
///
/// Creating a `Player` is cheap; the audio worker thread and output
/// stream start on the first [`Player::play`]. Dropping the `Player`
/// shuts the worker down.
pub struct Player {
    tx: Producer<SoundHandle>,
    state: Arc<Mutex<RenderState>>,
    shared: Arc<PlayerShared>,
    params: Arc<Mutex<StreamParams>>,
    wake_tx: mpsc::Sender<()>,
    wake_rx: Option<mpsc::Receiver<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    pub fn new() -> Self {
        let (tx, rx) = RingBuffer::new(HANDOFF_CAPACITY);
        let (wake_tx, wake_rx) = mpsc::channel();

        Self {
            tx,
            state: Arc::new(Mutex::new(RenderState {
                incoming: rx,
                live: Vec::new(),
            })),
            shared: Arc::new(PlayerShared {
                recorder: Mutex::new(Recorder::new()),
                stop_all: AtomicBool::new(false),
                safety_event: AtomicU64::new(0),
            }),
            params: Arc::new(Mutex::new(StreamParams {
                buffer_frames: None,
            })),
            wake_tx,
            wake_rx: Some(wake_rx),
            worker: None,
        }
    }

    /// Start (or keep) playing a sound tree.
    ///
    /// The handle stays valid for retriggering: scheduling another note on
    /// it while it is already live does not duplicate it in the mix.
    pub fn play(&mut self, handle: &SoundHandle) {
        self.ensure_worker();
        if self.tx.push(Arc::clone(handle)).is_err() {
            tracing::warn!("sound handoff queue full; sound dropped");
        }
    }

    /// Wrap a sound tree in a handle and start playing it.
    pub fn play_sound(&mut self, sound: impl Sound + 'static) -> SoundHandle {
        let handle: SoundHandle = Arc::new(Mutex::new(sound));
        self.play(&handle);
        handle
    }

    /// Drop every live sound at the next callback.
    pub fn stop_all(&self) {
        self.shared.stop_all.store(true, Ordering::Release);
    }

    /// Tear down and rebuild the output stream, optionally with a fixed
    /// buffer size in frames.
    pub fn reset_stream(&self, buffer_frames: Option<u32>) {
        {
            let mut params = self.params.lock().unwrap_or_else(PoisonError::into_inner);
            params.buffer_frames = buffer_frames;
        }
        let _ = self.wake_tx.send(());
    }

    /// Begin capturing up to `limit_secs` seconds of the master mix.
    pub fn start_recording(&self, limit_secs: f64) {
        self.shared
            .recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(limit_secs);
    }

    /// End the capture and return the recorded audio.
    pub fn stop_recording(&self) -> (Vec<f32>, Option<RecordMeta>) {
        self.shared
            .recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop()
    }

    fn ensure_worker(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let Some(wake_rx) = self.wake_rx.take() else {
            return;
        };

        let state = Arc::clone(&self.state);
        let shared = Arc::clone(&self.shared);
        let params = Arc::clone(&self.params);

        let worker = thread::Builder::new()
            .name("oscine-audio".into())
            .spawn(move || worker_loop(state, shared, params, wake_rx));

        match worker {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => tracing::error!(error = %err, "failed to spawn audio worker"),
        }
    }
}

/// Owns the cpal stream. Rebuilds it when the default output device
/// changes, when a control thread requests it, or after a build failure;
/// exits when the owning [`Player`] is dropped.
fn worker_loop(
    state: Arc<Mutex<RenderState>>,
    shared: Arc<PlayerShared>,
    params: Arc<Mutex<StreamParams>>,
    wake_rx: mpsc::Receiver<()>,
) {
    let host = cpal::default_host();

    loop {
        let stream = match build_stream(&host, &state, &shared, &params) {
            Ok(stream) => Some(stream),
            Err(err) => {
                tracing::warn!(error = %err, "failed to open output stream; retrying");
                None
            }
        };
        let mut device_name = default_device_name(&host);

        let rebuild = loop {
            match wake_rx.recv_timeout(DEVICE_POLL) {
                Ok(()) => break true,
                Err(RecvTimeoutError::Timeout) => {
                    let name = default_device_name(&host);
                    if name != device_name {
                        tracing::info!(device = ?name, "default output device changed");
                        device_name = name;
                        break true;
                    }
                    if stream.is_none() {
                        break true;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break false,
            }
        };

        if stream.is_some() {
            drop(stream);
            transport::clear_schedule();
            transport::record_reset();
        }
        if !rebuild {
            return;
        }
    }
}

fn default_device_name(host: &cpal::Host) -> Option<String> {
    host.default_output_device().and_then(|d| d.name().ok())
}

fn build_stream(
    host: &cpal::Host,
    state: &Arc<Mutex<RenderState>>,
    shared: &Arc<PlayerShared>,
    params: &Arc<Mutex<StreamParams>>,
) -> Result<cpal::Stream, Box<dyn std::error::Error>> {
    let device = host
        .default_output_device()
        .ok_or("no default output device available")?;

    let buffer_frames = params
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .buffer_frames;
    let config = cpal::StreamConfig {
        channels: CHANNELS as u16,
        sample_rate: cpal::SampleRate(FPS as u32),
        buffer_size: buffer_frames
            .map(cpal::BufferSize::Fixed)
            .unwrap_or(cpal::BufferSize::Default),
    };

    let callback_state = Arc::clone(state);
    let callback_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], info| {
            stream_callback(data, info, &callback_state, &callback_shared);
        },
        move |err| {
            tracing::warn!(error = %err, "output stream error");
            error_shared.arm_fade();
        },
        None,
    )?;
    stream.play()?;

    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate = FPS,
        "output stream started"
    );
    Ok(stream)
}

fn stream_callback(
    data: &mut [f32],
    info: &cpal::OutputCallbackInfo,
    state: &Arc<Mutex<RenderState>>,
    shared: &Arc<PlayerShared>,
) {
    let t0 = transport::wall_clock();
    let timestamp = info.timestamp();
    let output_delay = timestamp
        .playback
        .duration_since(&timestamp.callback)
        .map_or(0.0, |d| d.as_secs_f64());

    transport::set_schedule(t0 + output_delay);
    transport::begin_render_pass();

    let frames = data.len() / CHANNELS;

    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let RenderState { incoming, live } = &mut *state;

    if shared.stop_all.swap(false, Ordering::AcqRel) {
        live.clear();
        while incoming.pop().is_ok() {}
    }
    merge_incoming(live, incoming);

    let mut mix = mix_sounds(live, frames);
    finalize_mix(&mut mix, transport::master_volume(), shared.fade_gain(t0));

    for (frame, &sample) in data.chunks_mut(CHANNELS).zip(&mix) {
        frame.fill(sample);
    }

    // Non-blocking so a control thread holding the recorder can never
    // stall the callback; a skipped chunk just shortens the capture.
    if let Ok(mut recorder) = shared.recorder.try_lock() {
        recorder.push(
            mix,
            RecordMeta {
                wall_time: t0,
                frames,
                output_delay,
            },
        );
    }
}

/// Move handed-off sounds into the live list, skipping any already there
/// so retriggering a playing sound never double-mixes it.
fn merge_incoming(live: &mut Vec<SoundHandle>, incoming: &mut Consumer<SoundHandle>) {
    while let Ok(handle) = incoming.pop() {
        if !live.iter().any(|h| Arc::ptr_eq(h, &handle)) {
            live.push(handle);
        }
    }
}

/// Render one buffer from every live sound into a mono sum, dropping
/// sounds that report done.
pub fn mix_sounds(live: &mut Vec<SoundHandle>, frames: usize) -> Vec<f32> {
    let mut mix = vec![0.0f32; frames];
    live.retain(|handle| {
        let mut sound = handle.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = sound.consume(frames);
        for (m, s) in mix.iter_mut().zip(&buffer) {
            *m += s;
        }
        !sound.check_done()
    });
    mix
}

/// Apply master volume, clip to the legal sample range, then apply the
/// post-glitch fade. The fade multiplies after clipping so it always
/// reduces level.
pub fn finalize_mix(mix: &mut [f32], volume: f32, fade: f32) {
    for sample in mix {
        *sample = (*sample * volume).clamp(-1.0, 1.0) * fade;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{SoundCore, SoundError};

    struct Constant {
        core: SoundCore,
        value: f32,
    }

    impl Constant {
        fn handle(value: f32) -> SoundHandle {
            let mut core = SoundCore::default();
            core.amp = 1.0;
            core.velocity = 128.0;
            Arc::new(Mutex::new(Constant { core, value }))
        }
    }

    impl Sound for Constant {
        fn core(&self) -> &SoundCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut SoundCore {
            &mut self.core
        }

        fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
            Ok(vec![self.value; self.core.frames])
        }
    }

    #[test]
    fn mix_sums_live_sounds() {
        let mut live = vec![Constant::handle(0.25), Constant::handle(0.5)];
        let mix = mix_sounds(&mut live, 64);

        assert_eq!(mix.len(), 64);
        assert!(mix.iter().all(|&s| (s - 0.75).abs() < 1e-6));
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn finalize_scales_then_clips() {
        let mut mix = vec![0.5f32, 1.5, -3.0];

        finalize_mix(&mut mix, 1.0, 1.0);
        assert_eq!(mix, vec![0.5, 1.0, -1.0]);

        let mut mix = vec![0.5f32, 1.5, -3.0];
        finalize_mix(&mut mix, 0.5, 1.0);
        assert_eq!(mix, vec![0.25, 0.75, -1.0]);
    }

    #[test]
    fn silent_sounds_are_dropped_from_the_live_list() {
        let mut live = vec![Constant::handle(0.0), Constant::handle(0.4)];

        // Past warm-up plus one callback of grace, the silent sound goes.
        let callbacks = FPS / 1024 + 3;
        for _ in 0..callbacks {
            mix_sounds(&mut live, 1024);
        }

        assert_eq!(live.len(), 1);
        let survivor = live[0].lock().unwrap();
        assert!(survivor.core().last_buffer().unwrap()[0] > 0.0);
    }

    #[test]
    fn merge_skips_handles_already_live() {
        let (mut tx, mut rx) = RingBuffer::<SoundHandle>::new(8);
        let a = Constant::handle(0.1);
        let b = Constant::handle(0.2);

        let mut live = vec![Arc::clone(&a)];
        tx.push(Arc::clone(&a)).unwrap();
        tx.push(Arc::clone(&b)).unwrap();
        tx.push(Arc::clone(&b)).unwrap();

        merge_incoming(&mut live, &mut rx);
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn fade_ramps_back_to_unity() {
        let shared = PlayerShared {
            recorder: Mutex::new(Recorder::new()),
            stop_all: AtomicBool::new(false),
            safety_event: AtomicU64::new(0),
        };

        let t0 = transport::wall_clock();
        assert_eq!(shared.fade_gain(t0), 1.0);

        shared.safety_event.store(t0.to_bits(), Ordering::Release);
        assert_eq!(shared.fade_gain(t0), FADE_FLOOR as f32);
        let mid = shared.fade_gain(t0 + 0.5);
        assert!(mid > 0.4 && mid < 0.6);
        assert_eq!(shared.fade_gain(t0 + 2.0), 1.0);
    }
}
