//! End-to-end behavior of the synthesis pipeline through the public API.

use std::sync::{Arc, Mutex};

use oscine::player::{finalize_mix, mix_sounds, transport};
use oscine::voices;
use oscine::{
    Envelope, GatedSound, Oscillator, Shape, Sound, SoundCore, SoundError, SoundHandle, FPS,
};

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
        Ok(vec![self.value; self.core().frames])
    }
}

fn test_gate(frames: usize) -> Vec<f32> {
    let mut gate = vec![0.0f32; frames];
    // Two notes: a held one and a short retrigger.
    for s in gate[500..frames / 2].iter_mut() {
        *s = 1.0;
    }
    for s in gate[frames / 2 + 2000..frames / 2 + 6000].iter_mut() {
        *s = 1.0;
    }
    gate
}

#[test]
fn windowed_envelope_matches_single_pass() {
    let frames = FPS; // one second
    let gate = test_gate(frames);

    let mut whole = Envelope::new(0.03, 0.1, 0.7, 0.2);
    whole.set_required_frames(frames, false);
    let expected = whole.process(&gate);

    let mut chunked = Envelope::new(0.03, 0.1, 0.7, 0.2);
    let mut got = Vec::with_capacity(frames);
    // Deliberately uneven window sizes.
    for window in gate.chunks(941) {
        chunked.set_required_frames(window.len(), false);
        got.extend(chunked.process(window));
    }

    assert_eq!(expected, got);
}

#[test]
fn oscillator_is_continuous_across_uneven_windows() {
    let mut whole = Oscillator::new(Shape::Sawtooth).with_freq(220.0);
    let expected = whole.consume_raw(4096);

    let mut split = Oscillator::new(Shape::Sawtooth).with_freq(220.0);
    let mut got = split.consume_raw(1024);
    got.extend(split.consume_raw(512));
    got.extend(split.consume_raw(2560));

    assert_eq!(expected, got);
}

#[test]
fn master_mix_sums_scales_and_clips() {
    let mut live = vec![Constant::handle(0.5), Constant::handle(0.7)];

    let mut mix = mix_sounds(&mut live, 256);
    assert!(mix.iter().all(|&s| (s - 1.2).abs() < 1e-6));

    finalize_mix(&mut mix, 1.0, 1.0);
    assert!(mix.iter().all(|&s| s == 1.0), "sum above range must clip");

    let mut mix = mix_sounds(&mut live, 256);
    finalize_mix(&mut mix, 0.5, 1.0);
    assert!(mix.iter().all(|&s| (s - 0.6).abs() < 1e-6));
}

#[test]
fn voice_lifecycle_through_the_mixer() {
    let t_start = transport::wall_clock();

    let mut voice = voices::saw_lead();
    voice.play_note(Some(64.0), Some(0.25));
    let handle: SoundHandle = Arc::new(Mutex::new(voice));
    let mut live = vec![Arc::clone(&handle)];

    let window = 1024;
    let mut heard = false;
    let mut windows_until_gone = None;

    for i in 0..80 {
        transport::set_schedule(t_start + (i * window) as f64 / FPS as f64);
        transport::begin_render_pass();
        let mix = mix_sounds(&mut live, window);

        if mix.iter().any(|&s| s.abs() > 0.05) {
            heard = true;
        }
        if live.is_empty() {
            windows_until_gone = Some(i);
            break;
        }
    }
    transport::clear_schedule();

    assert!(heard, "voice never reached the mix");
    let gone = windows_until_gone.expect("finished voice was never dropped");

    // Gate latency + 0.25 s of note + 0.3 s of release, plus warm-up and
    // the one-callback grace: comfortably under 80 windows (~1.86 s).
    assert!(gone * window > (0.5 * FPS as f64) as usize, "dropped too early");

    // The handle survives for retriggering even after the mixer let go.
    handle
        .lock()
        .unwrap()
        .core_mut()
        .set_key(60.0);
}
