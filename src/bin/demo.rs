//! oscine demo - plays a short sequence through the default output device
//!
//! Run with: cargo run --bin oscine-demo

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use color_eyre::Result;

use oscine::player::transport;
use oscine::voices;
use oscine::{GatedSound, Player, SoundHandle};

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let mut player = Player::new();
    transport::set_bpm(120.0);
    transport::set_master_volume(0.6);

    let lead: Arc<Mutex<_>> = Arc::new(Mutex::new(voices::saw_lead()));
    let bass: Arc<Mutex<_>> = Arc::new(Mutex::new(voices::square_bass()));
    let kick: Arc<Mutex<_>> = Arc::new(Mutex::new(voices::kick()));

    let lead_handle: SoundHandle = lead.clone();
    let bass_handle: SoundHandle = bass.clone();
    let kick_handle: SoundHandle = kick.clone();

    // One bar of C minor, eighth notes on the lead, kick on the quarters.
    let melody = [60.0, 63.0, 65.0, 63.0, 67.0, 65.0, 63.0, 60.0];
    let beat = Duration::from_millis(250);

    for (i, &note) in melody.iter().enumerate() {
        lead.lock().unwrap().play_note(Some(note), Some(0.125));
        player.play(&lead_handle);

        if i % 2 == 0 {
            kick.lock().unwrap().play_note(None, Some(0.25));
            player.play(&kick_handle);

            bass.lock().unwrap().play_note(Some(note - 24.0), Some(0.25));
            player.play(&bass_handle);
        }

        thread::sleep(beat);
    }

    // Let the last releases ring out.
    thread::sleep(Duration::from_secs(1));
    Ok(())
}
