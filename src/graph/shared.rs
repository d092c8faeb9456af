use std::sync::{Arc, Mutex, PoisonError};

use crate::graph::node::{Sound, SoundCore, SoundError};
use crate::player::transport;
use crate::{DEFAULT_AMP, MIDDLE_C};

/// A node referenced from more than one place in a sound tree (or from
/// more than one tree), such as an LFO modulating several voices.
///
/// Each wrapper memoizes the underlying node's output for the duration of
/// one render pass, so however many parents pull from it per audio
/// callback, the inner node advances exactly once per callback and every
/// parent sees the same buffer. Resetting a parent tree does not rewind
/// the inner node.
pub struct SharedSound {
    core: SoundCore,
    inner: Arc<Mutex<dyn Sound>>,
    /// Render pass the cache was filled in; 0 = never.
    serial: u64,
    cached: Vec<f32>,
}

impl SharedSound {
    pub fn new(inner: Arc<Mutex<dyn Sound>>) -> Self {
        let mut core = SoundCore::new(MIDDLE_C, DEFAULT_AMP);
        core.set_shared(true);
        Self {
            core,
            inner,
            serial: 0,
            cached: Vec::new(),
        }
    }

    /// Another reference to the wrapped node, e.g. for a second wrapper.
    pub fn handle(&self) -> Arc<Mutex<dyn Sound>> {
        Arc::clone(&self.inner)
    }
}

impl Sound for SharedSound {
    fn core(&self) -> &SoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundCore {
        &mut self.core
    }

    fn forward(&mut self) -> Result<Vec<f32>, SoundError> {
        let frames = self.core.frames;
        let pass = transport::render_pass();

        let fresh = self.serial != 0 && self.serial == pass && self.cached.len() == frames;
        if !fresh {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.set_required_frames(frames, false);
            self.cached = inner.render();
            self.serial = pass;
        }

        Ok(self.cached.clone())
    }

    /// Clears only the wrapper's bookkeeping: the inner node is shared and
    /// keeps running across parent replays.
    fn reset(&mut self, _shared: bool) {
        self.core_mut().clear_runtime();
        self.serial = 0;
        self.cached.clear();
    }
}
