//! Window system that hands out numbered off-screen windows

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::capture::{NativeWindow, WindowSystem};
use crate::error::{CamrecError, Result};
use crate::types::SurfaceId;

#[derive(Debug, Default)]
struct WindowLedger {
    next_id: u64,
    live: HashSet<u64>,
    acquired: u64,
    released: u64,
    unknown_releases: u64,
}

/// Shared view of window acquisitions
#[derive(Debug, Clone, Default)]
pub struct WindowProbe(Arc<Mutex<WindowLedger>>);

impl WindowProbe {
    /// Windows acquired and not yet released
    pub fn live(&self) -> usize {
        self.0.lock().live.len()
    }

    /// Total acquisitions
    pub fn acquired(&self) -> u64 {
        self.0.lock().acquired
    }

    /// Total releases
    pub fn released(&self) -> u64 {
        self.0.lock().released
    }

    /// Releases of windows this system never handed out
    pub fn unknown_releases(&self) -> u64 {
        self.0.lock().unknown_releases
    }
}

/// Counting [`WindowSystem`]
#[derive(Debug, Clone)]
pub struct SyntheticWindows {
    width: u32,
    height: u32,
    fail_acquire: bool,
    probe: WindowProbe,
}

impl SyntheticWindows {
    /// Windows of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fail_acquire: false,
            probe: WindowProbe::default(),
        }
    }

    /// Make every `acquire` fail
    pub fn failing() -> Self {
        Self {
            fail_acquire: true,
            ..Self::default()
        }
    }

    /// Acquisition counters
    pub fn probe(&self) -> WindowProbe {
        self.probe.clone()
    }
}

impl Default for SyntheticWindows {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl WindowSystem for SyntheticWindows {
    fn acquire(&mut self, surface: SurfaceId) -> Result<NativeWindow> {
        if self.fail_acquire {
            return Err(CamrecError::camera(format!(
                "No native window behind {}",
                surface
            )));
        }
        let mut ledger = self.probe.0.lock();
        ledger.next_id += 1;
        let id = ledger.next_id;
        ledger.live.insert(id);
        ledger.acquired += 1;
        debug!("Window {} acquired for {}", id, surface);
        Ok(NativeWindow::new(id, self.width, self.height))
    }

    fn release(&mut self, window: NativeWindow) {
        let id = window.handle().0;
        let mut ledger = self.probe.0.lock();
        if ledger.live.remove(&id) {
            ledger.released += 1;
            debug!("Window {} released", id);
        } else {
            ledger.unknown_releases += 1;
            warn!("Release of unknown window {}", id);
        }
    }
}
