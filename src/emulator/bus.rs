//! Virtual-bus driver seam.
//!
//! The emulator talks to the virtual gamepad bus through [`VirtualBus`], so
//! target lifecycle and submission logic can run against [`MockBus`] in
//! tests and on hosts without the driver. The real implementation is
//! [`crate::emulator::vigem::VigemBus`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use crate::translate::canonical::TargetProfile;
use crate::translate::encode::{Ds4Report, XboxReport};

/// Profile-specific encoded report, ready for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireReport {
    Xbox(XboxReport),
    Ds4(Ds4Report),
}

/// Rumble notification callback: (large_motor, small_motor), both 0..=255.
/// Invoked on a bus-driver thread; must be cheap and non-blocking.
pub type RumbleCallback = Arc<dyn Fn(u8, u8) + Send + Sync>;

/// Client connection to the virtual gamepad bus driver.
pub trait VirtualBus: Send {
    /// Plug in a new target of the given profile and return its handle.
    fn create_target(&mut self, profile: TargetProfile) -> Result<u64>;

    /// Unplug and free a target.
    fn destroy_target(&mut self, handle: u64) -> Result<()>;

    /// Submit one encoded report synchronously.
    fn submit(&mut self, handle: u64, report: &WireReport) -> Result<()>;

    /// Register for rumble notifications on an Xbox-style target.
    fn register_rumble(&mut self, handle: u64, callback: RumbleCallback) -> Result<()>;

    /// Drop a target's rumble registration. Safe to call when none exists.
    fn unregister_rumble(&mut self, handle: u64);
}

/// In-memory bus used by the test suite. Clones share state, so a test can
/// keep one clone while the emulator owns the other.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<MockBusState>,
}

#[derive(Default)]
struct MockBusState {
    next_handle: Mutex<u64>,
    targets: Mutex<HashMap<u64, TargetProfile>>,
    submits: Mutex<Vec<(u64, WireReport)>>,
    rumble: Mutex<HashMap<u64, RumbleCallback>>,
    fail_create: AtomicBool,
    fail_submit: AtomicBool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profiles of the targets currently plugged in.
    pub fn live_targets(&self) -> Vec<(u64, TargetProfile)> {
        let mut out: Vec<_> = self
            .state
            .targets
            .lock()
            .iter()
            .map(|(&h, &p)| (h, p))
            .collect();
        out.sort_by_key(|&(h, _)| h);
        out
    }

    /// Every report submitted so far, in order.
    pub fn submits(&self) -> Vec<(u64, WireReport)> {
        self.state.submits.lock().clone()
    }

    /// Make subsequent target creation fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent submissions fail.
    pub fn set_fail_submit(&self, fail: bool) {
        self.state.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// Deliver a rumble notification to a target's registered callback, the
    /// way the driver would (from this thread).
    pub fn fire_rumble(&self, handle: u64, large_motor: u8, small_motor: u8) {
        let callback = self.state.rumble.lock().get(&handle).cloned();
        if let Some(callback) = callback {
            callback(large_motor, small_motor);
        }
    }
}

impl VirtualBus for MockBus {
    fn create_target(&mut self, profile: TargetProfile) -> Result<u64> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("bus refused target creation"));
        }
        let mut next = self.state.next_handle.lock();
        *next += 1;
        let handle = *next;
        self.state.targets.lock().insert(handle, profile);
        Ok(handle)
    }

    fn destroy_target(&mut self, handle: u64) -> Result<()> {
        self.state
            .targets
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no such target: {handle}"))
    }

    fn submit(&mut self, handle: u64, report: &WireReport) -> Result<()> {
        if self.state.fail_submit.load(Ordering::SeqCst) {
            return Err(anyhow!("submit failed"));
        }
        if !self.state.targets.lock().contains_key(&handle) {
            return Err(anyhow!("no such target: {handle}"));
        }
        self.state.submits.lock().push((handle, *report));
        Ok(())
    }

    fn register_rumble(&mut self, handle: u64, callback: RumbleCallback) -> Result<()> {
        self.state.rumble.lock().insert(handle, callback);
        Ok(())
    }

    fn unregister_rumble(&mut self, handle: u64) {
        self.state.rumble.lock().remove(&handle);
    }
}
