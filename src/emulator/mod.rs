//! Virtual gamepad emulator.
//!
//! Owns every virtual target handle in the process: creates and destroys
//! targets through the bus driver, submits encoded reports, and routes
//! inbound rumble notifications back to a user-supplied callback.
//!
//! Without a bus connection (driver not installed, or a non-Windows host)
//! the emulator stays uninitialized and every operation reports failure
//! without panicking; the router then runs in input test mode.

pub mod bus;

#[cfg(windows)]
pub mod vigem;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::timing::{Clock, Ticks};
use crate::translate::canonical::{TargetProfile, TranslatedReport};
use crate::translate::encode;
use bus::{RumbleCallback, VirtualBus, WireReport};

/// Rumble fan-back: (linked_user, left, right), motors in [0, 1].
pub type RumbleSink = Arc<dyn Fn(i32, f32, f32) + Send + Sync>;

/// Target connect/disconnect notification: (virtual id, connected).
pub type DeviceCallback = Arc<dyn Fn(u32, bool) + Send + Sync>;

/// One live virtual target record.
#[derive(Debug, Clone)]
pub struct VirtualTarget {
    /// Unique within this session, never reused while the target lives.
    pub id: u32,
    pub profile: TargetProfile,
    /// `slot_id` of the physical pad this target represents.
    pub linked_user: i32,
    /// Human-readable source label captured at creation.
    pub source_name: String,
    /// Cleared on submit failure until proven otherwise.
    pub connected: bool,
    /// Timestamp of the last successful submit.
    pub last_update: Ticks,
    handle: u64,
}

struct Shared {
    bus: Mutex<Option<Box<dyn VirtualBus>>>,
    devices: Mutex<Vec<VirtualTarget>>,
    queue: Mutex<Vec<TranslatedReport>>,
    running: AtomicBool,
    last_error: Mutex<String>,
    clock: Clock,
}

impl Shared {
    fn record_error(&self, message: String) {
        debug!("{message}");
        *self.last_error.lock() = message;
    }

    /// Submit one report to the live target matching its (linked_user,
    /// profile). Failure clears the target's connected flag; the entry is
    /// not retried here.
    fn submit_one(&self, report: &TranslatedReport) {
        let wire = match report.profile {
            TargetProfile::XboxStyle => WireReport::Xbox(encode::encode_xbox(&report.gamepad)),
            TargetProfile::Ds4Style => WireReport::Ds4(encode::encode_ds4(&report.gamepad)),
        };

        let failure = {
            let mut devices = self.devices.lock();
            let Some(target) = devices.iter_mut().find(|t| {
                t.connected && t.linked_user == report.source_slot && t.profile == report.profile
            }) else {
                return;
            };

            let result = {
                let mut bus = self.bus.lock();
                match bus.as_mut() {
                    Some(bus) => bus.submit(target.handle, &wire),
                    None => return,
                }
            };
            match result {
                Ok(()) => {
                    target.last_update = self.clock.now();
                    None
                }
                Err(e) => {
                    target.connected = false;
                    Some(e)
                }
            }
        };
        if let Some(e) = failure {
            self.record_error(format!("Submit failed: {e}"));
        }
    }
}

/// The emulator facade. See module docs for the failure model.
pub struct VirtualPadEmulator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU32,
    initialized: AtomicBool,
    rumble_enabled: Arc<AtomicBool>,
    /// f32 bits; atomics keep the rumble callback lock-free.
    rumble_intensity: Arc<AtomicU32>,
    rumble_sink: Arc<Mutex<Option<RumbleSink>>>,
    device_callback: Mutex<Option<DeviceCallback>>,
}

impl VirtualPadEmulator {
    pub fn new(clock: Clock) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus: Mutex::new(None),
                devices: Mutex::new(Vec::new()),
                queue: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                last_error: Mutex::new(String::new()),
                clock,
            }),
            worker: Mutex::new(None),
            next_id: AtomicU32::new(0),
            initialized: AtomicBool::new(false),
            rumble_enabled: Arc::new(AtomicBool::new(true)),
            rumble_intensity: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            rumble_sink: Arc::new(Mutex::new(None)),
            device_callback: Mutex::new(None),
        }
    }

    /// Connect to the platform virtual-bus driver and start the submit
    /// worker. Returns false (leaving the emulator uninitialized) when the
    /// driver is unavailable.
    pub fn initialize(&self) -> bool {
        #[cfg(windows)]
        {
            match vigem::VigemBus::connect() {
                Ok(bus) => self.initialize_with(Box::new(bus)),
                Err(e) => {
                    self.shared
                        .record_error(format!("Virtual bus unavailable: {e}"));
                    false
                }
            }
        }
        #[cfg(not(windows))]
        {
            self.shared
                .record_error("Virtual bus unavailable on this platform".to_string());
            false
        }
    }

    /// Connect over an explicit bus client. Does not create any targets.
    pub fn initialize_with(&self, bus: Box<dyn VirtualBus>) -> bool {
        if self.initialized.load(Ordering::SeqCst) {
            return true;
        }
        *self.shared.bus.lock() = Some(bus);
        self.shared.running.store(true, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("padbridge-submit".into())
            .spawn(move || submit_worker(shared))
            .expect("failed to spawn submit worker");
        *self.worker.lock() = Some(handle);

        info!("Virtual bus connected");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Most recent failure reason, empty if none.
    pub fn last_error(&self) -> String {
        self.shared.last_error.lock().clone()
    }

    /// Create a target and return its id. Fails when uninitialized, when a
    /// target for this (linked_user, profile) already exists, or when the
    /// bus refuses.
    pub fn create_target(
        &self,
        profile: TargetProfile,
        linked_user: i32,
        source_name: &str,
    ) -> Option<u32> {
        if !self.is_initialized() {
            return None;
        }

        {
            let devices = self.shared.devices.lock();
            if devices
                .iter()
                .any(|t| t.linked_user == linked_user && t.profile == profile)
            {
                self.shared.record_error(format!(
                    "Target already exists for user {linked_user} ({profile:?})"
                ));
                return None;
            }
        }

        let created = {
            let mut bus = self.shared.bus.lock();
            bus.as_mut().map(|bus| bus.create_target(profile))
        };
        let handle = match created {
            Some(Ok(handle)) => handle,
            Some(Err(e)) => {
                self.shared
                    .record_error(format!("Target creation failed: {e}"));
                return None;
            }
            None => return None,
        };

        // Rumble flows only through Xbox-style targets here.
        if profile == TargetProfile::XboxStyle {
            let callback = self.make_rumble_callback(linked_user);
            let mut bus = self.shared.bus.lock();
            if let Some(bus) = bus.as_mut() {
                if let Err(e) = bus.register_rumble(handle, callback) {
                    warn!("Rumble registration failed for user {linked_user}: {e}");
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let target = VirtualTarget {
            id,
            profile,
            linked_user,
            source_name: source_name.to_string(),
            connected: true,
            last_update: 0,
            handle,
        };
        // Publish only after the handle is fully acquired.
        self.shared.devices.lock().push(target);

        info!("Created virtual target {id} ({profile:?}) for user {linked_user}: {source_name}");
        self.fire_device_callback(id, true);
        Some(id)
    }

    /// Destroy a target by id. True when a record was removed.
    pub fn destroy_target(&self, id: u32) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let removed = {
            let mut devices = self.shared.devices.lock();
            let index = devices.iter().position(|t| t.id == id);
            index.map(|i| devices.remove(i))
        };
        let Some(target) = removed else {
            return false;
        };

        let failure = {
            let mut bus = self.shared.bus.lock();
            match bus.as_mut() {
                Some(bus) => {
                    bus.unregister_rumble(target.handle);
                    bus.destroy_target(target.handle).err()
                }
                None => None,
            }
        };
        if let Some(e) = failure {
            self.shared
                .record_error(format!("Target destruction failed: {e}"));
        }

        info!(
            "Destroyed virtual target {id} ({:?}) for user {}",
            target.profile, target.linked_user
        );
        self.fire_device_callback(id, false);
        true
    }

    /// Immediate submit path: one synchronous submission per entry.
    pub fn send(&self, reports: &[TranslatedReport]) -> bool {
        if !self.is_initialized() {
            return false;
        }
        for report in reports {
            self.shared.submit_one(report);
        }
        true
    }

    /// Optional queueing path; entries are drained by the submit worker.
    pub fn enqueue(&self, reports: &[TranslatedReport]) -> bool {
        if !self.is_initialized() {
            return false;
        }
        self.shared.queue.lock().extend_from_slice(reports);
        true
    }

    /// Copy of the current target list, for the dashboard.
    pub fn targets(&self) -> Vec<VirtualTarget> {
        self.shared.devices.lock().clone()
    }

    pub fn target_count(&self) -> usize {
        self.shared.devices.lock().len()
    }

    pub fn set_rumble_callback(&self, sink: RumbleSink) {
        *self.rumble_sink.lock() = Some(sink);
    }

    pub fn set_device_callback(&self, callback: DeviceCallback) {
        *self.device_callback.lock() = Some(callback);
    }

    pub fn set_rumble_enabled(&self, enabled: bool) {
        self.rumble_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_rumble_intensity(&self, intensity: f32) {
        self.rumble_intensity
            .store(intensity.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    /// Stop the worker, destroy every target, disconnect the bus. Idempotent.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }

        let targets: Vec<VirtualTarget> = std::mem::take(&mut *self.shared.devices.lock());
        {
            let mut bus = self.shared.bus.lock();
            if let Some(bus) = bus.as_mut() {
                for target in &targets {
                    bus.unregister_rumble(target.handle);
                    if let Err(e) = bus.destroy_target(target.handle) {
                        debug!("Target {} teardown: {e}", target.id);
                    }
                }
            }
            *bus = None;
        }
        for target in &targets {
            self.fire_device_callback(target.id, false);
        }
        info!("Virtual bus disconnected ({} targets freed)", targets.len());
    }

    fn fire_device_callback(&self, id: u32, connected: bool) {
        let callback = self.device_callback.lock().clone();
        if let Some(callback) = callback {
            callback(id, connected);
        }
    }

    fn make_rumble_callback(&self, linked_user: i32) -> RumbleCallback {
        let sink = self.rumble_sink.clone();
        let enabled = self.rumble_enabled.clone();
        let intensity = self.rumble_intensity.clone();
        Arc::new(move |large, small| {
            if !enabled.load(Ordering::SeqCst) {
                return;
            }
            let scale = f32::from_bits(intensity.load(Ordering::SeqCst));
            let left = (large as f32 / 255.0) * scale;
            let right = (small as f32 / 255.0) * scale;
            let sink = sink.lock().clone();
            if let Some(sink) = sink {
                sink(linked_user, left, right);
            }
        })
    }
}

impl Drop for VirtualPadEmulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Background drain of the optional retry queue.
fn submit_worker(shared: Arc<Shared>) {
    #[cfg(windows)]
    raise_thread_priority();

    let mut batch: Vec<TranslatedReport> = Vec::new();
    while shared.running.load(Ordering::SeqCst) {
        {
            let mut queue = shared.queue.lock();
            if !queue.is_empty() {
                std::mem::swap(&mut batch, &mut *queue);
            }
        }
        for report in batch.drain(..) {
            shared.submit_one(&report);
        }
        std::thread::sleep(Duration::from_micros(100));
    }
}

#[cfg(windows)]
fn raise_thread_priority() {
    use windows_sys::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_HIGHEST,
    };
    unsafe {
        SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_HIGHEST);
    }
}
