//! Fixed-rate routing loop.
//!
//! Wires the pipeline together once per tick: capture polls, the device
//! manager reconciles lifecycles, the translation layer produces encoded
//! reports, the emulator submits them. Rumble notifications fan back from
//! the emulator to the capture layer asynchronously.
//!
//! The tick period is padded with a sleep; an overrun simply shortens the
//! next sleep, with no further jitter compensation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::capture::snapshot::PhysicalSnapshot;
use crate::capture::InputCapture;
use crate::controls::SharedControls;
use crate::emulator::VirtualPadEmulator;
use crate::manager::{DeviceManager, ReconcileFlags};
use crate::timing::{Clock, Ticks};
use crate::translate::canonical::TranslatedReport;
use crate::translate::TranslationLayer;

/// Device re-enumeration cadence while no pad is connected.
const SCAN_INTERVAL_IDLE: Duration = Duration::from_secs(5);
/// Cadence once at least one pad is connected.
const SCAN_INTERVAL_ACTIVE: Duration = Duration::from_secs(30);

/// The orchestrating loop and everything it drives.
pub struct Router {
    clock: Clock,
    capture: Arc<InputCapture>,
    emulator: Arc<VirtualPadEmulator>,
    manager: DeviceManager,
    translation: TranslationLayer,
    controls: Arc<SharedControls>,
    /// Reused every tick so steady-state routing does not allocate.
    translated: Vec<TranslatedReport>,
    last_refresh: Ticks,
    tick_period: Duration,
}

impl Router {
    pub fn new(
        clock: Clock,
        capture: Arc<InputCapture>,
        emulator: Arc<VirtualPadEmulator>,
        manager: DeviceManager,
        translation: TranslationLayer,
        controls: Arc<SharedControls>,
        polling_frequency_hz: u32,
    ) -> Self {
        // Rumble fan-back: bus notifications land on the physical pad.
        {
            let capture = capture.clone();
            emulator.set_rumble_callback(Arc::new(move |user, left, right| {
                capture.set_vibration(user, left, right);
            }));
        }

        Self {
            clock,
            capture,
            emulator,
            manager,
            translation,
            controls,
            translated: Vec::new(),
            last_refresh: 0,
            tick_period: Duration::from_secs_f64(1.0 / polling_frequency_hz.max(1) as f64),
        }
    }

    /// Run until the stop flag is raised, then release every resource.
    pub fn run(&mut self) {
        info!(
            "Routing loop started at {:.0} Hz",
            1.0 / self.tick_period.as_secs_f64()
        );
        self.capture.refresh_devices();
        self.last_refresh = self.clock.now();

        while !self.controls.stop_requested() {
            let tick_start = self.clock.now();
            self.tick(tick_start);

            let elapsed = self.clock.now().saturating_sub(tick_start);
            self.controls.record_tick(Clock::ticks_to_us(elapsed) as u64);

            let elapsed = Duration::from_nanos(elapsed);
            if elapsed < self.tick_period {
                std::thread::sleep(self.tick_period - elapsed);
            }
        }

        info!("Stop requested, shutting down");
        self.shutdown();
    }

    /// One pass of the pipeline.
    fn tick(&mut self, now: Ticks) {
        self.capture.update();
        let snapshot = self.capture.get();

        self.translation
            .set_config(self.controls.translation_config());
        self.emulator
            .set_rumble_enabled(self.controls.rumble_enabled());
        self.emulator
            .set_rumble_intensity(self.controls.rumble_intensity());

        let flags = ReconcileFlags {
            translation_enabled: self.controls.translation_enabled(),
            hidhide_enabled: self.controls.hidhide_enabled(),
            xinput_to_dinput: self.controls.xinput_to_dinput(),
            dinput_to_xinput: self.controls.dinput_to_xinput(),
        };
        self.manager.process(&snapshot, flags);

        if flags.translation_enabled {
            self.translation
                .translate(&snapshot, now, &mut self.translated);
            self.emulator.send(&self.translated);
        }

        self.maybe_refresh(&snapshot, now);
    }

    /// Manual refresh requests win; otherwise re-enumerate on an adaptive
    /// interval (fast while the slot table is empty, slow once pads are
    /// live).
    fn maybe_refresh(&mut self, snapshot: &[PhysicalSnapshot], now: Ticks) {
        if self.controls.take_refresh_request() {
            info!("Manual device refresh triggered");
            self.capture.refresh_devices();
            self.last_refresh = now;
            return;
        }

        let connected = snapshot.iter().filter(|s| s.connected).count();
        let interval = if connected == 0 {
            SCAN_INTERVAL_IDLE
        } else {
            SCAN_INTERVAL_ACTIVE
        };
        if now.saturating_sub(self.last_refresh) > interval.as_nanos() as Ticks {
            debug!("Periodic device refresh ({connected} connected)");
            self.capture.refresh_devices();
            self.last_refresh = now;
        }
    }

    /// Release everything. Called on every exit path; each step is
    /// idempotent.
    fn shutdown(&mut self) {
        self.manager.cleanup();
        self.emulator.shutdown();
        self.capture.shutdown();
        info!(
            "Routing loop stopped after {} ticks (mean {:.1} µs/tick)",
            self.controls.tick_count(),
            self.controls.mean_tick_us()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::backend::XInputPoll;
    use crate::capture::mock::{MockDeviceSpec, MockHidStack, MockXInputStack};
    use crate::config::AppConfig;
    use crate::emulator::bus::MockBus;
    use crate::hidhide::{HidHideClient, IoctlVariant};
    use crate::translate::canonical::TargetProfile;

    struct NoopTransport;

    impl crate::hidhide::IoctlTransport for NoopTransport {
        fn ioctl(&mut self, _code: u32, _input: &[u8], _cap: usize) -> Result<Vec<u8>, u32> {
            Err(1)
        }
    }

    struct Harness {
        router: Router,
        bus: MockBus,
        xinput: Arc<MockXInputStack>,
        controls: Arc<SharedControls>,
        emulator: Arc<VirtualPadEmulator>,
    }

    fn harness() -> Harness {
        let clock = Clock::new();
        let xinput = Arc::new(MockXInputStack::new());
        let mut hid = MockHidStack::new();
        hid.add_device(
            "HID\\VID_045E&PID_028E&IG_00\\1",
            "\\\\?\\hid#ig00",
            MockDeviceSpec {
                product_name: Some("Xbox 360 Pad".to_string()),
                gamepad: true,
                ..Default::default()
            },
        );
        let capture = Arc::new(InputCapture::new(
            clock,
            Box::new(xinput.clone()),
            Box::new(hid),
        ));

        let bus = MockBus::new();
        let emulator = Arc::new(VirtualPadEmulator::new(clock));
        assert!(emulator.initialize_with(Box::new(bus.clone())));

        let filter = HidHideClient::with_transport(IoctlVariant::V2, Box::new(NoopTransport));
        let manager = DeviceManager::new(emulator.clone(), filter);

        let controls = Arc::new(SharedControls::from_config(&AppConfig::default()));
        let translation = TranslationLayer::new(controls.translation_config());

        let router = Router::new(
            clock,
            capture,
            emulator.clone(),
            manager,
            translation,
            controls.clone(),
            1000,
        );
        Harness {
            router,
            bus,
            xinput,
            controls,
            emulator,
        }
    }

    #[test]
    fn test_tick_bridges_connected_pad_end_to_end() {
        let mut h = harness();
        h.xinput.set_slot(
            0,
            Some(XInputPoll {
                packet_number: 1,
                buttons: 0x1000,
                thumb_lx: 32767,
                ..Default::default()
            }),
        );

        h.router.capture.refresh_devices();
        let now = h.router.clock.now();
        h.router.tick(now);

        // The pad got a DS4-style twin and its report was submitted.
        let targets = h.emulator.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].profile, TargetProfile::Ds4Style);
        assert_eq!(h.bus.submits().len(), 1);

        // Second tick: same target, another submit.
        h.router.tick(h.router.clock.now());
        assert_eq!(h.emulator.target_count(), 1);
        assert_eq!(h.bus.submits().len(), 2);
        h.emulator.shutdown();
    }

    #[test]
    fn test_translation_disabled_skips_submission() {
        let mut h = harness();
        h.xinput.set_slot(
            0,
            Some(XInputPoll {
                packet_number: 1,
                ..Default::default()
            }),
        );
        h.controls.set_translation_enabled(false);

        h.router.capture.refresh_devices();
        h.router.tick(h.router.clock.now());

        assert_eq!(h.emulator.target_count(), 0);
        assert!(h.bus.submits().is_empty());
        h.emulator.shutdown();
    }

    #[test]
    fn test_manual_refresh_request_is_consumed() {
        let mut h = harness();
        h.controls.request_refresh();
        h.router.tick(h.router.clock.now());
        // Consumed by the tick; not pending any more.
        assert!(!h.controls.take_refresh_request());
        h.emulator.shutdown();
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut h = harness();
        h.xinput.set_slot(
            0,
            Some(XInputPoll {
                packet_number: 1,
                ..Default::default()
            }),
        );
        h.router.capture.refresh_devices();
        h.router.tick(h.router.clock.now());
        assert_eq!(h.emulator.target_count(), 1);

        h.router.shutdown();
        assert_eq!(h.emulator.target_count(), 0);
        assert!(h.bus.live_targets().is_empty());
    }

    #[test]
    fn test_run_stops_on_stop_flag() {
        let mut h = harness();
        h.controls.request_stop();
        // Returns promptly because the flag is observed at the tick top.
        h.router.run();
        assert_eq!(h.emulator.target_count(), 0);
    }
}
