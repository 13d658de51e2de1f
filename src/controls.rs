//! Shared runtime control surface.
//!
//! The dashboard thread writes toggles here and the router reads them at
//! the top of each tick; everything is atomic, so neither side ever blocks
//! the other. Also carries the edge-triggered device-refresh request, the
//! stop flag and the loop's performance counters.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::config::AppConfig;
use crate::translate::deadzone::DeadzoneConfig;
use crate::translate::socd::SocdMethod;
use crate::translate::TranslationConfig;

/// Atomic f32 stored as its bit pattern.
fn load_f32(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

fn store_f32(cell: &AtomicU32, value: f32) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

/// Control state shared between the router and the dashboard.
#[derive(Debug)]
pub struct SharedControls {
    translation_enabled: AtomicBool,
    hidhide_enabled: AtomicBool,
    xinput_to_dinput: AtomicBool,
    dinput_to_xinput: AtomicBool,

    socd_enabled: AtomicBool,
    socd_method: AtomicU8,
    debounce_enabled: AtomicBool,
    debounce_interval_ms: AtomicU32,

    deadzone_enabled: AtomicBool,
    left_deadzone: AtomicU32,
    right_deadzone: AtomicU32,
    left_anti_deadzone: AtomicU32,
    right_anti_deadzone: AtomicU32,

    rumble_enabled: AtomicBool,
    rumble_intensity: AtomicU32,

    refresh_requested: AtomicBool,
    stop_requested: AtomicBool,

    tick_count: AtomicU64,
    total_tick_us: AtomicU64,
}

impl SharedControls {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            translation_enabled: AtomicBool::new(config.translation_enabled),
            hidhide_enabled: AtomicBool::new(config.hidhide_enabled),
            xinput_to_dinput: AtomicBool::new(config.xinput_to_dinput),
            dinput_to_xinput: AtomicBool::new(config.dinput_to_xinput),
            socd_enabled: AtomicBool::new(config.socd_enabled),
            socd_method: AtomicU8::new(config.socd_method),
            debounce_enabled: AtomicBool::new(config.debouncing_enabled),
            debounce_interval_ms: AtomicU32::new(config.debounce_interval_ms),
            deadzone_enabled: AtomicBool::new(config.stick_deadzone_enabled),
            left_deadzone: AtomicU32::new(config.left_stick_deadzone.to_bits()),
            right_deadzone: AtomicU32::new(config.right_stick_deadzone.to_bits()),
            left_anti_deadzone: AtomicU32::new(config.left_stick_anti_deadzone.to_bits()),
            right_anti_deadzone: AtomicU32::new(config.right_stick_anti_deadzone.to_bits()),
            rumble_enabled: AtomicBool::new(config.rumble_enabled),
            rumble_intensity: AtomicU32::new(config.rumble_intensity.to_bits()),
            refresh_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            total_tick_us: AtomicU64::new(0),
        }
    }

    pub fn translation_enabled(&self) -> bool {
        self.translation_enabled.load(Ordering::Relaxed)
    }

    pub fn set_translation_enabled(&self, enabled: bool) {
        self.translation_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn hidhide_enabled(&self) -> bool {
        self.hidhide_enabled.load(Ordering::Relaxed)
    }

    pub fn set_hidhide_enabled(&self, enabled: bool) {
        self.hidhide_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn xinput_to_dinput(&self) -> bool {
        self.xinput_to_dinput.load(Ordering::Relaxed)
    }

    pub fn set_xinput_to_dinput(&self, enabled: bool) {
        self.xinput_to_dinput.store(enabled, Ordering::Relaxed);
    }

    pub fn dinput_to_xinput(&self) -> bool {
        self.dinput_to_xinput.load(Ordering::Relaxed)
    }

    pub fn set_dinput_to_xinput(&self, enabled: bool) {
        self.dinput_to_xinput.store(enabled, Ordering::Relaxed);
    }

    pub fn set_socd_enabled(&self, enabled: bool) {
        self.socd_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_socd_method(&self, method: SocdMethod) {
        self.socd_method.store(method.index(), Ordering::Relaxed);
    }

    pub fn set_debounce_enabled(&self, enabled: bool) {
        self.debounce_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_debounce_interval_ms(&self, interval: u32) {
        self.debounce_interval_ms.store(interval, Ordering::Relaxed);
    }

    pub fn set_deadzone_enabled(&self, enabled: bool) {
        self.deadzone_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_deadzones(&self, left: f32, right: f32) {
        store_f32(&self.left_deadzone, left.clamp(0.0, 1.0));
        store_f32(&self.right_deadzone, right.clamp(0.0, 1.0));
    }

    pub fn set_anti_deadzones(&self, left: f32, right: f32) {
        store_f32(&self.left_anti_deadzone, left.clamp(0.0, 1.0));
        store_f32(&self.right_anti_deadzone, right.clamp(0.0, 1.0));
    }

    pub fn rumble_enabled(&self) -> bool {
        self.rumble_enabled.load(Ordering::Relaxed)
    }

    pub fn set_rumble_enabled(&self, enabled: bool) {
        self.rumble_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn rumble_intensity(&self) -> f32 {
        load_f32(&self.rumble_intensity)
    }

    pub fn set_rumble_intensity(&self, intensity: f32) {
        store_f32(&self.rumble_intensity, intensity.clamp(0.0, 1.0));
    }

    /// Ask the router to re-enumerate devices on its next tick.
    pub fn request_refresh(&self) {
        self.refresh_requested.store(true, Ordering::Relaxed);
    }

    /// Edge-triggered: true at most once per request.
    pub fn take_refresh_request(&self) -> bool {
        self.refresh_requested.swap(false, Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Relaxed)
    }

    /// Record one completed tick and its duration.
    pub fn record_tick(&self, tick_us: u64) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.total_tick_us.fetch_add(tick_us, Ordering::Relaxed);
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub fn mean_tick_us(&self) -> f64 {
        let ticks = self.tick_count.load(Ordering::Relaxed);
        if ticks == 0 {
            return 0.0;
        }
        self.total_tick_us.load(Ordering::Relaxed) as f64 / ticks as f64
    }

    /// Snapshot of the translation pipeline settings.
    pub fn translation_config(&self) -> TranslationConfig {
        TranslationConfig {
            xinput_to_dinput: self.xinput_to_dinput(),
            dinput_to_xinput: self.dinput_to_xinput(),
            socd_enabled: self.socd_enabled.load(Ordering::Relaxed),
            socd_method: SocdMethod::from_index(self.socd_method.load(Ordering::Relaxed)),
            debounce_enabled: self.debounce_enabled.load(Ordering::Relaxed),
            debounce_interval_ms: self.debounce_interval_ms.load(Ordering::Relaxed),
            deadzone: DeadzoneConfig {
                enabled: self.deadzone_enabled.load(Ordering::Relaxed),
                left_deadzone: load_f32(&self.left_deadzone),
                right_deadzone: load_f32(&self.right_deadzone),
                left_anti_deadzone: load_f32(&self.left_anti_deadzone),
                right_anti_deadzone: load_f32(&self.right_anti_deadzone),
            },
        }
    }

    /// Fold the runtime state back into a config for the shutdown save.
    pub fn write_back(&self, config: &mut AppConfig) {
        config.translation_enabled = self.translation_enabled();
        config.hidhide_enabled = self.hidhide_enabled();
        config.xinput_to_dinput = self.xinput_to_dinput();
        config.dinput_to_xinput = self.dinput_to_xinput();
        config.socd_enabled = self.socd_enabled.load(Ordering::Relaxed);
        config.socd_method = self.socd_method.load(Ordering::Relaxed);
        config.debouncing_enabled = self.debounce_enabled.load(Ordering::Relaxed);
        config.debounce_interval_ms = self.debounce_interval_ms.load(Ordering::Relaxed);
        config.stick_deadzone_enabled = self.deadzone_enabled.load(Ordering::Relaxed);
        config.left_stick_deadzone = load_f32(&self.left_deadzone);
        config.right_stick_deadzone = load_f32(&self.right_deadzone);
        config.left_stick_anti_deadzone = load_f32(&self.left_anti_deadzone);
        config.right_stick_anti_deadzone = load_f32(&self.right_anti_deadzone);
        config.rumble_enabled = self.rumble_enabled();
        config.rumble_intensity = self.rumble_intensity();
    }
}
