//! Configuration load/save.
//!
//! A flat key-value YAML file read once at startup and written once at
//! shutdown. Every key has a default, so a missing file or a partial one is
//! fine; unknown keys are ignored.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::translate::deadzone::DeadzoneConfig;
use crate::translate::socd::SocdMethod;
use crate::translate::TranslationConfig;

fn default_true() -> bool {
    true
}

fn default_polling_frequency() -> u32 {
    1000
}

fn default_socd_method() -> u8 {
    SocdMethod::Neutral.index()
}

fn default_debounce_interval() -> u32 {
    10
}

fn default_deadzone() -> f32 {
    0.15
}

fn default_rumble_intensity() -> f32 {
    1.0
}

fn default_ioctl_variant() -> String {
    "v2".to_string()
}

/// Root configuration. Field names are the on-disk keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Main loop rate in Hz.
    #[serde(default = "default_polling_frequency")]
    pub polling_frequency: u32,

    #[serde(default = "default_true")]
    pub translation_enabled: bool,
    #[serde(default = "default_true")]
    pub hidhide_enabled: bool,

    /// Create DS4-style targets for XInput pads.
    #[serde(default = "default_true")]
    pub xinput_to_dinput: bool,
    /// Create Xbox-style targets for HID pads.
    #[serde(default = "default_true")]
    pub dinput_to_xinput: bool,

    #[serde(default = "default_true")]
    pub socd_enabled: bool,
    /// 0 = last win, 1 = first win, 2 = neutral.
    #[serde(default = "default_socd_method")]
    pub socd_method: u8,

    #[serde(default)]
    pub debouncing_enabled: bool,
    #[serde(default = "default_debounce_interval")]
    pub debounce_interval_ms: u32,

    #[serde(default = "default_true")]
    pub stick_deadzone_enabled: bool,
    #[serde(default = "default_deadzone")]
    pub left_stick_deadzone: f32,
    #[serde(default = "default_deadzone")]
    pub right_stick_deadzone: f32,
    #[serde(default)]
    pub left_stick_anti_deadzone: f32,
    #[serde(default)]
    pub right_stick_anti_deadzone: f32,

    #[serde(default = "default_true")]
    pub rumble_enabled: bool,
    #[serde(default = "default_rumble_intensity")]
    pub rumble_intensity: f32,

    #[serde(default = "default_true")]
    pub save_logs_on_exit: bool,

    /// Filter-driver IOCTL code set: "v2" or "v1".
    #[serde(default = "default_ioctl_variant")]
    pub hidhide_ioctl_variant: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        // serde's per-field defaults are the single source of truth.
        serde_yaml::from_str("{}").expect("empty config must deserialize")
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults; a present but
    /// malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found, using defaults: {}", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.sanitize();
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Write back to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("failed to serialize configuration")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Pull out-of-range values back into their domains.
    pub fn sanitize(&mut self) {
        self.polling_frequency = self.polling_frequency.max(1);
        self.left_stick_deadzone = self.left_stick_deadzone.clamp(0.0, 1.0);
        self.right_stick_deadzone = self.right_stick_deadzone.clamp(0.0, 1.0);
        self.left_stick_anti_deadzone = self.left_stick_anti_deadzone.clamp(0.0, 1.0);
        self.right_stick_anti_deadzone = self.right_stick_anti_deadzone.clamp(0.0, 1.0);
        self.rumble_intensity = self.rumble_intensity.clamp(0.0, 1.0);
    }

    /// Translation pipeline settings derived from this config.
    pub fn translation_config(&self) -> TranslationConfig {
        TranslationConfig {
            xinput_to_dinput: self.xinput_to_dinput,
            dinput_to_xinput: self.dinput_to_xinput,
            socd_enabled: self.socd_enabled,
            socd_method: SocdMethod::from_index(self.socd_method),
            debounce_enabled: self.debouncing_enabled,
            debounce_interval_ms: self.debounce_interval_ms,
            deadzone: DeadzoneConfig {
                enabled: self.stick_deadzone_enabled,
                left_deadzone: self.left_stick_deadzone,
                right_deadzone: self.right_stick_deadzone,
                left_anti_deadzone: self.left_stick_anti_deadzone,
                right_anti_deadzone: self.right_stick_anti_deadzone,
            },
        }
    }
}
