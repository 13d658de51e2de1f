//! Snapshot-to-target translation pipeline.
//!
//! Turns a vector of [`PhysicalSnapshot`] into canonical, cleaned,
//! target-routed reports: source classification, profile or caps-driven
//! normalization, SOCD resolution, debouncing and the radial deadzone, in
//! that order. Output goes into a caller-owned buffer that the router
//! reuses every tick.

pub mod canonical;
pub mod deadzone;
pub mod debounce;
pub mod encode;
pub mod profiles;
pub mod socd;

use crate::capture::snapshot::PhysicalSnapshot;
use crate::timing::Ticks;

use canonical::{buttons, long_to_short, CanonicalGamepad, TargetProfile, TranslatedReport};
use deadzone::DeadzoneConfig;
use debounce::DebounceLedger;
use profiles::{AxisHandler, ProfileTable};
use socd::SocdMethod;

/// Runtime pipeline settings, written by the dashboard between ticks.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Create DS4-style targets for XInput sources.
    pub xinput_to_dinput: bool,
    /// Create Xbox-style targets for HID sources.
    pub dinput_to_xinput: bool,
    pub socd_enabled: bool,
    pub socd_method: SocdMethod,
    pub debounce_enabled: bool,
    pub debounce_interval_ms: u32,
    pub deadzone: DeadzoneConfig,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            xinput_to_dinput: true,
            dinput_to_xinput: true,
            socd_enabled: true,
            socd_method: SocdMethod::Neutral,
            debounce_enabled: false,
            debounce_interval_ms: 10,
            deadzone: DeadzoneConfig::default(),
        }
    }
}

/// The translation layer. Owns the profile table and the debounce ledger;
/// holds no OS resources.
pub struct TranslationLayer {
    config: TranslationConfig,
    profiles: ProfileTable,
    debounce: DebounceLedger,
}

impl TranslationLayer {
    pub fn new(config: TranslationConfig) -> Self {
        Self {
            config,
            profiles: ProfileTable::builtin(),
            debounce: DebounceLedger::new(),
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TranslationConfig) {
        self.config = config;
    }

    /// Run the full pipeline over one snapshot vector.
    ///
    /// `out` is cleared and refilled; the router passes the same buffer
    /// every tick so steady-state operation does not allocate.
    pub fn translate(
        &mut self,
        snapshots: &[PhysicalSnapshot],
        now: Ticks,
        out: &mut Vec<TranslatedReport>,
    ) {
        out.clear();

        for snap in snapshots {
            let (mut pad, xinput_source) =
                if snap.raw_xinput.packet_number > 0 || snap.slot_id >= 0 {
                    (convert_xinput(snap), true)
                } else if !snap.device_path.is_empty() {
                    (self.convert_hid(snap), false)
                } else {
                    continue;
                };

            if self.config.socd_enabled {
                pad.buttons = socd::resolve(pad.buttons, self.config.socd_method);
            }

            if self.config.debounce_enabled {
                pad.buttons = self.debounce.apply(
                    snap.slot_id,
                    now,
                    self.config.debounce_interval_ms,
                    pad.buttons,
                );
            }

            if self.config.deadzone.enabled {
                let dz = &self.config.deadzone;
                (pad.lx, pad.ly) =
                    deadzone::apply_radial(pad.lx, pad.ly, dz.left_deadzone, dz.left_anti_deadzone);
                (pad.rx, pad.ry) = deadzone::apply_radial(
                    pad.rx,
                    pad.ry,
                    dz.right_deadzone,
                    dz.right_anti_deadzone,
                );
            }

            let profile = if xinput_source {
                if self.config.xinput_to_dinput {
                    TargetProfile::Ds4Style
                } else {
                    TargetProfile::XboxStyle
                }
            } else if self.config.dinput_to_xinput {
                TargetProfile::XboxStyle
            } else {
                TargetProfile::Ds4Style
            };

            out.push(TranslatedReport {
                source_slot: snap.slot_id,
                xinput_source,
                profile,
                gamepad: pad,
                timestamp: snap.timestamp,
            });
        }
    }

    fn convert_hid(&self, snap: &PhysicalSnapshot) -> CanonicalGamepad {
        let mut pad = CanonicalGamepad::default();

        let profile = snap
            .product_name
            .as_deref()
            .and_then(|name| self.profiles.get(name));

        if let Some(profile) = profile {
            for usage in &snap.raw_hid.active_buttons {
                if let Some(&bit) = profile.button_map.get(usage) {
                    pad.buttons |= bit;
                }
            }
            match profile.axis_handler {
                AxisHandler::CenteredByte => centered_byte_axes(snap, &mut pad),
                AxisHandler::Generic => generic_axes(snap, &mut pad),
            }
        } else {
            // Generic fallback: the first four button usages map onto the
            // face buttons, everything else is ignored.
            for usage in &snap.raw_hid.active_buttons {
                match usage {
                    1 => pad.buttons |= buttons::A,
                    2 => pad.buttons |= buttons::B,
                    3 => pad.buttons |= buttons::X,
                    4 => pad.buttons |= buttons::Y,
                    _ => {}
                }
            }
            generic_axes(snap, &mut pad);
        }

        pad
    }
}

/// XInput sources already use the canonical layout; copy fields across.
fn convert_xinput(snap: &PhysicalSnapshot) -> CanonicalGamepad {
    let raw = &snap.raw_xinput;
    CanonicalGamepad {
        buttons: raw.buttons,
        l_trigger: raw.left_trigger,
        r_trigger: raw.right_trigger,
        lx: raw.thumb_lx,
        ly: raw.thumb_ly,
        rx: raw.thumb_rx,
        ry: raw.thumb_ry,
    }
}

/// DualShock-class axes: 8 bits centered at 128, device Y grows downward.
fn centered_byte_axes(snap: &PhysicalSnapshot, pad: &mut CanonicalGamepad) {
    for (&usage, &value) in &snap.raw_hid.values {
        match usage {
            0x30 => pad.lx = long_to_short((value - 128) * 256),
            0x31 => pad.ly = long_to_short((128 - value) * 256),
            0x32 => pad.rx = long_to_short((value - 128) * 256),
            0x35 => pad.ry = long_to_short((128 - value) * 256),
            _ => {}
        }
    }
}

/// Generic axes: normalize each value against the logical range its device
/// declared in the report descriptor, never a hardcoded span.
fn generic_axes(snap: &PhysicalSnapshot, pad: &mut CanonicalGamepad) {
    for (&usage, &value) in &snap.raw_hid.values {
        let Some(range) = snap.raw_hid.ranges.get(&usage) else {
            continue;
        };
        let lo = range.logical_min as f64;
        let hi = range.logical_max as f64;
        let span = (hi - lo).max(1.0);
        let center = (hi + lo) / 2.0;

        match usage {
            // Stick axes; Y and Rz invert so canonical positive = up.
            0x30 => pad.lx = stick_value(value as f64, center, span, false),
            0x31 => pad.ly = stick_value(value as f64, center, span, true),
            0x32 => pad.rx = stick_value(value as f64, center, span, false),
            0x35 => pad.ry = stick_value(value as f64, center, span, true),
            // Trigger axes.
            0x33 => pad.l_trigger = trigger_value(value as f64, lo, span),
            0x34 => pad.r_trigger = trigger_value(value as f64, lo, span),
            _ => {}
        }
    }
}

fn stick_value(value: f64, center: f64, span: f64, invert: bool) -> i16 {
    let scaled = (value - center) / (span / 2.0) * 32767.0;
    let scaled = if invert { -scaled } else { scaled };
    long_to_short(scaled.round() as i32)
}

fn trigger_value(value: f64, lo: f64, span: f64) -> u8 {
    (((value - lo) / span * 255.0).round() as i64).clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::snapshot::{HidAxisRange, PhysicalSnapshot, RawXInputReport, HID_SLOT};

    fn xinput_snapshot(slot: i32, raw: RawXInputReport) -> PhysicalSnapshot {
        PhysicalSnapshot {
            slot_id: slot,
            connected: true,
            instance_id: format!("HID\\VID_045E&PID_028E&IG_0{slot}\\1"),
            raw_xinput: raw,
            ..Default::default()
        }
    }

    fn hid_snapshot(
        name: Option<&str>,
        active: &[u16],
        values: &[(u16, i32)],
        ranges: &[(u16, i32, i32)],
    ) -> PhysicalSnapshot {
        let mut snap = PhysicalSnapshot::hid_device(
            "HID\\VID_054C&PID_09CC\\1".into(),
            "\\\\?\\hid#pad".into(),
        );
        snap.product_name = name.map(str::to_string);
        snap.raw_hid.active_buttons = active.iter().copied().collect();
        snap.raw_hid.values = values.iter().copied().collect();
        snap.raw_hid.ranges = ranges
            .iter()
            .map(|&(usage, lo, hi)| {
                (
                    usage,
                    HidAxisRange {
                        logical_min: lo,
                        logical_max: hi,
                    },
                )
            })
            .collect();
        snap
    }

    fn passthrough_layer() -> TranslationLayer {
        TranslationLayer::new(TranslationConfig {
            socd_enabled: false,
            debounce_enabled: false,
            deadzone: DeadzoneConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_in_empty_out() {
        let mut layer = passthrough_layer();
        let mut out = Vec::new();
        layer.translate(&[], 0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_full_deflection_xinput_passthrough() {
        let mut layer = passthrough_layer();
        let snap = xinput_snapshot(
            0,
            RawXInputReport {
                packet_number: 42,
                buttons: buttons::A,
                left_trigger: 0,
                right_trigger: 255,
                thumb_lx: 32767,
                thumb_ly: -32768,
                ..Default::default()
            },
        );
        let mut out = Vec::new();
        layer.translate(&[snap], 0, &mut out);

        assert_eq!(out.len(), 1);
        assert!(out[0].xinput_source);
        let report = encode::encode_xbox(&out[0].gamepad);
        assert_eq!(report.buttons, buttons::A);
        assert_eq!(report.thumb_lx, 32767);
        assert_eq!(report.thumb_ly, -32768);
        assert_eq!(report.left_trigger, 0);
        assert_eq!(report.right_trigger, 255);
    }

    #[test]
    fn test_ds4_profile_axis_normalization() {
        let mut layer = passthrough_layer();
        let snap = hid_snapshot(
            Some("Wireless Controller"),
            &[2], // Cross
            &[(0x30, 0), (0x31, 255)],
            &[],
        );
        let mut out = Vec::new();
        layer.translate(&[snap], 0, &mut out);

        assert_eq!(out.len(), 1);
        let pad = out[0].gamepad;
        assert_eq!(pad.buttons, buttons::A);
        assert_eq!(pad.lx, -32768);
        // Device 255 = down, so canonical Y goes strongly negative.
        assert!(pad.ly < -30_000);
    }

    #[test]
    fn test_generic_axes_use_declared_range() {
        let mut layer = passthrough_layer();
        let ranges = &[(0x30u16, 0i32, 1023i32)];

        let mut out = Vec::new();
        layer.translate(&[hid_snapshot(None, &[], &[(0x30, 512)], ranges)], 0, &mut out);
        assert!(out[0].gamepad.lx.abs() < 500, "center: {}", out[0].gamepad.lx);

        layer.translate(&[hid_snapshot(None, &[], &[(0x30, 1023)], ranges)], 0, &mut out);
        assert!(out[0].gamepad.lx > 30_000);

        layer.translate(&[hid_snapshot(None, &[], &[(0x30, 0)], ranges)], 0, &mut out);
        assert!(out[0].gamepad.lx < -30_000);
    }

    #[test]
    fn test_generic_trigger_axes() {
        let mut layer = passthrough_layer();
        let ranges = &[(0x33u16, 0i32, 1023i32), (0x34u16, 0i32, 1023i32)];
        let mut out = Vec::new();
        layer.translate(
            &[hid_snapshot(None, &[], &[(0x33, 1023), (0x34, 0)], ranges)],
            0,
            &mut out,
        );
        assert_eq!(out[0].gamepad.l_trigger, 255);
        assert_eq!(out[0].gamepad.r_trigger, 0);
    }

    #[test]
    fn test_zero_width_axis_range_yields_center() {
        let mut layer = passthrough_layer();
        let mut out = Vec::new();
        layer.translate(
            &[hid_snapshot(None, &[], &[(0x30, 7)], &[(0x30, 7, 7)])],
            0,
            &mut out,
        );
        assert_eq!(out[0].gamepad.lx, 0);
    }

    #[test]
    fn test_generic_buttons_map_to_face_buttons() {
        let mut layer = passthrough_layer();
        let mut out = Vec::new();
        layer.translate(
            &[hid_snapshot(None, &[1, 2, 3, 4, 9], &[], &[])],
            0,
            &mut out,
        );
        let word = out[0].gamepad.buttons;
        assert_eq!(
            word,
            buttons::A | buttons::B | buttons::X | buttons::Y
        );
    }

    #[test]
    fn test_socd_neutral_on_xinput_source() {
        let mut layer = TranslationLayer::new(TranslationConfig {
            socd_enabled: true,
            debounce_enabled: false,
            deadzone: DeadzoneConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        });
        let snap = xinput_snapshot(
            0,
            RawXInputReport {
                packet_number: 1,
                buttons: buttons::DPAD_LEFT | buttons::DPAD_RIGHT | buttons::B,
                thumb_lx: -20_000, // stick position must not matter
                ..Default::default()
            },
        );
        let mut out = Vec::new();
        layer.translate(&[snap], 0, &mut out);
        let word = out[0].gamepad.buttons;
        assert_eq!(word & buttons::DPAD_LEFT, 0);
        assert_eq!(word & buttons::DPAD_RIGHT, 0);
        assert_ne!(word & buttons::B, 0);
    }

    #[test]
    fn test_deadzone_zeroes_drift_on_all_four_axes() {
        let mut layer = TranslationLayer::new(TranslationConfig {
            socd_enabled: false,
            debounce_enabled: false,
            deadzone: DeadzoneConfig {
                enabled: true,
                left_deadzone: 0.15,
                right_deadzone: 0.15,
                left_anti_deadzone: 0.0,
                right_anti_deadzone: 0.0,
            },
            ..Default::default()
        });
        let snap = xinput_snapshot(
            0,
            RawXInputReport {
                packet_number: 1,
                thumb_lx: 3000,
                thumb_ly: 2000,
                thumb_rx: -2500,
                thumb_ry: 1500,
                ..Default::default()
            },
        );
        let mut out = Vec::new();
        layer.translate(&[snap], 0, &mut out);
        let pad = out[0].gamepad;
        assert_eq!((pad.lx, pad.ly, pad.rx, pad.ry), (0, 0, 0, 0));
    }

    #[test]
    fn test_profile_routing_by_direction_flags() {
        let mut layer = TranslationLayer::new(TranslationConfig {
            xinput_to_dinput: true,
            dinput_to_xinput: true,
            socd_enabled: false,
            debounce_enabled: false,
            deadzone: DeadzoneConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        });

        let xi = xinput_snapshot(
            0,
            RawXInputReport {
                packet_number: 1,
                ..Default::default()
            },
        );
        let hid = hid_snapshot(None, &[], &[], &[]);
        let mut out = Vec::new();
        layer.translate(&[xi, hid], 0, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].profile, TargetProfile::Ds4Style);
        assert_eq!(out[1].profile, TargetProfile::XboxStyle);
        assert_eq!(out[1].source_slot, HID_SLOT);
    }

    #[test]
    fn test_debounce_discards_rapid_changes() {
        let mut layer = TranslationLayer::new(TranslationConfig {
            socd_enabled: false,
            debounce_enabled: true,
            debounce_interval_ms: 10,
            deadzone: DeadzoneConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        });

        let ms = 1_000_000u64; // ticks per millisecond
        let press = |word: u16| {
            xinput_snapshot(
                0,
                RawXInputReport {
                    packet_number: 1,
                    buttons: word,
                    ..Default::default()
                },
            )
        };

        let mut out = Vec::new();
        layer.translate(&[press(buttons::A)], 20 * ms, &mut out);
        assert_eq!(out[0].gamepad.buttons, buttons::A);

        // 2ms later: the change to B is bounced, A is held.
        layer.translate(&[press(buttons::B)], 22 * ms, &mut out);
        assert_eq!(out[0].gamepad.buttons, buttons::A);

        // After the interval the new word goes through.
        layer.translate(&[press(buttons::B)], 31 * ms, &mut out);
        assert_eq!(out[0].gamepad.buttons, buttons::B);
    }
}
