//! Canonical gamepad state shared by every translation path.
//!
//! All sources (XInput slots, raw HID pads) are normalized into
//! [`CanonicalGamepad`] before any cleaning or target encoding happens:
//! 16-bit packed buttons, 8-bit triggers, signed 16-bit sticks with
//! positive Y = up and neutral = 0.

use crate::timing::Ticks;

/// Canonical button bit assignments.
///
/// These match the Xbox-style wire layout so XInput sources copy through
/// unchanged; every other source is remapped onto these bits.
pub mod buttons {
    pub const DPAD_UP: u16 = 0x0001;
    pub const DPAD_DOWN: u16 = 0x0002;
    pub const DPAD_LEFT: u16 = 0x0004;
    pub const DPAD_RIGHT: u16 = 0x0008;
    pub const START: u16 = 0x0010;
    pub const BACK: u16 = 0x0020;
    pub const LEFT_THUMB: u16 = 0x0040;
    pub const RIGHT_THUMB: u16 = 0x0080;
    pub const LEFT_SHOULDER: u16 = 0x0100;
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    pub const A: u16 = 0x1000;
    pub const B: u16 = 0x2000;
    pub const X: u16 = 0x4000;
    pub const Y: u16 = 0x8000;
}

/// The hub representation every translation runs through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalGamepad {
    /// Packed button bitfield, see [`buttons`].
    pub buttons: u16,
    /// Left trigger, 0..=255.
    pub l_trigger: u8,
    /// Right trigger, 0..=255.
    pub r_trigger: u8,
    /// Left stick X, -32768..=32767.
    pub lx: i16,
    /// Left stick Y, positive = up.
    pub ly: i16,
    /// Right stick X.
    pub rx: i16,
    /// Right stick Y, positive = up.
    pub ry: i16,
}

/// Which virtual-target wire format a translated report is encoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetProfile {
    /// Xbox-360-style target (1:1 canonical copy).
    XboxStyle,
    /// DualShock-4-style target (remapped buttons, POV hat, u8 sticks).
    Ds4Style,
}

/// One pipeline output: canonical state plus routing metadata.
#[derive(Debug, Clone, Copy)]
pub struct TranslatedReport {
    /// `slot_id` of the source physical pad (-1 for HID-stack pads).
    pub source_slot: i32,
    /// True when the source was the XInput stack.
    pub xinput_source: bool,
    /// Target profile this entry should be submitted as.
    pub profile: TargetProfile,
    /// Cleaned canonical state.
    pub gamepad: CanonicalGamepad,
    /// Capture timestamp of the source snapshot.
    pub timestamp: Ticks,
}

/// Widen a signed 16-bit axis value. Sign-preserving, no range change.
pub fn short_to_long(value: i16) -> i32 {
    value as i32
}

/// Narrow a 32-bit axis value to signed 16-bit, clamping at the rails.
pub fn long_to_short(value: i32) -> i16 {
    value.clamp(-32768, 32767) as i16
}

/// Normalize a signed 16-bit axis to [-1.0, 1.0].
pub fn normalize_short(value: i16) -> f32 {
    (value as f32 / 32767.0).clamp(-1.0, 1.0)
}

/// Normalize an 8-bit trigger to [0.0, 1.0].
pub fn normalize_byte(value: u8) -> f32 {
    (value as f32 / 255.0).clamp(0.0, 1.0)
}
