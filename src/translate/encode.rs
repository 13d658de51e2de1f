//! Target wire-format encodings.
//!
//! Canonical state becomes either an Xbox-style report (field-for-field
//! copy) or a DS4-style report (remapped buttons, d-pad as an 8-way POV
//! hat, unsigned 8-bit sticks with the DS4's inverted Y).

use super::canonical::{buttons, CanonicalGamepad};

/// Xbox-style wire report; identical layout to the canonical state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XboxReport {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// DS4 button bits. The low nibble is the POV hat, not individual bits.
pub mod ds4_buttons {
    pub const SQUARE: u16 = 0x0010;
    pub const CROSS: u16 = 0x0020;
    pub const CIRCLE: u16 = 0x0040;
    pub const TRIANGLE: u16 = 0x0080;
    pub const L1: u16 = 0x0100;
    pub const R1: u16 = 0x0200;
    pub const L2: u16 = 0x0400;
    pub const R2: u16 = 0x0800;
    pub const SHARE: u16 = 0x1000;
    pub const OPTIONS: u16 = 0x2000;
    pub const L3: u16 = 0x4000;
    pub const R3: u16 = 0x8000;
}

/// 8-way POV hat values in the DS4 report's low nibble.
pub mod ds4_hat {
    pub const NORTH: u16 = 0;
    pub const NORTH_EAST: u16 = 1;
    pub const EAST: u16 = 2;
    pub const SOUTH_EAST: u16 = 3;
    pub const SOUTH: u16 = 4;
    pub const SOUTH_WEST: u16 = 5;
    pub const WEST: u16 = 6;
    pub const NORTH_WEST: u16 = 7;
    pub const NONE: u16 = 8;
}

/// DS4-style wire report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds4Report {
    /// Hat in the low nibble, buttons in the rest.
    pub buttons: u16,
    pub trigger_l: u8,
    pub trigger_r: u8,
    pub thumb_lx: u8,
    /// Low values = up on the DS4.
    pub thumb_ly: u8,
    pub thumb_rx: u8,
    pub thumb_ry: u8,
}

impl Default for Ds4Report {
    fn default() -> Self {
        Self {
            buttons: ds4_hat::NONE,
            trigger_l: 0,
            trigger_r: 0,
            thumb_lx: 0x80,
            thumb_ly: 0x80,
            thumb_rx: 0x80,
            thumb_ry: 0x80,
        }
    }
}

/// Encode for an Xbox-style target: a 1:1 copy.
pub fn encode_xbox(pad: &CanonicalGamepad) -> XboxReport {
    XboxReport {
        buttons: pad.buttons,
        left_trigger: pad.l_trigger,
        right_trigger: pad.r_trigger,
        thumb_lx: pad.lx,
        thumb_ly: pad.ly,
        thumb_rx: pad.rx,
        thumb_ry: pad.ry,
    }
}

/// Encode for a DS4-style target.
pub fn encode_ds4(pad: &CanonicalGamepad) -> Ds4Report {
    let mut word = hat_from_dpad(pad.buttons);

    let pairs = [
        (buttons::A, ds4_buttons::CROSS),
        (buttons::B, ds4_buttons::CIRCLE),
        (buttons::X, ds4_buttons::SQUARE),
        (buttons::Y, ds4_buttons::TRIANGLE),
        (buttons::LEFT_SHOULDER, ds4_buttons::L1),
        (buttons::RIGHT_SHOULDER, ds4_buttons::R1),
        (buttons::BACK, ds4_buttons::SHARE),
        (buttons::START, ds4_buttons::OPTIONS),
        (buttons::LEFT_THUMB, ds4_buttons::L3),
        (buttons::RIGHT_THUMB, ds4_buttons::R3),
    ];
    for (canonical, ds4) in pairs {
        if pad.buttons & canonical != 0 {
            word |= ds4;
        }
    }

    // Analog pressure also sets the digital trigger bits.
    if pad.l_trigger > 0 {
        word |= ds4_buttons::L2;
    }
    if pad.r_trigger > 0 {
        word |= ds4_buttons::R2;
    }

    Ds4Report {
        buttons: word,
        trigger_l: pad.l_trigger,
        trigger_r: pad.r_trigger,
        thumb_lx: stick_to_byte(pad.lx),
        // Canonical up -> low bThumbY: negate before narrowing so the
        // center stays at 0x80.
        thumb_ly: stick_to_byte(pad.ly.saturating_neg()),
        thumb_rx: stick_to_byte(pad.rx),
        thumb_ry: stick_to_byte(pad.ry.saturating_neg()),
    }
}

fn stick_to_byte(value: i16) -> u8 {
    ((value as i32 + 32768) >> 8) as u8
}

fn hat_from_dpad(word: u16) -> u16 {
    let up = word & buttons::DPAD_UP != 0;
    let down = word & buttons::DPAD_DOWN != 0;
    let left = word & buttons::DPAD_LEFT != 0;
    let right = word & buttons::DPAD_RIGHT != 0;

    if up {
        if right {
            ds4_hat::NORTH_EAST
        } else if left {
            ds4_hat::NORTH_WEST
        } else {
            ds4_hat::NORTH
        }
    } else if down {
        if right {
            ds4_hat::SOUTH_EAST
        } else if left {
            ds4_hat::SOUTH_WEST
        } else {
            ds4_hat::SOUTH
        }
    } else if right {
        ds4_hat::EAST
    } else if left {
        ds4_hat::WEST
    } else {
        ds4_hat::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xbox_encoding_is_field_copy() {
        let pad = CanonicalGamepad {
            buttons: buttons::A | buttons::DPAD_LEFT,
            l_trigger: 10,
            r_trigger: 250,
            lx: -32768,
            ly: 32767,
            rx: 5,
            ry: -5,
        };
        let report = encode_xbox(&pad);
        assert_eq!(report.buttons, pad.buttons);
        assert_eq!(report.left_trigger, 10);
        assert_eq!(report.right_trigger, 250);
        assert_eq!(report.thumb_lx, -32768);
        assert_eq!(report.thumb_ly, 32767);
    }

    #[test]
    fn test_ds4_button_remap() {
        let pad = CanonicalGamepad {
            buttons: buttons::A | buttons::X | buttons::START,
            ..Default::default()
        };
        let report = encode_ds4(&pad);
        assert_ne!(report.buttons & ds4_buttons::CROSS, 0);
        assert_ne!(report.buttons & ds4_buttons::SQUARE, 0);
        assert_ne!(report.buttons & ds4_buttons::OPTIONS, 0);
        assert_eq!(report.buttons & 0x000F, ds4_hat::NONE);
    }

    #[test]
    fn test_ds4_hat_encoding() {
        let cases = [
            (buttons::DPAD_UP, ds4_hat::NORTH),
            (buttons::DPAD_UP | buttons::DPAD_RIGHT, ds4_hat::NORTH_EAST),
            (buttons::DPAD_RIGHT, ds4_hat::EAST),
            (buttons::DPAD_DOWN | buttons::DPAD_RIGHT, ds4_hat::SOUTH_EAST),
            (buttons::DPAD_DOWN, ds4_hat::SOUTH),
            (buttons::DPAD_DOWN | buttons::DPAD_LEFT, ds4_hat::SOUTH_WEST),
            (buttons::DPAD_LEFT, ds4_hat::WEST),
            (buttons::DPAD_UP | buttons::DPAD_LEFT, ds4_hat::NORTH_WEST),
            (0, ds4_hat::NONE),
        ];
        for (dpad, hat) in cases {
            let pad = CanonicalGamepad {
                buttons: dpad,
                ..Default::default()
            };
            assert_eq!(encode_ds4(&pad).buttons & 0x000F, hat, "dpad {dpad:#06x}");
        }
    }

    #[test]
    fn test_ds4_trigger_pressure_sets_digital_bits() {
        let pad = CanonicalGamepad {
            l_trigger: 1,
            r_trigger: 0,
            ..Default::default()
        };
        let report = encode_ds4(&pad);
        assert_ne!(report.buttons & ds4_buttons::L2, 0);
        assert_eq!(report.buttons & ds4_buttons::R2, 0);
        assert_eq!(report.trigger_l, 1);
    }

    #[test]
    fn test_ds4_stick_remap_inverts_y() {
        let pad = CanonicalGamepad {
            lx: 0,
            ly: 32767, // full up
            rx: -32768,
            ry: -32768, // full down
            ..Default::default()
        };
        let report = encode_ds4(&pad);
        assert_eq!(report.thumb_lx, 0x80);
        assert_eq!(report.thumb_ly, 0); // up is low on the DS4
        assert_eq!(report.thumb_rx, 0);
        assert_eq!(report.thumb_ry, 255);
    }

    #[test]
    fn test_ds4_neutral_report() {
        let report = encode_ds4(&CanonicalGamepad::default());
        assert_eq!(report, Ds4Report::default());
    }
}
