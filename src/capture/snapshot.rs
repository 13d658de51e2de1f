//! Point-in-time state of one physical controller slot.
//!
//! The capture layer owns the live OS handles; everything other components
//! see is a [`PhysicalSnapshot`] value copied out under the states mutex.

use std::collections::{BTreeMap, BTreeSet};

use crate::timing::Ticks;

/// Fixed number of XInput-stack slots on the platform.
pub const XINPUT_SLOT_COUNT: usize = 4;

/// Slot id used for HID-stack pads that have no XInput slot.
pub const HID_SLOT: i32 = -1;

/// Last successful XInput-stack report for a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawXInputReport {
    /// Monotonic packet counter; 0 until the first successful poll.
    pub packet_number: u32,
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// Declared logical range of one HID value usage, from the report descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidAxisRange {
    pub logical_min: i32,
    pub logical_max: i32,
}

/// Decomposed last HID input report.
///
/// Raw values are stored next to their declared ranges; no interpretation
/// happens at capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HidReportState {
    /// Button usages active in the last report.
    pub active_buttons: BTreeSet<u16>,
    /// Value usage -> raw value from the last report.
    pub values: BTreeMap<u16, i32>,
    /// Value usage -> declared logical min/max from the device's value caps.
    pub ranges: BTreeMap<u16, HidAxisRange>,
}

/// Snapshot of one enumerated physical slot, connected or not.
#[derive(Debug, Clone, Default)]
pub struct PhysicalSnapshot {
    /// XInput slot index (0..[`XINPUT_SLOT_COUNT`]), or [`HID_SLOT`].
    pub slot_id: i32,
    pub connected: bool,
    /// Stable OS device-instance identifier; empty while the slot is
    /// unmatched. Matching across polls and reconnects uses this, never
    /// `device_path`.
    pub instance_id: String,
    /// Transient open-file path to the interface behind this slot.
    pub device_path: String,
    pub product_name: Option<String>,
    pub raw_xinput: RawXInputReport,
    pub raw_hid: HidReportState,
    /// True while a non-blocking read is outstanding (HID slots only).
    pub read_pending: bool,
    /// Platform error code from the most recent poll, 0 if none.
    pub last_error: u32,
    /// Capture tick of the last successful poll.
    pub timestamp: Ticks,
}

impl PhysicalSnapshot {
    /// Empty XInput slot entry, disconnected until matched and polled.
    pub fn xinput_slot(slot_id: i32) -> Self {
        Self {
            slot_id,
            ..Default::default()
        }
    }

    /// New HID-stack entry for a freshly opened interface.
    pub fn hid_device(instance_id: String, device_path: String) -> Self {
        Self {
            slot_id: HID_SLOT,
            connected: true,
            instance_id,
            device_path,
            ..Default::default()
        }
    }

    /// Whether this slot belongs to the XInput stack.
    pub fn is_xinput(&self) -> bool {
        self.slot_id >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xinput_slot_starts_unmatched() {
        let snap = PhysicalSnapshot::xinput_slot(2);
        assert_eq!(snap.slot_id, 2);
        assert!(!snap.connected);
        assert!(snap.instance_id.is_empty());
        assert!(snap.is_xinput());
    }

    #[test]
    fn test_hid_device_is_connected_on_creation() {
        let snap = PhysicalSnapshot::hid_device("HID\\VID_1234".into(), "\\\\?\\hid#a".into());
        assert_eq!(snap.slot_id, HID_SLOT);
        assert!(snap.connected);
        assert!(!snap.is_xinput());
    }
}
