//! Platform seams for the capture layer.
//!
//! The two input stacks are consumed through small traits so the pipeline,
//! device manager and router can be exercised against in-memory fakes on any
//! host. The Windows implementations live in [`crate::capture::xinput`] and
//! [`crate::capture::hid`].

use std::collections::BTreeMap;

use crate::capture::snapshot::{HidAxisRange, HidReportState};

/// Error surface of the XInput-style stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// The authoritative "nothing in this slot" reply.
    NotConnected,
    /// Any other platform error, with its native code.
    Other(u32),
}

/// Raw XInput-stack poll result for one slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct XInputPoll {
    pub packet_number: u32,
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// The slotted XInput-style input stack.
pub trait XInputStack: Send + Sync {
    /// Query one slot. `Err(StackError::NotConnected)` is the disconnect
    /// signal; any other error is transient.
    fn get_state(&self, slot: u32) -> Result<XInputPoll, StackError>;

    /// Set motor speeds for one slot, full scale 0..=u16::MAX.
    fn set_vibration(&self, slot: u32, left: u16, right: u16) -> Result<(), StackError>;
}

/// One interface yielded by HID class enumeration.
#[derive(Debug, Clone)]
pub struct HidInterfaceInfo {
    /// Stable device-instance identifier.
    pub instance_id: String,
    /// Transient path used to open the interface.
    pub device_path: String,
}

/// Outcome of driving one HID slot's non-blocking read by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidPoll {
    /// A report completed and was parsed.
    Report(HidReportState),
    /// A read is outstanding; not an error.
    Pending,
    /// The authoritative disconnect signal, with its native code.
    Disconnected(u32),
    /// Some other error; the read was abandoned and will be reissued next
    /// tick without flipping the connected flag.
    Transient(u32),
}

/// An open HID interface owned by the capture layer.
pub trait HidDeviceIo: Send {
    /// Product string reported by the device, if any.
    fn product_name(&self) -> Option<String>;

    /// True for Generic-Desktop Joystick (0x04) or Gamepad (0x05) top-level
    /// collections; everything else is closed right after opening.
    fn is_gamepad(&self) -> bool;

    /// Declared logical ranges per value usage, from the value caps.
    fn axis_ranges(&self) -> BTreeMap<u16, HidAxisRange>;

    /// Advance the overlapped read state machine by one step: issue a read
    /// if none is outstanding, otherwise poll its completion (non-blocking).
    fn poll(&mut self) -> HidPoll;

    /// Whether a read is currently outstanding.
    fn read_pending(&self) -> bool;
}

/// The generic HID input stack: class enumeration plus interface opening.
pub trait HidStack: Send {
    /// Walk the HID device class and return every present interface.
    fn enumerate(&mut self) -> Vec<HidInterfaceInfo>;

    /// Whether the platform property set by the virtual-bus driver
    /// (UI-number) is present on this device.
    fn has_ui_number_property(&self, instance_id: &str) -> bool;

    /// Open an interface for overlapped reads. `None` when opening or
    /// descriptor queries fail; such devices are skipped this pass.
    fn open(&mut self, info: &HidInterfaceInfo) -> Option<Box<dyn HidDeviceIo>>;

    /// Read-only open just to fetch the product string (used for XInput
    /// interfaces that are matched but never read through the HID stack).
    fn read_product_string(&self, device_path: &str) -> Option<String>;
}
