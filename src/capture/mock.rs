//! In-memory input stacks.
//!
//! Used by the test suite everywhere, and as the capture backends on
//! non-Windows hosts (where the process runs in input test mode with no
//! physical stacks to talk to).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::backend::{
    HidDeviceIo, HidInterfaceInfo, HidPoll, HidStack, StackError, XInputPoll, XInputStack,
};
use super::snapshot::{HidAxisRange, XINPUT_SLOT_COUNT};

/// Scriptable XInput stack: tests set per-slot replies and inspect rumble.
#[derive(Default)]
pub struct MockXInputStack {
    slots: Mutex<[Option<XInputPoll>; XINPUT_SLOT_COUNT]>,
    vibrations: Mutex<Vec<(u32, u16, u16)>>,
}

impl MockXInputStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a pad into a slot (subsequent `get_state` returns this poll).
    pub fn set_slot(&self, slot: usize, poll: Option<XInputPoll>) {
        self.slots.lock()[slot] = poll;
    }

    /// Motor-speed writes observed so far, in call order.
    pub fn vibrations(&self) -> Vec<(u32, u16, u16)> {
        self.vibrations.lock().clone()
    }
}

impl XInputStack for MockXInputStack {
    fn get_state(&self, slot: u32) -> Result<XInputPoll, StackError> {
        self.slots
            .lock()
            .get(slot as usize)
            .and_then(|s| *s)
            .ok_or(StackError::NotConnected)
    }

    fn set_vibration(&self, slot: u32, left: u16, right: u16) -> Result<(), StackError> {
        self.vibrations.lock().push((slot, left, right));
        Ok(())
    }
}

/// Behavior of one fake HID interface.
#[derive(Clone, Default)]
pub struct MockDeviceSpec {
    pub product_name: Option<String>,
    pub gamepad: bool,
    pub ranges: BTreeMap<u16, HidAxisRange>,
    /// Replies handed out by `poll`, front first; empty means `Pending`.
    pub polls: Arc<Mutex<VecDeque<HidPoll>>>,
    /// When false, `open` fails (enumeration-transient case).
    pub refuse_open: bool,
}

struct MockHidDevice {
    spec: MockDeviceSpec,
    pending: bool,
}

impl HidDeviceIo for MockHidDevice {
    fn product_name(&self) -> Option<String> {
        self.spec.product_name.clone()
    }

    fn is_gamepad(&self) -> bool {
        self.spec.gamepad
    }

    fn axis_ranges(&self) -> BTreeMap<u16, HidAxisRange> {
        self.spec.ranges.clone()
    }

    fn poll(&mut self) -> HidPoll {
        let reply = self
            .spec
            .polls
            .lock()
            .pop_front()
            .unwrap_or(HidPoll::Pending);
        self.pending = matches!(reply, HidPoll::Pending);
        reply
    }

    fn read_pending(&self) -> bool {
        self.pending
    }
}

/// Scriptable HID stack: tests add/remove interfaces between enumerations.
#[derive(Default)]
pub struct MockHidStack {
    interfaces: Vec<HidInterfaceInfo>,
    ui_number_ids: HashSet<String>,
    specs: HashMap<String, MockDeviceSpec>,
}

impl MockHidStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface that `enumerate` will yield, with its device spec.
    pub fn add_device(&mut self, instance_id: &str, device_path: &str, spec: MockDeviceSpec) {
        self.interfaces.push(HidInterfaceInfo {
            instance_id: instance_id.to_string(),
            device_path: device_path.to_string(),
        });
        self.specs.insert(device_path.to_string(), spec);
    }

    /// Remove an interface (simulates unplug before the next enumeration).
    pub fn remove_device(&mut self, instance_id: &str) {
        self.interfaces.retain(|i| i.instance_id != instance_id);
    }

    /// Mark an instance id as carrying the virtual-bus UI-number property.
    pub fn mark_ui_number(&mut self, instance_id: &str) {
        self.ui_number_ids.insert(instance_id.to_string());
    }
}

// Shared-handle impls so tests can keep scripting a stack after handing it
// to the capture layer.
impl XInputStack for Arc<MockXInputStack> {
    fn get_state(&self, slot: u32) -> Result<XInputPoll, StackError> {
        self.as_ref().get_state(slot)
    }

    fn set_vibration(&self, slot: u32, left: u16, right: u16) -> Result<(), StackError> {
        self.as_ref().set_vibration(slot, left, right)
    }
}

impl HidStack for Arc<Mutex<MockHidStack>> {
    fn enumerate(&mut self) -> Vec<HidInterfaceInfo> {
        self.lock().enumerate()
    }

    fn has_ui_number_property(&self, instance_id: &str) -> bool {
        self.lock().has_ui_number_property(instance_id)
    }

    fn open(&mut self, info: &HidInterfaceInfo) -> Option<Box<dyn HidDeviceIo>> {
        self.lock().open(info)
    }

    fn read_product_string(&self, device_path: &str) -> Option<String> {
        self.lock().read_product_string(device_path)
    }
}

impl HidStack for MockHidStack {
    fn enumerate(&mut self) -> Vec<HidInterfaceInfo> {
        self.interfaces.clone()
    }

    fn has_ui_number_property(&self, instance_id: &str) -> bool {
        self.ui_number_ids.contains(instance_id)
    }

    fn open(&mut self, info: &HidInterfaceInfo) -> Option<Box<dyn HidDeviceIo>> {
        let spec = self.specs.get(&info.device_path)?.clone();
        if spec.refuse_open {
            return None;
        }
        Some(Box::new(MockHidDevice {
            spec,
            pending: false,
        }))
    }

    fn read_product_string(&self, device_path: &str) -> Option<String> {
        self.specs
            .get(device_path)
            .and_then(|s| s.product_name.clone())
    }
}
