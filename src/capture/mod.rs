//! Physical controller capture.
//!
//! Owns every physical device handle in the process and produces, on demand,
//! a point-in-time vector of [`PhysicalSnapshot`] covering every known slot.
//! Two stacks feed it: the slotted XInput-style stack (4 fixed slots) and the
//! generic HID stack (arbitrary joysticks/gamepads, one entry per opened
//! interface).
//!
//! There is no capture-owned polling thread; the router calls [`InputCapture::update`]
//! on its tick. The states mutex still matters because rumble writes arrive
//! on bus-driver threads.

pub mod backend;
pub mod mock;
pub mod snapshot;

#[cfg(windows)]
pub mod hid;
#[cfg(windows)]
pub mod xinput;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::timing::Clock;
use backend::{HidDeviceIo, HidPoll, HidStack, StackError, XInputStack};
use snapshot::{PhysicalSnapshot, HID_SLOT, XINPUT_SLOT_COUNT};

/// Platform code for the authoritative "not connected" reply.
pub const ERROR_DEVICE_NOT_CONNECTED: u32 = 1167;

/// Vendor/product patterns of interfaces the virtual-bus driver emits.
/// Anything matching these is a device this process (or a sibling) created
/// and must never be captured, or rumble would feed back into itself.
const VIRTUAL_PAD_PATTERNS: &[&str] = &["VID_044F&PID_B326", "VID_054C&PID_05C4"];

/// Marker substring the platform puts on XInput-served HID interfaces.
const XINPUT_INTERFACE_MARKER: &str = "IG_";

struct Inner {
    states: Vec<PhysicalSnapshot>,
    /// Open HID interfaces, keyed by instance id. Only this map ever touches
    /// raw OS handles.
    handles: HashMap<String, Box<dyn HidDeviceIo>>,
    /// Instance ids already reported as rejected virtual pads, to keep
    /// enumeration logs quiet.
    logged_virtual: std::collections::HashSet<String>,
}

/// Capture layer facade. See the module docs for the threading model.
pub struct InputCapture {
    clock: Clock,
    xinput: Box<dyn XInputStack>,
    hid: Mutex<Box<dyn HidStack>>,
    inner: Arc<Mutex<Inner>>,
    recorder: Mutex<InputRecorder>,
}

impl InputCapture {
    /// Build a capture layer over explicit stacks.
    pub fn new(clock: Clock, xinput: Box<dyn XInputStack>, hid: Box<dyn HidStack>) -> Self {
        let states = (0..XINPUT_SLOT_COUNT as i32)
            .map(PhysicalSnapshot::xinput_slot)
            .collect();
        Self {
            clock,
            xinput,
            hid: Mutex::new(hid),
            inner: Arc::new(Mutex::new(Inner {
                states,
                handles: HashMap::new(),
                logged_virtual: Default::default(),
            })),
            recorder: Mutex::new(InputRecorder::new()),
        }
    }

    /// Build a capture layer over the real platform stacks.
    ///
    /// Fails when the XInput stack itself cannot be loaded; this is the one
    /// capture error that is fatal at startup.
    #[cfg(windows)]
    pub fn platform(clock: Clock) -> Result<Self> {
        let xinput = Box::new(xinput::WinXInputStack::load()?);
        let hid = Box::new(hid::WinHidStack::new());
        Ok(Self::new(clock, xinput, hid))
    }

    /// Non-Windows hosts have no physical stacks; run over empty mocks so
    /// the rest of the process still works in input test mode.
    #[cfg(not(windows))]
    pub fn platform(clock: Clock) -> Result<Self> {
        Ok(Self::new(
            clock,
            Box::new(mock::MockXInputStack::new()),
            Box::new(mock::MockHidStack::new()),
        ))
    }

    /// Thread-safe copy of every slot's current snapshot.
    pub fn get(&self) -> Vec<PhysicalSnapshot> {
        self.inner.lock().states.clone()
    }

    /// Number of slots currently connected.
    pub fn connected_count(&self) -> usize {
        self.inner.lock().states.iter().filter(|s| s.connected).count()
    }

    /// Poll both stacks once. Called by the router every tick.
    pub fn update(&self) {
        self.poll_xinput_slots();
        self.poll_hid_slots();
        self.record_tick();
    }

    /// Walk the HID device class and reconcile the slot table with what is
    /// present: new pads are opened, known pads get their transient path
    /// refreshed, virtual pads emitted by our own bus driver are rejected.
    pub fn refresh_devices(&self) {
        let interfaces = self.hid.lock().enumerate();
        let now = self.clock.now();

        for iface in interfaces {
            if iface.instance_id.is_empty() {
                continue;
            }

            if self.is_virtual_pad(&iface.instance_id) {
                let mut inner = self.inner.lock();
                if inner.logged_virtual.insert(iface.instance_id.clone()) {
                    debug!("Rejected virtual pad interface: {}", iface.instance_id);
                }
                continue;
            }

            let is_xinput = iface.instance_id.contains(XINPUT_INTERFACE_MARKER)
                || iface.device_path.contains(XINPUT_INTERFACE_MARKER);

            // Known device: refresh the transient path and reconnect.
            {
                let mut inner = self.inner.lock();
                if let Some(state) = inner
                    .states
                    .iter_mut()
                    .find(|s| !s.instance_id.is_empty() && s.instance_id == iface.instance_id)
                {
                    state.device_path = iface.device_path.clone();
                    state.connected = true;
                    continue;
                }
            }

            if is_xinput {
                self.match_xinput_interface(&iface, now);
            } else {
                self.open_hid_interface(&iface, now);
            }
        }
    }

    /// Route a rumble command to the physical pad behind an XInput slot.
    /// Motor strengths are [0, 1]; HID-stack pads are not driven here.
    pub fn set_vibration(&self, slot_id: i32, left: f32, right: f32) {
        if !(0..XINPUT_SLOT_COUNT as i32).contains(&slot_id) {
            return;
        }
        let left = (left.clamp(0.0, 1.0) * 65535.0) as u16;
        let right = (right.clamp(0.0, 1.0) * 65535.0) as u16;
        if let Err(e) = self.xinput.set_vibration(slot_id as u32, left, right) {
            debug!("Vibration write failed for slot {slot_id}: {e:?}");
        }
    }

    /// Drop every open handle. Idempotent; called on every exit path.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.handles.clear();
        for state in inner.states.iter_mut() {
            state.connected = false;
            state.read_pending = false;
        }
        self.recorder.lock().disable();
    }

    /// Toggle the per-tick CSV input recorder.
    pub fn enable_input_logging(&self, enabled: bool) {
        let mut rec = self.recorder.lock();
        if enabled {
            if let Err(e) = rec.enable(self.clock.now()) {
                warn!("Failed to start input log: {e}");
            }
        } else {
            rec.disable();
        }
    }

    /// Change the recorder output path. Rejected while recording is active.
    pub fn set_log_path(&self, path: PathBuf) {
        let mut rec = self.recorder.lock();
        if rec.active() {
            warn!("Cannot change input log path while logging is active");
            return;
        }
        rec.path = path;
    }

    // Two disjoint criteria, OR'd: a hard-coded VID/PID pattern of the
    // virtual-bus driver's emitted pads, or the bus driver's UI-number
    // property. Both absent implies physical.
    fn is_virtual_pad(&self, instance_id: &str) -> bool {
        let upper = instance_id.to_ascii_uppercase();
        if VIRTUAL_PAD_PATTERNS.iter().any(|p| upper.contains(p)) {
            return true;
        }
        self.hid.lock().has_ui_number_property(instance_id)
    }

    /// Collapse all interfaces of one physical XInput pad onto a single
    /// identity and claim the lowest free slot for it.
    fn match_xinput_interface(&self, iface: &backend::HidInterfaceInfo, now: crate::timing::Ticks) {
        let Some(base) = base_device_id(&iface.instance_id) else {
            warn!(
                "Could not extract base device id from: {}",
                iface.instance_id
            );
            return;
        };

        let product = self.hid.lock().read_product_string(&iface.device_path);

        let mut inner = self.inner.lock();

        // Another interface of the same physical pad may already hold a slot.
        let already_claimed = inner.states.iter().any(|s| {
            s.slot_id >= 0
                && !s.instance_id.is_empty()
                && base_device_id(&s.instance_id).as_deref() == Some(base.as_str())
        });
        if already_claimed {
            return;
        }

        if let Some(state) = inner
            .states
            .iter_mut()
            .find(|s| s.slot_id >= 0 && s.instance_id.is_empty())
        {
            state.instance_id = iface.instance_id.clone();
            state.device_path = iface.device_path.clone();
            state.product_name = product;
            state.connected = true;
            state.timestamp = now;
            info!(
                "Matched XInput pad to slot {}: {}",
                state.slot_id,
                state.product_name.as_deref().unwrap_or("(unnamed)")
            );
        }
    }

    fn open_hid_interface(&self, iface: &backend::HidInterfaceInfo, now: crate::timing::Ticks) {
        let Some(device) = self.hid.lock().open(iface) else {
            // Enumeration-transient: one device failed to open; skip it.
            debug!("Could not open HID interface: {}", iface.device_path);
            return;
        };

        if !device.is_gamepad() {
            return;
        }

        let mut snap =
            PhysicalSnapshot::hid_device(iface.instance_id.clone(), iface.device_path.clone());
        snap.product_name = device.product_name();
        snap.raw_hid.ranges = device.axis_ranges();
        snap.timestamp = now;

        let mut inner = self.inner.lock();
        // Dedup guard: never two entries with the same instance id.
        if inner
            .states
            .iter()
            .any(|s| s.instance_id == iface.instance_id)
        {
            return;
        }
        info!(
            "HID pad found: {}",
            snap.product_name.as_deref().unwrap_or("(unnamed)")
        );
        inner.handles.insert(iface.instance_id.clone(), device);
        inner.states.push(snap);
    }

    fn poll_xinput_slots(&self) {
        for slot in 0..XINPUT_SLOT_COUNT {
            let matched = {
                let inner = self.inner.lock();
                !inner.states[slot].instance_id.is_empty()
            };

            // Unmatched slots are forced to disconnected regardless of the
            // stack's reply, so synthetic duplicate interfaces cannot fill
            // unrelated slots.
            if !matched {
                let mut inner = self.inner.lock();
                let state = &mut inner.states[slot];
                state.connected = false;
                state.last_error = ERROR_DEVICE_NOT_CONNECTED;
                continue;
            }

            let result = self.xinput.get_state(slot as u32);
            let now = self.clock.now();
            let mut inner = self.inner.lock();
            let state = &mut inner.states[slot];
            match result {
                Ok(poll) => {
                    state.raw_xinput.packet_number = poll.packet_number;
                    state.raw_xinput.buttons = poll.buttons;
                    state.raw_xinput.left_trigger = poll.left_trigger;
                    state.raw_xinput.right_trigger = poll.right_trigger;
                    state.raw_xinput.thumb_lx = poll.thumb_lx;
                    state.raw_xinput.thumb_ly = poll.thumb_ly;
                    state.raw_xinput.thumb_rx = poll.thumb_rx;
                    state.raw_xinput.thumb_ry = poll.thumb_ry;
                    state.connected = true;
                    state.last_error = 0;
                    state.timestamp = now;
                }
                Err(StackError::NotConnected) => {
                    state.connected = false;
                    state.last_error = ERROR_DEVICE_NOT_CONNECTED;
                    // Clear so the slot can be re-matched at next enumeration.
                    state.instance_id.clear();
                }
                Err(StackError::Other(code)) => {
                    // Poll-transient: keep last-known state.
                    state.last_error = code;
                }
            }
        }
    }

    fn poll_hid_slots(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Inner {
            states, handles, ..
        } = &mut *inner;

        let mut dropped: Vec<String> = Vec::new();
        for state in states.iter_mut().filter(|s| s.slot_id == HID_SLOT) {
            let Some(device) = handles.get_mut(&state.instance_id) else {
                continue;
            };
            match device.poll() {
                HidPoll::Report(report) => {
                    state.raw_hid.active_buttons = report.active_buttons;
                    // Values persist per usage across partial reports.
                    for (usage, value) in report.values {
                        state.raw_hid.values.insert(usage, value);
                    }
                    state.connected = true;
                    state.last_error = 0;
                    state.timestamp = now;
                    state.read_pending = device.read_pending();
                }
                HidPoll::Pending => {
                    state.read_pending = true;
                }
                HidPoll::Disconnected(code) => {
                    state.connected = false;
                    state.read_pending = false;
                    state.last_error = code;
                    dropped.push(state.instance_id.clone());
                }
                HidPoll::Transient(code) => {
                    // Abandon this read; retry next tick without flipping
                    // connected.
                    state.read_pending = false;
                    state.last_error = code;
                }
            }
        }

        // Free per-read state so the pad can be rematched after re-plug.
        for id in dropped {
            handles.remove(&id);
        }
    }

    fn record_tick(&self) {
        let mut rec = self.recorder.lock();
        if !rec.active() {
            return;
        }
        let now = self.clock.now();
        let inner = self.inner.lock();
        for state in inner.states.iter().filter(|s| s.connected) {
            if let Err(e) = rec.write_row(now, state) {
                warn!("Input log write failed, stopping recorder: {e}");
                rec.disable();
                break;
            }
        }
    }
}

/// Reduce an XInput interface instance id to its per-pad base identity:
/// the enumerator + VID/PID portion with the instance serial dropped and the
/// `&IG_…` interface suffix stripped, so
/// `HID\VID_045E&PID_028E&IG_01\8&F746FFA&0&0000` and
/// `HID\VID_045E&PID_028E&IG_02\8&F746FFA&0&0001` both collapse to
/// `HID\VID_045E&PID_028E`. `None` when nothing is left.
fn base_device_id(instance_id: &str) -> Option<String> {
    let parts: Vec<&str> = instance_id.split('\\').collect();
    let mut base = if parts.len() >= 2 {
        parts[..2].join("\\")
    } else {
        instance_id.to_string()
    };
    if let Some(pos) = base.find("&IG_") {
        base.truncate(pos);
    }
    if base.is_empty() {
        None
    } else {
        Some(base)
    }
}

/// Opt-in CSV recorder for raw capture state, one row per connected pad per
/// tick. Flushes every 100 samples.
struct InputRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    start: crate::timing::Ticks,
    samples: u64,
}

impl InputRecorder {
    fn new() -> Self {
        Self {
            path: PathBuf::from("controller_input_log.csv"),
            writer: None,
            start: 0,
            samples: 0,
        }
    }

    fn active(&self) -> bool {
        self.writer.is_some()
    }

    fn enable(&mut self, now: crate::timing::Ticks) -> std::io::Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writeln!(
            writer,
            "Timestamp_ms,Controller_ID,Controller_Name,\
             LX_Raw,LY_Raw,RX_Raw,RY_Raw,\
             LX_Normalized,LY_Normalized,RX_Normalized,RY_Normalized,\
             LT,RT,Buttons_Hex,Packet_Number,Is_Connected,Error_Code"
        )?;
        self.writer = Some(writer);
        self.start = now;
        self.samples = 0;
        info!("Input logging started: {}", self.path.display());
        Ok(())
    }

    fn disable(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
            info!("Input logging stopped. Total samples: {}", self.samples);
        }
    }

    fn write_row(
        &mut self,
        now: crate::timing::Ticks,
        state: &PhysicalSnapshot,
    ) -> std::io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let elapsed_ms = Clock::ticks_to_ms(now.saturating_sub(self.start));
        let name = state.product_name.clone().unwrap_or_else(|| {
            if state.is_xinput() {
                "XInput_Controller".to_string()
            } else {
                "HID_Device".to_string()
            }
        });
        let g = &state.raw_xinput;
        writeln!(
            writer,
            "{:.3},{},\"{}\",{},{},{},{},{:.6},{:.6},{:.6},{:.6},{},{},0x{:04X},{},{},{}",
            elapsed_ms,
            state.slot_id,
            name,
            g.thumb_lx,
            g.thumb_ly,
            g.thumb_rx,
            g.thumb_ry,
            g.thumb_lx as f32 / 32767.0,
            g.thumb_ly as f32 / 32767.0,
            g.thumb_rx as f32 / 32767.0,
            g.thumb_ry as f32 / 32767.0,
            g.left_trigger,
            g.right_trigger,
            g.buttons,
            g.packet_number,
            u8::from(state.connected),
            state.last_error,
        )?;
        self.samples += 1;
        if self.samples % 100 == 0 {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockDeviceSpec, MockHidStack, MockXInputStack};
    use super::snapshot::HidAxisRange;
    use super::*;
    use backend::XInputPoll;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn hid_report(buttons: &[u16], values: &[(u16, i32)]) -> snapshot::HidReportState {
        snapshot::HidReportState {
            active_buttons: buttons.iter().copied().collect(),
            values: values.iter().copied().collect(),
            ranges: Default::default(),
        }
    }

    fn gamepad_spec(name: &str) -> MockDeviceSpec {
        MockDeviceSpec {
            product_name: Some(name.to_string()),
            gamepad: true,
            ranges: [(
                0x30,
                HidAxisRange {
                    logical_min: 0,
                    logical_max: 255,
                },
            )]
            .into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_every_snapshot_has_slot_or_path() {
        let mut hid = MockHidStack::new();
        hid.add_device("HID\\VID_1111&PID_2222\\1", "\\\\?\\hid#pad0", gamepad_spec("Pad"));
        let capture = InputCapture::new(
            Clock::new(),
            Box::new(MockXInputStack::new()),
            Box::new(hid),
        );
        capture.refresh_devices();
        capture.update();
        for snap in capture.get() {
            assert!(snap.slot_id >= 0 || !snap.device_path.is_empty());
        }
    }

    #[test]
    fn test_enumeration_rejects_virtual_pads() {
        let mut hid = MockHidStack::new();
        hid.add_device(
            "HID\\VID_044F&PID_B326\\7&0",
            "\\\\?\\hid#vigem0",
            gamepad_spec("Virtual 360"),
        );
        hid.add_device("HID\\VID_9999&PID_0001\\1", "\\\\?\\hid#flagged", gamepad_spec("Flagged"));
        hid.mark_ui_number("HID\\VID_9999&PID_0001\\1");
        hid.add_device("HID\\VID_1111&PID_2222\\1", "\\\\?\\hid#real", gamepad_spec("Real Pad"));

        let capture = InputCapture::new(
            Clock::new(),
            Box::new(MockXInputStack::new()),
            Box::new(hid),
        );
        capture.refresh_devices();

        let hid_entries: Vec<_> = capture
            .get()
            .into_iter()
            .filter(|s| s.slot_id == HID_SLOT)
            .collect();
        assert_eq!(hid_entries.len(), 1);
        assert_eq!(hid_entries[0].product_name.as_deref(), Some("Real Pad"));
    }

    #[test]
    fn test_enumeration_dedups_by_instance_id() {
        let mut hid = MockHidStack::new();
        hid.add_device("HID\\VID_1111&PID_2222\\1", "\\\\?\\hid#a", gamepad_spec("Pad"));
        let capture = InputCapture::new(
            Clock::new(),
            Box::new(MockXInputStack::new()),
            Box::new(hid),
        );
        capture.refresh_devices();
        capture.refresh_devices();

        let matching: Vec<_> = capture
            .get()
            .into_iter()
            .filter(|s| s.instance_id == "HID\\VID_1111&PID_2222\\1")
            .collect();
        assert_eq!(matching.len(), 1);
    }

    #[test]
    fn test_xinput_interfaces_collapse_to_one_slot() {
        let mut hid = MockHidStack::new();
        // Two synthetic interfaces of the same physical pad.
        hid.add_device(
            "HID\\VID_045E&PID_028E&IG_00\\8&F746FFA&0&0000",
            "\\\\?\\hid#ig00",
            gamepad_spec("Xbox 360 Pad"),
        );
        hid.add_device(
            "HID\\VID_045E&PID_028E&IG_01\\8&F746FFA&0&0001",
            "\\\\?\\hid#ig01",
            gamepad_spec("Xbox 360 Pad"),
        );

        let xinput = MockXInputStack::new();
        xinput.set_slot(
            0,
            Some(XInputPoll {
                packet_number: 1,
                ..Default::default()
            }),
        );
        let capture = InputCapture::new(Clock::new(), Box::new(xinput), Box::new(hid));
        capture.refresh_devices();

        let claimed: Vec<_> = capture
            .get()
            .into_iter()
            .filter(|s| s.slot_id >= 0 && !s.instance_id.is_empty())
            .collect();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].slot_id, 0);
    }

    #[test]
    fn test_unmatched_xinput_slots_forced_disconnected() {
        let xinput = MockXInputStack::new();
        // The stack claims slot 1 is alive, but no interface was matched.
        xinput.set_slot(
            1,
            Some(XInputPoll {
                packet_number: 7,
                ..Default::default()
            }),
        );
        let capture = InputCapture::new(
            Clock::new(),
            Box::new(xinput),
            Box::new(MockHidStack::new()),
        );
        capture.update();

        let snaps = capture.get();
        assert!(!snaps[1].connected);
        assert_eq!(snaps[1].last_error, ERROR_DEVICE_NOT_CONNECTED);
    }

    #[test]
    fn test_xinput_disconnect_clears_instance_for_rematch() {
        let mut hid = MockHidStack::new();
        hid.add_device(
            "HID\\VID_045E&PID_028E&IG_00\\1",
            "\\\\?\\hid#ig00",
            gamepad_spec("Xbox 360 Pad"),
        );
        let hid = Arc::new(Mutex::new(hid));
        let xinput = Arc::new(MockXInputStack::new());
        xinput.set_slot(0, Some(XInputPoll::default()));

        let capture = InputCapture::new(Clock::new(), Box::new(xinput.clone()), Box::new(hid));
        capture.refresh_devices();
        capture.update();
        assert!(capture.get()[0].connected);

        // Pull the pad: the stack now answers with the disconnect signal,
        // which must clear the instance id so the slot can be re-matched.
        xinput.set_slot(0, None);
        capture.update();
        let snap = &capture.get()[0];
        assert!(!snap.connected);
        assert!(snap.instance_id.is_empty());

        // Re-plug: enumeration matches the same interface back to slot 0.
        xinput.set_slot(0, Some(XInputPoll::default()));
        capture.refresh_devices();
        capture.update();
        assert!(capture.get()[0].connected);
    }

    #[test]
    fn test_hid_poll_report_and_disconnect() {
        let mut hid = MockHidStack::new();
        let spec = gamepad_spec("Pad");
        spec.polls.lock().extend(VecDeque::from(vec![
            HidPoll::Report(hid_report(&[1, 2], &[(0x30, 200)])),
            HidPoll::Pending,
            HidPoll::Transient(31),
            HidPoll::Disconnected(ERROR_DEVICE_NOT_CONNECTED),
        ]));
        hid.add_device("HID\\VID_1111&PID_2222\\1", "\\\\?\\hid#a", spec);

        let capture = InputCapture::new(
            Clock::new(),
            Box::new(MockXInputStack::new()),
            Box::new(hid),
        );
        capture.refresh_devices();

        // Report parsed.
        capture.update();
        let snap = capture
            .get()
            .into_iter()
            .find(|s| s.slot_id == HID_SLOT)
            .unwrap();
        assert!(snap.connected);
        assert!(snap.raw_hid.active_buttons.contains(&1));
        assert_eq!(snap.raw_hid.values.get(&0x30), Some(&200));

        // Pending keeps the outstanding flag without error.
        capture.update();
        let snap = capture
            .get()
            .into_iter()
            .find(|s| s.slot_id == HID_SLOT)
            .unwrap();
        assert!(snap.connected);
        assert!(snap.read_pending);

        // Transient error retains connected.
        capture.update();
        let snap = capture
            .get()
            .into_iter()
            .find(|s| s.slot_id == HID_SLOT)
            .unwrap();
        assert!(snap.connected);
        assert_eq!(snap.last_error, 31);
        assert!(!snap.read_pending);

        // Authoritative disconnect flips connected and frees the handle.
        capture.update();
        let snap = capture
            .get()
            .into_iter()
            .find(|s| s.slot_id == HID_SLOT)
            .unwrap();
        assert!(!snap.connected);
        assert_eq!(snap.last_error, ERROR_DEVICE_NOT_CONNECTED);
        assert!(capture.inner.lock().handles.is_empty());
    }

    #[test]
    fn test_non_gamepad_interfaces_are_closed() {
        let mut hid = MockHidStack::new();
        let mut spec = gamepad_spec("Keyboard");
        spec.gamepad = false;
        hid.add_device("HID\\VID_1111&PID_0001\\1", "\\\\?\\hid#kbd", spec);
        let capture = InputCapture::new(
            Clock::new(),
            Box::new(MockXInputStack::new()),
            Box::new(hid),
        );
        capture.refresh_devices();
        assert!(capture.get().iter().all(|s| s.slot_id >= 0));
    }

    #[test]
    fn test_set_vibration_maps_to_full_scale() {
        let xinput = Arc::new(MockXInputStack::new());
        let capture = InputCapture::new(
            Clock::new(),
            Box::new(xinput.clone()),
            Box::new(MockHidStack::new()),
        );
        capture.set_vibration(0, 1.0, 0.5);
        capture.set_vibration(-1, 1.0, 1.0); // HID slot: not driven here
        capture.set_vibration(9, 1.0, 1.0); // out of range: ignored
        capture.set_vibration(1, 2.0, -1.0); // clamped to [0, 1]
        assert_eq!(
            xinput.vibrations(),
            vec![(0, 65535, 32767), (1, 65535, 0)]
        );
    }

    #[test]
    fn test_base_device_id_strips_serial_and_ig_suffix() {
        assert_eq!(
            base_device_id("HID\\VID_045E&PID_028E&IG_01\\8&F746FFA&0&0000").as_deref(),
            Some("HID\\VID_045E&PID_028E"),
        );
        assert_eq!(
            base_device_id("HID\\VID_045E&PID_028E&IG_03\\3&29329EE&0&0000").as_deref(),
            Some("HID\\VID_045E&PID_028E"),
        );
        assert_eq!(base_device_id("").as_deref(), None);
    }
}
