//! Windows HID stack backend.
//!
//! SetupAPI class enumeration, HIDP descriptor queries and overlapped
//! (non-blocking) report reads. Raw handles never leave this module; the
//! capture layer talks to it through the [`HidStack`]/[`HidDeviceIo`] traits.

#![cfg(windows)]

use std::collections::BTreeMap;
use std::mem;
use std::ptr;

use tracing::{debug, trace};

use windows_sys::core::GUID;
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInfo, SetupDiEnumDeviceInterfaces,
    SetupDiGetClassDevsW, SetupDiGetDeviceInstanceIdW, SetupDiGetDeviceInterfaceDetailW,
    SetupDiGetDevicePropertyW, DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, SP_DEVICE_INTERFACE_DATA,
    SP_DEVICE_INTERFACE_DETAIL_DATA_W, SP_DEVINFO_DATA,
};
use windows_sys::Win32::Devices::HumanInterfaceDevice::{
    HidD_FreePreparsedData, HidD_GetAttributes, HidD_GetHidGuid, HidD_GetPreparsedData,
    HidD_GetProductString, HidP_GetButtonCaps, HidP_GetCaps, HidP_GetUsageValue, HidP_GetUsages,
    HidP_GetValueCaps, HidP_Input, HIDD_ATTRIBUTES, HIDP_BUTTON_CAPS, HIDP_CAPS,
    HIDP_STATUS_SUCCESS, HIDP_VALUE_CAPS, PHIDP_PREPARSED_DATA,
};
use windows_sys::Win32::Devices::Properties::{DEVPROPKEY, DEVPROPTYPE};
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_BAD_COMMAND, ERROR_DEVICE_NOT_CONNECTED, ERROR_IO_INCOMPLETE,
    ERROR_IO_PENDING, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Threading::{CreateEventW, ResetEvent};
use windows_sys::Win32::System::IO::{GetOverlappedResult, OVERLAPPED};

use super::backend::{HidDeviceIo, HidInterfaceInfo, HidPoll, HidStack};
use super::snapshot::{HidAxisRange, HidReportState};

/// Fixed per-slot input buffer, larger than any gamepad input report.
const INPUT_BUFFER_LEN: usize = 512;

/// DEVPKEY_Device_UINumber; the virtual-bus driver sets this on the pads it
/// emits, physical pads do not carry it.
const DEVPKEY_DEVICE_UI_NUMBER: DEVPROPKEY = DEVPROPKEY {
    fmtid: GUID {
        data1: 0xa45c_254e,
        data2: 0xdf1c,
        data3: 0x4efd,
        data4: [0x80, 0x20, 0x67, 0xd1, 0x46, 0xa8, 0x50, 0xe0],
    },
    pid: 18,
};

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Read a NUL-terminated UTF-16 string.
///
/// Safety: `ptr` must point at a valid NUL-terminated wide string.
unsafe fn wide_to_string(ptr: *const u16) -> String {
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

/// One value usage and its declared logical range.
#[derive(Debug, Clone, Copy)]
struct ValueUsage {
    usage_page: u16,
    usage: u16,
    range: HidAxisRange,
}

/// The real HID device class, consumed through SetupAPI.
#[derive(Default)]
pub struct WinHidStack;

impl WinHidStack {
    pub fn new() -> Self {
        Self
    }
}

impl HidStack for WinHidStack {
    fn enumerate(&mut self) -> Vec<HidInterfaceInfo> {
        let mut out = Vec::new();
        unsafe {
            let mut guid: GUID = mem::zeroed();
            HidD_GetHidGuid(&mut guid);

            let set = SetupDiGetClassDevsW(
                &guid,
                ptr::null(),
                ptr::null_mut(),
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            );
            if set == INVALID_HANDLE_VALUE {
                return out;
            }

            let mut index = 0u32;
            loop {
                let mut iface: SP_DEVICE_INTERFACE_DATA = mem::zeroed();
                iface.cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32;
                if SetupDiEnumDeviceInterfaces(set, ptr::null(), &guid, index, &mut iface) == 0 {
                    break;
                }
                index += 1;

                let mut required = 0u32;
                SetupDiGetDeviceInterfaceDetailW(
                    set,
                    &iface,
                    ptr::null_mut(),
                    0,
                    &mut required,
                    ptr::null_mut(),
                );
                if required == 0 {
                    continue;
                }

                // u64 backing keeps the detail struct aligned.
                let mut detail = vec![0u64; (required as usize).div_ceil(8)];
                let detail_ptr = detail.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
                (*detail_ptr).cbSize =
                    mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;

                let mut devinfo: SP_DEVINFO_DATA = mem::zeroed();
                devinfo.cbSize = mem::size_of::<SP_DEVINFO_DATA>() as u32;

                if SetupDiGetDeviceInterfaceDetailW(
                    set,
                    &iface,
                    detail_ptr,
                    required,
                    ptr::null_mut(),
                    &mut devinfo,
                ) == 0
                {
                    continue;
                }

                let device_path =
                    wide_to_string(ptr::addr_of!((*detail_ptr).DevicePath) as *const u16);

                let mut id_buf = [0u16; 256];
                let instance_id = if SetupDiGetDeviceInstanceIdW(
                    set,
                    &devinfo,
                    id_buf.as_mut_ptr(),
                    id_buf.len() as u32,
                    ptr::null_mut(),
                ) != 0
                {
                    wide_to_string(id_buf.as_ptr())
                } else {
                    String::new()
                };

                out.push(HidInterfaceInfo {
                    instance_id,
                    device_path,
                });
            }

            SetupDiDestroyDeviceInfoList(set);
        }
        out
    }

    fn has_ui_number_property(&self, instance_id: &str) -> bool {
        let wide = to_wide(instance_id);
        unsafe {
            let mut guid: GUID = mem::zeroed();
            HidD_GetHidGuid(&mut guid);

            let set = SetupDiGetClassDevsW(
                &guid,
                wide.as_ptr(),
                ptr::null_mut(),
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            );
            if set == INVALID_HANDLE_VALUE {
                return false;
            }

            let mut devinfo: SP_DEVINFO_DATA = mem::zeroed();
            devinfo.cbSize = mem::size_of::<SP_DEVINFO_DATA>() as u32;

            let mut present = false;
            if SetupDiEnumDeviceInfo(set, 0, &mut devinfo) != 0 {
                let mut prop_type: DEVPROPTYPE = 0;
                let mut buffer = [0u8; 256];
                let mut required = 0u32;
                present = SetupDiGetDevicePropertyW(
                    set,
                    &devinfo,
                    &DEVPKEY_DEVICE_UI_NUMBER,
                    &mut prop_type,
                    buffer.as_mut_ptr(),
                    buffer.len() as u32,
                    &mut required,
                    0,
                ) != 0;
            }

            SetupDiDestroyDeviceInfoList(set);
            present
        }
    }

    fn open(&mut self, info: &HidInterfaceInfo) -> Option<Box<dyn HidDeviceIo>> {
        WinHidDevice::open(&info.device_path).map(|d| Box::new(d) as Box<dyn HidDeviceIo>)
    }

    fn read_product_string(&self, device_path: &str) -> Option<String> {
        let wide = to_wide(device_path);
        unsafe {
            let handle = CreateFileW(
                wide.as_ptr(),
                GENERIC_READ,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                0,
                ptr::null_mut(),
            );
            if handle == INVALID_HANDLE_VALUE {
                return None;
            }
            let name = read_product(handle);
            CloseHandle(handle);
            name
        }
    }
}

unsafe fn read_product(handle: HANDLE) -> Option<String> {
    let mut buf = [0u16; 128];
    if HidD_GetProductString(
        handle,
        buf.as_mut_ptr() as *mut core::ffi::c_void,
        (buf.len() * 2) as u32,
    ) != 0
    {
        let name = wide_to_string(buf.as_ptr());
        if !name.is_empty() {
            return Some(name);
        }
    }
    None
}

/// One open HID interface with its preparsed descriptor data and overlapped
/// read state.
pub struct WinHidDevice {
    handle: HANDLE,
    event: HANDLE,
    overlapped: OVERLAPPED,
    buffer: [u8; INPUT_BUFFER_LEN],
    ppd: PHIDP_PREPARSED_DATA,
    caps: HIDP_CAPS,
    /// Distinct usage pages carrying input buttons.
    button_pages: Vec<u16>,
    values: Vec<ValueUsage>,
    product: Option<String>,
    pending: bool,
}

// The raw handles are only ever used from whichever thread currently holds
// the capture mutex; nothing here aliases Rust data across threads.
unsafe impl Send for WinHidDevice {}

impl Drop for WinHidDevice {
    fn drop(&mut self) {
        unsafe {
            if self.ppd != 0 {
                HidD_FreePreparsedData(self.ppd);
            }
            if !self.event.is_null() {
                CloseHandle(self.event);
            }
            if self.handle != INVALID_HANDLE_VALUE && !self.handle.is_null() {
                CloseHandle(self.handle);
            }
        }
    }
}

impl WinHidDevice {
    fn open(device_path: &str) -> Option<Self> {
        let wide = to_wide(device_path);
        unsafe {
            let handle = CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            );
            if handle == INVALID_HANDLE_VALUE {
                return None;
            }

            let mut ppd: PHIDP_PREPARSED_DATA = 0;
            if HidD_GetPreparsedData(handle, &mut ppd) == 0 || ppd == 0 {
                CloseHandle(handle);
                return None;
            }

            let mut caps = mem::MaybeUninit::<HIDP_CAPS>::uninit();
            if HidP_GetCaps(ppd, caps.as_mut_ptr()) != HIDP_STATUS_SUCCESS {
                HidD_FreePreparsedData(ppd);
                CloseHandle(handle);
                return None;
            }
            let caps = caps.assume_init();

            let mut attributes: HIDD_ATTRIBUTES = mem::zeroed();
            attributes.Size = mem::size_of::<HIDD_ATTRIBUTES>() as u32;
            if HidD_GetAttributes(handle, &mut attributes) != 0 {
                trace!(
                    "HID attributes: vid=0x{:04X} pid=0x{:04X} rev=0x{:04X}",
                    attributes.VendorID,
                    attributes.ProductID,
                    attributes.VersionNumber
                );
            }

            let button_pages = button_usage_pages(ppd, caps.NumberInputButtonCaps);
            let values = value_usages(ppd, caps.NumberInputValueCaps);
            let product = read_product(handle);

            let event = CreateEventW(ptr::null(), 1, 0, ptr::null());
            if event.is_null() {
                HidD_FreePreparsedData(ppd);
                CloseHandle(handle);
                return None;
            }
            let mut overlapped: OVERLAPPED = mem::zeroed();
            overlapped.hEvent = event;

            debug!(
                "Opened HID interface: {} (page=0x{:02X} usage=0x{:02X}, {} value caps)",
                product.as_deref().unwrap_or("(unnamed)"),
                caps.UsagePage,
                caps.Usage,
                values.len()
            );

            Some(Self {
                handle,
                event,
                overlapped,
                buffer: [0u8; INPUT_BUFFER_LEN],
                ppd,
                caps,
                button_pages,
                values,
                product,
                pending: false,
            })
        }
    }

    fn parse_report(&mut self, report_len: u32) -> HidReportState {
        let mut report = HidReportState::default();
        unsafe {
            for &page in &self.button_pages {
                let mut usages = [0u16; 128];
                let mut count = usages.len() as u32;
                let status = HidP_GetUsages(
                    HidP_Input,
                    page,
                    0,
                    usages.as_mut_ptr(),
                    &mut count,
                    self.ppd,
                    self.buffer.as_mut_ptr(),
                    report_len,
                );
                if status == HIDP_STATUS_SUCCESS {
                    for &usage in &usages[..count as usize] {
                        report.active_buttons.insert(usage);
                    }
                }
            }

            for value_usage in &self.values {
                let mut value = 0u32;
                let status = HidP_GetUsageValue(
                    HidP_Input,
                    value_usage.usage_page,
                    0,
                    value_usage.usage,
                    &mut value,
                    self.ppd,
                    self.buffer.as_mut_ptr(),
                    report_len,
                );
                if status == HIDP_STATUS_SUCCESS {
                    report.values.insert(value_usage.usage, value as i32);
                }
            }
        }
        report
    }
}

impl HidDeviceIo for WinHidDevice {
    fn product_name(&self) -> Option<String> {
        self.product.clone()
    }

    fn is_gamepad(&self) -> bool {
        // Generic Desktop page, Joystick or Gamepad top-level collection.
        self.caps.UsagePage == 0x01 && (self.caps.Usage == 0x04 || self.caps.Usage == 0x05)
    }

    fn axis_ranges(&self) -> BTreeMap<u16, HidAxisRange> {
        self.values
            .iter()
            .map(|v| (v.usage, v.range))
            .collect()
    }

    fn poll(&mut self) -> HidPoll {
        unsafe {
            if !self.pending {
                ResetEvent(self.event);
                let mut read = 0u32;
                let ok = ReadFile(
                    self.handle,
                    self.buffer.as_mut_ptr(),
                    INPUT_BUFFER_LEN as u32,
                    &mut read,
                    &mut self.overlapped,
                );
                if ok != 0 {
                    return HidPoll::Report(self.parse_report(read));
                }
                match GetLastError() {
                    ERROR_IO_PENDING => {
                        self.pending = true;
                        HidPoll::Pending
                    }
                    ERROR_DEVICE_NOT_CONNECTED => HidPoll::Disconnected(ERROR_DEVICE_NOT_CONNECTED),
                    other => HidPoll::Transient(other),
                }
            } else {
                let mut transferred = 0u32;
                let ok = GetOverlappedResult(self.handle, &self.overlapped, &mut transferred, 0);
                if ok != 0 {
                    self.pending = false;
                    if transferred > 0 {
                        return HidPoll::Report(self.parse_report(transferred));
                    }
                    // Empty completion; reissue next tick.
                    return HidPoll::Transient(0);
                }
                match GetLastError() {
                    ERROR_IO_INCOMPLETE => HidPoll::Pending,
                    code @ (ERROR_DEVICE_NOT_CONNECTED | ERROR_BAD_COMMAND) => {
                        self.pending = false;
                        HidPoll::Disconnected(code)
                    }
                    other => {
                        self.pending = false;
                        HidPoll::Transient(other)
                    }
                }
            }
        }
    }

    fn read_pending(&self) -> bool {
        self.pending
    }
}

/// Distinct usage pages among the input button caps.
unsafe fn button_usage_pages(ppd: PHIDP_PREPARSED_DATA, count: u16) -> Vec<u16> {
    if count == 0 {
        return Vec::new();
    }
    let mut caps: Vec<HIDP_BUTTON_CAPS> = vec![mem::zeroed(); count as usize];
    let mut len = count;
    if HidP_GetButtonCaps(HidP_Input, caps.as_mut_ptr(), &mut len, ppd) != HIDP_STATUS_SUCCESS {
        return Vec::new();
    }
    caps.truncate(len as usize);
    let mut pages: Vec<u16> = caps.iter().map(|c| c.UsagePage).collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Flatten the input value caps (expanding usage ranges) into per-usage
/// entries with their declared logical ranges.
unsafe fn value_usages(ppd: PHIDP_PREPARSED_DATA, count: u16) -> Vec<ValueUsage> {
    if count == 0 {
        return Vec::new();
    }
    let mut caps: Vec<HIDP_VALUE_CAPS> = vec![mem::zeroed(); count as usize];
    let mut len = count;
    if HidP_GetValueCaps(HidP_Input, caps.as_mut_ptr(), &mut len, ppd) != HIDP_STATUS_SUCCESS {
        return Vec::new();
    }
    caps.truncate(len as usize);

    let mut out = Vec::new();
    for cap in &caps {
        let range = HidAxisRange {
            logical_min: cap.LogicalMin,
            logical_max: cap.LogicalMax,
        };
        if cap.IsRange != 0 {
            let r = cap.Anonymous.Range;
            for usage in r.UsageMin..=r.UsageMax {
                out.push(ValueUsage {
                    usage_page: cap.UsagePage,
                    usage,
                    range,
                });
            }
        } else {
            out.push(ValueUsage {
                usage_page: cap.UsagePage,
                usage: cap.Anonymous.NotRange.Usage,
                range,
            });
        }
    }
    out
}
