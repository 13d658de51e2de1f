//! HID-masking filter driver client.
//!
//! Opaque binary protocol over the HidHide control device: blacklisted
//! devices become invisible to every process except those on the whitelist.
//! Absence of the driver is non-fatal; the client stays disconnected and all
//! operations report failure without side effects.
//!
//! List payloads are multistrings: a 32-bit count, then concatenated
//! NUL-terminated wide-char strings, then a trailing NUL. List mutation is
//! always read-modify-write over the full list so entries owned by other
//! processes survive.
//!
//! IOCTL numeric codes differ between installed driver generations, so the
//! code set is selectable at runtime; see [`IoctlVariant`].

use tracing::{debug, info, warn};

/// Well-known control-device name of the filter driver.
pub const DRIVER_DEVICE_NAME: &str = "\\\\.\\HidHide";

const FILE_DEVICE_UNKNOWN: u32 = 0x22;
const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;

/// Reply buffer for list reads.
const LIST_BUFFER_LEN: usize = 4096;

const fn ctl_code(device: u32, function: u32, method: u32, access: u32) -> u32 {
    (device << 16) | (access << 14) | (function << 2) | method
}

/// Which IOCTL code layout the installed driver speaks.
///
/// `V2` matches driver generation 1.2+ (whitelist at function 0x800,
/// blacklist at 0x802). `V1Legacy` matches older builds that put the
/// blacklist first. Selectable via the `hidhide_ioctl_variant` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoctlVariant {
    #[default]
    V2,
    V1Legacy,
}

/// The eight operation codes of one driver generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlCodes {
    pub get_whitelist: u32,
    pub set_whitelist: u32,
    pub get_blacklist: u32,
    pub set_blacklist: u32,
    pub get_active: u32,
    pub set_active: u32,
    pub get_inverse: u32,
    pub set_inverse: u32,
}

impl IoctlVariant {
    pub fn codes(self) -> IoctlCodes {
        let f = |function| ctl_code(FILE_DEVICE_UNKNOWN, function, METHOD_BUFFERED, FILE_ANY_ACCESS);
        match self {
            IoctlVariant::V2 => IoctlCodes {
                get_whitelist: f(0x800),
                set_whitelist: f(0x801),
                get_blacklist: f(0x802),
                set_blacklist: f(0x803),
                get_active: f(0x804),
                set_active: f(0x805),
                get_inverse: f(0x806),
                set_inverse: f(0x807),
            },
            IoctlVariant::V1Legacy => IoctlCodes {
                get_blacklist: f(0x800),
                set_blacklist: f(0x801),
                get_whitelist: f(0x802),
                set_whitelist: f(0x803),
                get_active: f(0x804),
                set_active: f(0x805),
                get_inverse: f(0x806),
                set_inverse: f(0x807),
            },
        }
    }

    /// Parse the config key value. Unknown strings fall back to `V2`.
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "v1" | "legacy" => IoctlVariant::V1Legacy,
            _ => IoctlVariant::V2,
        }
    }
}

/// Encode a list into a multistring payload.
pub fn encode_multistring(list: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + list.iter().map(|s| (s.len() + 1) * 2).sum::<usize>() + 2);
    out.extend_from_slice(&(list.len() as u32).to_le_bytes());
    for entry in list {
        for unit in entry.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// Decode a multistring payload. `None` when the buffer is malformed.
pub fn decode_multistring(payload: &[u8]) -> Option<Vec<String>> {
    if payload.len() < 4 {
        return None;
    }
    let count = u32::from_le_bytes(payload[..4].try_into().ok()?) as usize;
    let units: Vec<u16> = payload[4..]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mut out = Vec::with_capacity(count);
    let mut cursor = 0usize;
    for _ in 0..count {
        let start = cursor;
        while cursor < units.len() && units[cursor] != 0 {
            cursor += 1;
        }
        if cursor >= units.len() {
            return None;
        }
        out.push(String::from_utf16_lossy(&units[start..cursor]));
        cursor += 1;
    }
    Some(out)
}

/// Transport seam for the control-device IOCTLs, so client logic is
/// testable against a fake driver.
pub trait IoctlTransport: Send {
    /// Issue one synchronous IOCTL. Returns the reply bytes on success, the
    /// platform error code on failure.
    fn ioctl(&mut self, code: u32, input: &[u8], reply_capacity: usize) -> Result<Vec<u8>, u32>;
}

/// Filter driver client. All operations are synchronous and short.
pub struct HidHideClient {
    codes: IoctlCodes,
    transport: Option<Box<dyn IoctlTransport>>,
    read_error_logged: bool,
}

impl HidHideClient {
    /// Open the platform control device. A missing driver leaves the client
    /// disconnected, which every later operation treats as failure.
    pub fn connect(variant: IoctlVariant) -> Self {
        #[cfg(windows)]
        let transport = platform::DriverTransport::open();
        #[cfg(not(windows))]
        let transport: Option<Box<dyn IoctlTransport>> = None;

        if transport.is_some() {
            info!("Connected to HID filter driver ({variant:?} code set)");
        }
        Self {
            codes: variant.codes(),
            transport,
            read_error_logged: false,
        }
    }

    /// Client over an explicit transport.
    pub fn with_transport(variant: IoctlVariant, transport: Box<dyn IoctlTransport>) -> Self {
        Self {
            codes: variant.codes(),
            transport: Some(transport),
            read_error_logged: false,
        }
    }

    /// Client that never connects; every operation reports failure. Used
    /// when masking is disabled by configuration.
    pub fn disconnected(variant: IoctlVariant) -> Self {
        Self {
            codes: variant.codes(),
            transport: None,
            read_error_logged: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!("Disconnected from HID filter driver");
        }
    }

    pub fn get_blacklist(&mut self) -> Option<Vec<String>> {
        self.read_list(self.codes.get_blacklist)
    }

    pub fn set_blacklist(&mut self, list: &[String]) -> bool {
        self.write_list(self.codes.set_blacklist, list)
    }

    pub fn get_whitelist(&mut self) -> Option<Vec<String>> {
        self.read_list(self.codes.get_whitelist)
    }

    pub fn set_whitelist(&mut self, list: &[String]) -> bool {
        self.write_list(self.codes.set_whitelist, list)
    }

    pub fn get_active(&mut self) -> Option<bool> {
        self.read_flag(self.codes.get_active)
    }

    pub fn set_active(&mut self, active: bool) -> bool {
        self.write_flag(self.codes.set_active, active)
    }

    pub fn get_inverse(&mut self) -> Option<bool> {
        self.read_flag(self.codes.get_inverse)
    }

    pub fn set_inverse(&mut self, inverse: bool) -> bool {
        self.write_flag(self.codes.set_inverse, inverse)
    }

    /// Add one instance id to the blacklist, preserving every entry other
    /// processes put there. Idempotent.
    pub fn add_to_blacklist(&mut self, instance_id: &str) -> bool {
        let Some(mut list) = self.get_blacklist() else {
            return false;
        };
        if list.iter().any(|e| e == instance_id) {
            debug!("Already on filter blacklist: {instance_id}");
            return true;
        }
        list.push(instance_id.to_string());
        let ok = self.set_blacklist(&list);
        if ok {
            info!("Masked device: {instance_id}");
        } else {
            warn!("Failed to mask device: {instance_id}");
        }
        ok
    }

    /// Remove one instance id from the blacklist; read-modify-write
    /// symmetrically to `add_to_blacklist`. Absent ids succeed.
    pub fn remove_from_blacklist(&mut self, instance_id: &str) -> bool {
        let Some(mut list) = self.get_blacklist() else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e != instance_id);
        if list.len() == before {
            return true;
        }
        let ok = self.set_blacklist(&list);
        if ok {
            info!("Unmasked device: {instance_id}");
        }
        ok
    }

    /// Add one process image path to the whitelist. Idempotent.
    pub fn add_to_whitelist(&mut self, process_path: &str) -> bool {
        let Some(mut list) = self.get_whitelist() else {
            return false;
        };
        if list.iter().any(|e| e == process_path) {
            return true;
        }
        list.push(process_path.to_string());
        self.set_whitelist(&list)
    }

    fn read_list(&mut self, code: u32) -> Option<Vec<String>> {
        let transport = self.transport.as_mut()?;
        match transport.ioctl(code, &[], LIST_BUFFER_LEN) {
            Ok(reply) => decode_multistring(&reply),
            Err(error) => {
                if !self.read_error_logged {
                    self.read_error_logged = true;
                    warn!("Filter driver list read failed (error {error}); masking will not work");
                }
                None
            }
        }
    }

    fn write_list(&mut self, code: u32, list: &[String]) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let payload = encode_multistring(list);
        transport.ioctl(code, &payload, 0).is_ok()
    }

    fn read_flag(&mut self, code: u32) -> Option<bool> {
        let transport = self.transport.as_mut()?;
        let reply = transport.ioctl(code, &[], 4).ok()?;
        if reply.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes(reply[..4].try_into().ok()?) != 0)
    }

    fn write_flag(&mut self, code: u32, value: bool) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let payload = u32::from(value).to_le_bytes();
        transport.ioctl(code, &payload, 0).is_ok()
    }
}

#[cfg(windows)]
mod platform {
    use super::{DRIVER_DEVICE_NAME, IoctlTransport};
    use std::ptr;
    use tracing::warn;
    use windows_sys::Win32::Foundation::{
        CloseHandle, GetLastError, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, GENERIC_READ,
        GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
    };
    use windows_sys::Win32::Storage::FileSystem::{
        CreateFileW, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
    };
    use windows_sys::Win32::System::IO::DeviceIoControl;

    pub struct DriverTransport {
        handle: HANDLE,
    }

    unsafe impl Send for DriverTransport {}

    impl DriverTransport {
        pub fn open() -> Option<Box<dyn IoctlTransport>> {
            let wide: Vec<u16> = DRIVER_DEVICE_NAME
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();
            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    ptr::null(),
                    OPEN_EXISTING,
                    0,
                    ptr::null_mut(),
                )
            };
            if handle == INVALID_HANDLE_VALUE {
                match unsafe { GetLastError() } {
                    ERROR_FILE_NOT_FOUND => {
                        warn!("HID filter driver not found; is it installed?");
                    }
                    ERROR_ACCESS_DENIED => {
                        warn!("Access denied to HID filter driver; run as administrator");
                    }
                    other => {
                        warn!("Could not connect to HID filter driver (error {other})");
                    }
                }
                return None;
            }
            Some(Box::new(Self { handle }))
        }
    }

    impl Drop for DriverTransport {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }

    impl IoctlTransport for DriverTransport {
        fn ioctl(
            &mut self,
            code: u32,
            input: &[u8],
            reply_capacity: usize,
        ) -> Result<Vec<u8>, u32> {
            let mut reply = vec![0u8; reply_capacity];
            let mut returned = 0u32;
            let ok = unsafe {
                DeviceIoControl(
                    self.handle,
                    code,
                    input.as_ptr() as *const core::ffi::c_void,
                    input.len() as u32,
                    reply.as_mut_ptr() as *mut core::ffi::c_void,
                    reply.len() as u32,
                    &mut returned,
                    ptr::null_mut(),
                )
            };
            if ok == 0 {
                return Err(unsafe { GetLastError() });
            }
            reply.truncate(returned as usize);
            Ok(reply)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Minimal in-memory driver speaking one code set.
    #[derive(Clone, Default)]
    struct FakeDriver {
        state: Arc<Mutex<FakeDriverState>>,
        variant: IoctlVariant,
    }

    #[derive(Default)]
    struct FakeDriverState {
        blacklist: Vec<String>,
        whitelist: Vec<String>,
        active: bool,
        inverse: bool,
    }

    impl IoctlTransport for FakeDriver {
        fn ioctl(&mut self, code: u32, input: &[u8], _cap: usize) -> Result<Vec<u8>, u32> {
            let codes = self.variant.codes();
            let mut state = self.state.lock();
            if code == codes.get_blacklist {
                Ok(encode_multistring(&state.blacklist))
            } else if code == codes.set_blacklist {
                state.blacklist = decode_multistring(input).ok_or(87u32)?;
                Ok(Vec::new())
            } else if code == codes.get_whitelist {
                Ok(encode_multistring(&state.whitelist))
            } else if code == codes.set_whitelist {
                state.whitelist = decode_multistring(input).ok_or(87u32)?;
                Ok(Vec::new())
            } else if code == codes.get_active {
                Ok(u32::from(state.active).to_le_bytes().to_vec())
            } else if code == codes.set_active {
                state.active = input.first().copied().unwrap_or(0) != 0;
                Ok(Vec::new())
            } else if code == codes.get_inverse {
                Ok(u32::from(state.inverse).to_le_bytes().to_vec())
            } else if code == codes.set_inverse {
                state.inverse = input.first().copied().unwrap_or(0) != 0;
                Ok(Vec::new())
            } else {
                Err(1u32) // unknown code
            }
        }
    }

    fn client_with_driver(variant: IoctlVariant) -> (HidHideClient, FakeDriver) {
        let driver = FakeDriver {
            variant,
            ..Default::default()
        };
        let client = HidHideClient::with_transport(variant, Box::new(driver.clone()));
        (client, driver)
    }

    #[test]
    fn test_multistring_round_trip() {
        let lists: [&[&str]; 3] = [
            &[],
            &["HID\\VID_054C&PID_05C4\\1&2&3"],
            &["a", "b", "longer entry with spaces"],
        ];
        for list in lists {
            let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
            let encoded = encode_multistring(&owned);
            assert_eq!(decode_multistring(&encoded), Some(owned));
        }
    }

    #[test]
    fn test_multistring_layout() {
        let encoded = encode_multistring(&["ab".to_string()]);
        // count=1, 'a', 'b', NUL, trailing NUL
        assert_eq!(
            encoded,
            vec![1, 0, 0, 0, b'a', 0, b'b', 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        assert_eq!(decode_multistring(&[1, 0]), None);
        // Claims one string but has no terminator.
        assert_eq!(decode_multistring(&[1, 0, 0, 0, b'a', 0]), None);
    }

    #[test]
    fn test_ioctl_code_values() {
        let v2 = IoctlVariant::V2.codes();
        assert_eq!(v2.get_whitelist, 0x0022_2000);
        assert_eq!(v2.set_blacklist, 0x0022_200C);
        assert_eq!(v2.set_inverse, 0x0022_201C);

        let v1 = IoctlVariant::V1Legacy.codes();
        assert_eq!(v1.get_blacklist, 0x0022_2000);
        assert_eq!(v1.get_active, v2.get_active);
    }

    #[test]
    fn test_variant_from_config() {
        assert_eq!(IoctlVariant::from_config("v2"), IoctlVariant::V2);
        assert_eq!(IoctlVariant::from_config("V1"), IoctlVariant::V1Legacy);
        assert_eq!(IoctlVariant::from_config("legacy"), IoctlVariant::V1Legacy);
        assert_eq!(IoctlVariant::from_config("garbage"), IoctlVariant::V2);
    }

    #[test]
    fn test_add_to_blacklist_is_idempotent() {
        let (mut client, driver) = client_with_driver(IoctlVariant::V2);
        assert!(client.add_to_blacklist("HID\\VID_1111\\1"));
        assert!(client.add_to_blacklist("HID\\VID_1111\\1"));
        assert_eq!(driver.state.lock().blacklist, vec!["HID\\VID_1111\\1"]);
    }

    #[test]
    fn test_blacklist_rmw_preserves_foreign_entries() {
        let (mut client, driver) = client_with_driver(IoctlVariant::V2);
        driver
            .state
            .lock()
            .blacklist
            .push("owned-by-other-process".to_string());

        assert!(client.add_to_blacklist("ours"));
        assert_eq!(
            driver.state.lock().blacklist,
            vec!["owned-by-other-process", "ours"]
        );

        assert!(client.remove_from_blacklist("ours"));
        assert_eq!(driver.state.lock().blacklist, vec!["owned-by-other-process"]);

        // Removing an absent id still succeeds.
        assert!(client.remove_from_blacklist("never-added"));
    }

    #[test]
    fn test_whitelist_add() {
        let (mut client, driver) = client_with_driver(IoctlVariant::V2);
        assert!(client.add_to_whitelist("C:\\padbridge.exe"));
        assert!(client.add_to_whitelist("C:\\padbridge.exe"));
        assert_eq!(driver.state.lock().whitelist, vec!["C:\\padbridge.exe"]);
    }

    #[test]
    fn test_active_and_inverse_round_trip() {
        let (mut client, _driver) = client_with_driver(IoctlVariant::V2);
        assert_eq!(client.get_active(), Some(false));
        assert!(client.set_active(true));
        assert_eq!(client.get_active(), Some(true));

        assert_eq!(client.get_inverse(), Some(false));
        assert!(client.set_inverse(true));
        assert_eq!(client.get_inverse(), Some(true));
    }

    #[test]
    fn test_legacy_variant_against_legacy_driver() {
        let (mut client, driver) = client_with_driver(IoctlVariant::V1Legacy);
        assert!(client.add_to_blacklist("pad"));
        assert_eq!(driver.state.lock().blacklist, vec!["pad"]);
    }

    #[test]
    fn test_disconnected_client_noops() {
        let mut client = HidHideClient::disconnected(IoctlVariant::V2);
        assert!(!client.is_connected());
        assert_eq!(client.get_blacklist(), None);
        assert!(!client.set_blacklist(&[]));
        assert!(!client.add_to_blacklist("x"));
        assert_eq!(client.get_active(), None);
        assert!(!client.set_active(true));
    }
}
