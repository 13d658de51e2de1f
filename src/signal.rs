//! Console shutdown handling.
//!
//! Ctrl-C, console close, logoff and system shutdown all flip the shared
//! stop flag; the router observes it at the top of each tick and unwinds
//! through the normal cleanup path.

use std::sync::Arc;
use std::sync::OnceLock;

use crate::controls::SharedControls;

static CONTROLS: OnceLock<Arc<SharedControls>> = OnceLock::new();

/// Install the console control handler. Safe to call once; later calls are
/// no-ops.
pub fn install(controls: Arc<SharedControls>) {
    if CONTROLS.set(controls).is_err() {
        return;
    }
    #[cfg(windows)]
    unsafe {
        use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;
        SetConsoleCtrlHandler(Some(console_handler), 1);
    }
}

#[cfg(windows)]
unsafe extern "system" fn console_handler(ctrl_type: u32) -> windows_sys::Win32::Foundation::BOOL {
    use windows_sys::Win32::System::Console::{
        CTRL_CLOSE_EVENT, CTRL_C_EVENT, CTRL_LOGOFF_EVENT, CTRL_SHUTDOWN_EVENT,
    };
    match ctrl_type {
        CTRL_C_EVENT | CTRL_CLOSE_EVENT | CTRL_LOGOFF_EVENT | CTRL_SHUTDOWN_EVENT => {
            if let Some(controls) = CONTROLS.get() {
                controls.request_stop();
            }
            1
        }
        _ => 0,
    }
}
