//! XInput stack backend over `rusty_xinput`.

#![cfg(windows)]

use anyhow::{anyhow, Result};
use rusty_xinput::{XInputHandle, XInputUsageError};

use super::backend::{StackError, XInputPoll, XInputStack};

/// The real slotted input stack, loaded from the system XInput DLL.
pub struct WinXInputStack {
    handle: XInputHandle,
}

impl WinXInputStack {
    /// Load the system XInput library. Failure here is fatal at startup;
    /// nothing else in the capture layer can work without the stack.
    pub fn load() -> Result<Self> {
        let handle = XInputHandle::load_default()
            .map_err(|e| anyhow!("XInput stack unavailable: {e:?}"))?;
        Ok(Self { handle })
    }
}

fn map_error(err: XInputUsageError) -> StackError {
    match err {
        XInputUsageError::DeviceNotConnected => StackError::NotConnected,
        XInputUsageError::UnknownError(code) => StackError::Other(code),
        other => {
            tracing::debug!("Unexpected XInput usage error: {other:?}");
            StackError::Other(0)
        }
    }
}

impl XInputStack for WinXInputStack {
    fn get_state(&self, slot: u32) -> Result<XInputPoll, StackError> {
        let state = self.handle.get_state(slot).map_err(map_error)?;
        let pad = &state.raw.Gamepad;
        Ok(XInputPoll {
            packet_number: state.raw.dwPacketNumber,
            buttons: pad.wButtons,
            left_trigger: pad.bLeftTrigger,
            right_trigger: pad.bRightTrigger,
            thumb_lx: pad.sThumbLX,
            thumb_ly: pad.sThumbLY,
            thumb_rx: pad.sThumbRX,
            thumb_ry: pad.sThumbRY,
        })
    }

    fn set_vibration(&self, slot: u32, left: u16, right: u16) -> Result<(), StackError> {
        self.handle.set_state(slot, left, right).map_err(map_error)
    }
}
