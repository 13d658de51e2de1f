//! ViGEmBus-backed virtual bus.
//!
//! Wraps `vigem-client` targets behind the [`VirtualBus`] trait. The bus
//! client is shared by every target; notification threads are owned by the
//! crate and end when their target unplugs.

#![cfg(windows)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::translate::canonical::TargetProfile;
use super::bus::{RumbleCallback, VirtualBus, WireReport};

type SharedClient = Arc<vigem_client::Client>;

enum Target {
    Xbox(vigem_client::Xbox360Wired<SharedClient>),
    Ds4(vigem_client::DualShock4Wired<SharedClient>),
}

/// Connection to the ViGEmBus driver.
pub struct VigemBus {
    client: SharedClient,
    targets: HashMap<u64, Target>,
    next_handle: u64,
}

impl VigemBus {
    /// Connect to the bus driver. Fails when ViGEmBus is not installed.
    pub fn connect() -> Result<Self> {
        let client = vigem_client::Client::connect().context("ViGEmBus connect failed")?;
        Ok(Self {
            client: Arc::new(client),
            targets: HashMap::new(),
            next_handle: 0,
        })
    }
}

impl VirtualBus for VigemBus {
    fn create_target(&mut self, profile: TargetProfile) -> Result<u64> {
        let target = match profile {
            TargetProfile::XboxStyle => {
                let mut t = vigem_client::Xbox360Wired::new(
                    self.client.clone(),
                    vigem_client::TargetId::XBOX360_WIRED,
                );
                t.plugin().context("Xbox target plugin failed")?;
                t.wait_ready().context("Xbox target not ready")?;
                Target::Xbox(t)
            }
            TargetProfile::Ds4Style => {
                let mut t = vigem_client::DualShock4Wired::new(
                    self.client.clone(),
                    vigem_client::TargetId::DUALSHOCK4_WIRED,
                );
                t.plugin().context("DS4 target plugin failed")?;
                t.wait_ready().context("DS4 target not ready")?;
                Target::Ds4(t)
            }
        };

        self.next_handle += 1;
        self.targets.insert(self.next_handle, target);
        Ok(self.next_handle)
    }

    fn destroy_target(&mut self, handle: u64) -> Result<()> {
        let Some(target) = self.targets.remove(&handle) else {
            anyhow::bail!("no such target: {handle}");
        };
        match target {
            Target::Xbox(mut t) => t.unplug().context("Xbox target unplug failed")?,
            Target::Ds4(mut t) => t.unplug().context("DS4 target unplug failed")?,
        }
        Ok(())
    }

    fn submit(&mut self, handle: u64, report: &WireReport) -> Result<()> {
        let Some(target) = self.targets.get_mut(&handle) else {
            anyhow::bail!("no such target: {handle}");
        };
        match (target, report) {
            (Target::Xbox(t), WireReport::Xbox(r)) => {
                let gamepad = vigem_client::XGamepad {
                    buttons: vigem_client::XButtons(r.buttons),
                    left_trigger: r.left_trigger,
                    right_trigger: r.right_trigger,
                    thumb_lx: r.thumb_lx,
                    thumb_ly: r.thumb_ly,
                    thumb_rx: r.thumb_rx,
                    thumb_ry: r.thumb_ry,
                };
                t.update(&gamepad).context("Xbox report submit failed")
            }
            (Target::Ds4(t), WireReport::Ds4(r)) => {
                let report = vigem_client::DS4Report {
                    thumb_lx: r.thumb_lx,
                    thumb_ly: r.thumb_ly,
                    thumb_rx: r.thumb_rx,
                    thumb_ry: r.thumb_ry,
                    buttons: vigem_client::DS4Buttons(r.buttons),
                    trigger_l: r.trigger_l,
                    trigger_r: r.trigger_r,
                    ..Default::default()
                };
                t.update(&report).context("DS4 report submit failed")
            }
            _ => anyhow::bail!("report profile does not match target {handle}"),
        }
    }

    fn register_rumble(&mut self, handle: u64, callback: RumbleCallback) -> Result<()> {
        let Some(Target::Xbox(target)) = self.targets.get_mut(&handle) else {
            anyhow::bail!("rumble registration needs an Xbox-style target");
        };
        let notification = target
            .request_notification()
            .context("notification registration failed")?;
        notification.spawn_thread(move |_, data| {
            callback(data.large_motor, data.small_motor);
        });
        Ok(())
    }

    fn unregister_rumble(&mut self, _handle: u64) {
        // The notification thread ends with its target; unplug in
        // destroy_target is sufficient.
    }
}
