//! Physical/virtual device lifecycle reconciliation.
//!
//! Runs once per tick on the router thread, reading the capture snapshot
//! and holding only key-level references: instance ids into the filter
//! driver's mask sets and integer target ids into the emulator. Never a raw
//! OS handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::capture::snapshot::PhysicalSnapshot;
use crate::emulator::VirtualPadEmulator;
use crate::hidhide::HidHideClient;
use crate::translate::canonical::TargetProfile;

/// Settle time after a device is first masked, so the OS can propagate the
/// mask before a virtual twin appears.
const MASK_SETTLE: Duration = Duration::from_millis(100);

/// Per-tick lifecycle decisions passed in from the control surface.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileFlags {
    pub translation_enabled: bool,
    pub hidhide_enabled: bool,
    pub xinput_to_dinput: bool,
    pub dinput_to_xinput: bool,
}

/// The device manager. Owns the filter-driver client and the mask sets.
pub struct DeviceManager {
    emulator: Arc<VirtualPadEmulator>,
    filter: HidHideClient,
    /// Instance ids this process put on the filter blacklist.
    hidden: HashSet<String>,
    /// Instance ids masking was rejected for; suppresses retry spam.
    failed_to_hide: HashSet<String>,
    /// linked_user -> virtual target id, per profile.
    xbox_targets: HashMap<i32, u32>,
    ds4_targets: HashMap<i32, u32>,
}

impl DeviceManager {
    pub fn new(emulator: Arc<VirtualPadEmulator>, filter: HidHideClient) -> Self {
        Self {
            emulator,
            filter,
            hidden: HashSet::new(),
            failed_to_hide: HashSet::new(),
            xbox_targets: HashMap::new(),
            ds4_targets: HashMap::new(),
        }
    }

    pub fn filter_connected(&self) -> bool {
        self.filter.is_connected()
    }

    /// Register this process on the filter whitelist so it keeps seeing the
    /// pads it masks. Called once at startup.
    pub fn whitelist_self(&mut self, process_path: &str) {
        if self.filter.is_connected() && !process_path.is_empty() {
            self.filter.add_to_whitelist(process_path);
        }
    }

    /// Number of devices currently masked by this process.
    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// Reconcile one snapshot vector against the virtual-target maps.
    pub fn process(&mut self, snapshots: &[PhysicalSnapshot], flags: ReconcileFlags) {
        // Direction or translation turned off: retire the affected targets.
        if !flags.translation_enabled || !flags.xinput_to_dinput {
            self.destroy_profile_targets(TargetProfile::Ds4Style);
        }
        if !flags.translation_enabled || !flags.dinput_to_xinput {
            self.destroy_profile_targets(TargetProfile::XboxStyle);
        }

        for snap in snapshots {
            if snap.connected {
                self.reconcile_connected(snap, flags);
            } else {
                // Several HID pads share linked_user -1; only retire that
                // user's targets when no connected snapshot still claims it.
                let still_live = snapshots
                    .iter()
                    .any(|s| s.connected && s.slot_id == snap.slot_id);
                if !still_live {
                    self.destroy_user_targets(snap.slot_id);
                }
            }
        }
    }

    /// Unmask everything, disconnect the filter driver, destroy every
    /// target. Called on every exit path.
    pub fn cleanup(&mut self) {
        for instance_id in std::mem::take(&mut self.hidden) {
            self.filter.remove_from_blacklist(&instance_id);
        }
        self.failed_to_hide.clear();
        self.filter.disconnect();

        for (_, id) in self.xbox_targets.drain() {
            self.emulator.destroy_target(id);
        }
        for (_, id) in self.ds4_targets.drain() {
            self.emulator.destroy_target(id);
        }
    }

    fn reconcile_connected(&mut self, snap: &PhysicalSnapshot, flags: ReconcileFlags) {
        // Masking applies only to HID-stack pads (the XInput stack bypasses
        // the HID layer) and only while the pad is being bridged.
        let maskable = flags.hidhide_enabled
            && self.filter.is_connected()
            && snap.slot_id < 0
            && flags.dinput_to_xinput;
        if maskable
            && !snap.instance_id.is_empty()
            && !self.hidden.contains(&snap.instance_id)
            && !self.failed_to_hide.contains(&snap.instance_id)
        {
            if self.filter.add_to_blacklist(&snap.instance_id) {
                self.hidden.insert(snap.instance_id.clone());
                // Give the OS time to propagate the mask before the
                // virtual twin appears.
                std::thread::sleep(MASK_SETTLE);
            } else {
                self.failed_to_hide.insert(snap.instance_id.clone());
                debug!("Masking rejected for {}", snap.instance_id);
            }
        }

        if !flags.translation_enabled {
            return;
        }

        if snap.slot_id >= 0 && flags.xinput_to_dinput {
            self.ensure_target(snap, TargetProfile::Ds4Style);
        }
        if snap.slot_id < 0 && flags.dinput_to_xinput {
            self.ensure_target(snap, TargetProfile::XboxStyle);
        }
    }

    fn ensure_target(&mut self, snap: &PhysicalSnapshot, profile: TargetProfile) {
        let map = match profile {
            TargetProfile::XboxStyle => &self.xbox_targets,
            TargetProfile::Ds4Style => &self.ds4_targets,
        };
        if map.contains_key(&snap.slot_id) {
            return;
        }

        let source_name = snap.product_name.clone().unwrap_or_else(|| {
            if snap.slot_id >= 0 {
                format!("Xbox 360 Controller (User {})", snap.slot_id)
            } else {
                "HID Device".to_string()
            }
        });

        if let Some(id) = self
            .emulator
            .create_target(profile, snap.slot_id, &source_name)
        {
            info!("Bridged {source_name} (user {}) as {profile:?}", snap.slot_id);
            match profile {
                TargetProfile::XboxStyle => self.xbox_targets.insert(snap.slot_id, id),
                TargetProfile::Ds4Style => self.ds4_targets.insert(snap.slot_id, id),
            };
        }
    }

    fn destroy_user_targets(&mut self, linked_user: i32) {
        if let Some(id) = self.xbox_targets.remove(&linked_user) {
            self.emulator.destroy_target(id);
        }
        if let Some(id) = self.ds4_targets.remove(&linked_user) {
            self.emulator.destroy_target(id);
        }
    }

    fn destroy_profile_targets(&mut self, profile: TargetProfile) {
        let map = match profile {
            TargetProfile::XboxStyle => &mut self.xbox_targets,
            TargetProfile::Ds4Style => &mut self.ds4_targets,
        };
        for (_, id) in map.drain() {
            self.emulator.destroy_target(id);
        }
    }
}
