//! Device mapping profiles for HID pads.
//!
//! A profile maps a pad's button usages onto canonical button bits and picks
//! the axis handler for its report shape. Lookup is by product-name string;
//! pads without a profile fall back to the generic caps-driven mapping in
//! [`crate::translate`].

use std::collections::{BTreeMap, HashMap};

use super::canonical::buttons;

/// How a profiled pad's axis values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisHandler {
    /// 8-bit axes centered at 128, device Y grows downward (DualShock
    /// class: 0 = up, 255 = down).
    CenteredByte,
    /// Use the generic caps-driven normalization.
    Generic,
}

/// Mapping profile for one well-known pad model.
#[derive(Debug, Clone)]
pub struct HidMappingProfile {
    pub product_name: &'static str,
    /// Button usage -> canonical button bit.
    pub button_map: BTreeMap<u16, u16>,
    pub axis_handler: AxisHandler,
}

/// Product-name keyed profile table.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: HashMap<&'static str, HidMappingProfile>,
}

impl ProfileTable {
    /// The built-in table: DualShock 4 / DualSense class pads, which Sony
    /// reports under the product string "Wireless Controller".
    pub fn builtin() -> Self {
        let ds4 = HidMappingProfile {
            product_name: "Wireless Controller",
            button_map: BTreeMap::from([
                (1, buttons::X),  // Square
                (2, buttons::A),  // Cross
                (3, buttons::B),  // Circle
                (4, buttons::Y),  // Triangle
                (5, buttons::LEFT_SHOULDER),
                (6, buttons::RIGHT_SHOULDER),
                (9, buttons::BACK),   // Share
                (10, buttons::START), // Options
                (11, buttons::LEFT_THUMB),
                (12, buttons::RIGHT_THUMB),
            ]),
            axis_handler: AxisHandler::CenteredByte,
        };

        let mut profiles = HashMap::new();
        profiles.insert(ds4.product_name, ds4);
        Self { profiles }
    }

    pub fn get(&self, product_name: &str) -> Option<&HidMappingProfile> {
        self.profiles.get(product_name)
    }
}
