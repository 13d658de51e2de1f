//! padbridge - a user-space controller input router.
//!
//! Physical gamepads are captured from two input stacks (the slotted
//! XInput-style stack and the generic HID stack), normalized into a
//! canonical state, cleaned (SOCD, debounce, radial deadzone), and bridged
//! onto virtual Xbox-360-style or DualShock-4-style targets. Rumble flows
//! back from the virtual target to the physical pad, and physical pads can
//! be masked from other processes through a HID filter driver.

pub mod capture;
pub mod cli;
pub mod config;
pub mod controls;
pub mod emulator;
pub mod hidhide;
pub mod manager;
pub mod router;
pub mod signal;
pub mod timing;
pub mod translate;
