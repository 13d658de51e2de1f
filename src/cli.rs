//! Command-line arguments.

use clap::Parser;

/// padbridge - route physical XInput/HID gamepads onto virtual targets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "padbridge.yaml")]
    pub config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enumerate devices once, print what was found, and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Record raw capture state to a CSV file while running
    #[arg(long)]
    pub input_log: bool,
}
