//! Process entry point: load configuration, bring the stacks up, run the
//! routing loop, save state back on the way out.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use padbridge::capture::InputCapture;
use padbridge::cli::Args;
use padbridge::config::AppConfig;
use padbridge::controls::SharedControls;
use padbridge::emulator::VirtualPadEmulator;
use padbridge::hidhide::{HidHideClient, IoctlVariant};
use padbridge::manager::DeviceManager;
use padbridge::router::Router;
use padbridge::signal;
use padbridge::timing::Clock;
use padbridge::translate::TranslationLayer;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = PathBuf::from(&args.config);
    let mut config = AppConfig::load(&config_path)?;

    init_logging(&args.log_level, config.save_logs_on_exit)?;
    info!("padbridge starting (config: {})", config_path.display());
    audit_environment();

    let clock = Clock::new();

    // Capture is the one fatal dependency; without it there is nothing to
    // route.
    let capture = Arc::new(InputCapture::platform(clock).context("input capture init failed")?);
    if args.input_log {
        capture.enable_input_logging(true);
    }

    if args.list_devices {
        return list_devices(&capture);
    }

    let emulator = Arc::new(VirtualPadEmulator::new(clock));
    if !emulator.initialize() {
        warn!("Virtual bus driver not available; running in input test mode");
        warn!("Install ViGEmBus to enable virtual targets");
    }

    let variant = IoctlVariant::from_config(&config.hidhide_ioctl_variant);
    let filter = if config.hidhide_enabled {
        let client = HidHideClient::connect(variant);
        if !client.is_connected() {
            warn!("HID filter driver not available; physical pads will stay visible");
        }
        client
    } else {
        HidHideClient::disconnected(variant)
    };

    let mut manager = DeviceManager::new(emulator.clone(), filter);
    if let Ok(exe) = std::env::current_exe() {
        manager.whitelist_self(&exe.to_string_lossy());
    }

    let controls = Arc::new(SharedControls::from_config(&config));
    signal::install(controls.clone());

    let translation = TranslationLayer::new(controls.translation_config());
    let mut router = Router::new(
        clock,
        capture,
        emulator,
        manager,
        translation,
        controls.clone(),
        config.polling_frequency,
    );

    info!("Initialization complete, routing");
    router.run();

    controls.write_back(&mut config);
    if let Err(e) = config.save(&config_path) {
        warn!("Could not save configuration: {e}");
    }

    info!("padbridge stopped");
    Ok(())
}

fn init_logging(level: &str, log_to_file: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let file_layer = if log_to_file {
        let name = format!(
            "padbridge_{}.log",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        );
        let file = std::fs::File::create(&name)
            .with_context(|| format!("failed to create log file {name}"))?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}

/// Log what kind of environment the process got; masking and the virtual
/// bus both need elevation.
fn audit_environment() {
    #[cfg(windows)]
    {
        let is_admin = unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() } != 0;
        info!("Administrator privileges: {}", if is_admin { "yes" } else { "no" });
        if !is_admin {
            warn!("Running without administrator privileges; some features may not work");
        }
    }
    #[cfg(not(windows))]
    info!("Non-Windows host: physical stacks unavailable, input test mode only");
}

fn list_devices(capture: &InputCapture) -> Result<()> {
    capture.refresh_devices();
    capture.update();
    let snapshots = capture.get();

    println!("Known controller slots:");
    for snap in &snapshots {
        let name = snap.product_name.as_deref().unwrap_or("(unnamed)");
        let kind = if snap.is_xinput() { "xinput" } else { "hid" };
        println!(
            "  [{kind} {}] {} connected={} instance={}",
            snap.slot_id,
            name,
            snap.connected,
            if snap.instance_id.is_empty() {
                "-"
            } else {
                &snap.instance_id
            }
        );
    }
    println!("{} slot(s) total", snapshots.len());
    Ok(())
}
