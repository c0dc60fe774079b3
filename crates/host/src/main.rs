//! usb-unconfigure
//!
//! Returns a USB device to the unconfigured state by tearing down its active
//! configuration and sending SET_CONFIGURATION(0).

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use common::{UsbBridge, create_usb_bridge, setup_logging};
use host::config::HostConfig;
use host::enumerate::enumerate_devices;
use host::{DeviceManager, spawn_usb_worker};
use protocol::{DeviceState, ResetError};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-unconfigure")]
#[command(
    author,
    version,
    about = "Return a USB device to the unconfigured (ATTACHED) state"
)]
#[command(long_about = "
Releases the active configuration of a USB device and sends the standard
SET_CONFIGURATION(0) request, leaving the device addressed but unconfigured.

EXAMPLES:
    # List devices and their configuration state
    usb-unconfigure --list-devices

    # Unconfigure the device on bus 1, address 7
    usb-unconfigure --device 1:7

    # Run with debug logging
    usb-unconfigure --device 1:7 --log-level debug

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usb-unconfigure/host.toml
    3. /etc/usb-unconfigure/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Device to unconfigure, as BUS:ADDRESS
    #[arg(short, long, value_name = "BUS:ADDR", value_parser = parse_location)]
    device: Option<(u8, u8)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn parse_location(s: &str) -> std::result::Result<(u8, u8), String> {
    let (bus, address) = s
        .split_once(':')
        .ok_or_else(|| format!("expected BUS:ADDRESS, got '{}'", s))?;
    let bus = bus
        .trim()
        .parse()
        .map_err(|_| format!("invalid bus number '{}'", bus))?;
    let address = address
        .trim()
        .parse()
        .map_err(|_| format!("invalid device address '{}'", address))?;
    Ok((bus, address))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        HostConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.host.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-unconfigure v{}", env!("CARGO_PKG_VERSION"));

    let filters = config.usb.device_filters()?;
    let context = rusb::Context::new().context("Failed to create USB context")?;
    let mut manager = DeviceManager::new();
    for device in enumerate_devices(&context, &filters, config.usb.control_timeout())
        .context("Failed to enumerate USB devices")?
    {
        manager.attach_device(device);
    }

    let (usb_bridge, worker) = create_usb_bridge();
    let usb_worker_handle =
        spawn_usb_worker(worker, manager).context("Failed to spawn USB worker thread")?;

    let result = match args.device {
        Some((bus, address)) if !args.list_devices => {
            reset_mode(usb_bridge.clone(), bus, address).await
        }
        _ => list_devices_mode(usb_bridge.clone()).await,
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = usb_bridge.shutdown().await {
        error!("Error shutting down USB worker: {:#}", e);
    }
    if let Err(e) = usb_worker_handle.join() {
        error!("USB worker thread panicked: {:?}", e);
    }

    result
}

/// List USB devices and exit
async fn list_devices_mode(usb_bridge: UsbBridge) -> Result<()> {
    let devices = usb_bridge
        .list_devices()
        .await
        .context("Failed to list devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in devices {
        println!(
            "  [{}] {:04x}:{:04x}  Bus {:03} Device {:03}",
            device.id.0, device.vendor_id, device.product_id, device.bus_number, device.device_address
        );
        match device.active_configuration {
            Some(value) => println!("      State: {:?} (configuration {})", device.state, value),
            None => println!("      State: {:?}", device.state),
        }
        println!("      Configurations: {:?}\n", device.configurations);
    }

    Ok(())
}

/// Unconfigure one device
async fn reset_mode(usb_bridge: UsbBridge, bus: u8, address: u8) -> Result<()> {
    let devices = usb_bridge
        .list_devices()
        .await
        .context("Failed to list devices")?;

    let device = devices
        .iter()
        .find(|d| d.bus_number == bus && d.device_address == address)
        .ok_or_else(|| anyhow!("No device at bus {} address {}", bus, address))?;

    if device.state != DeviceState::Configured {
        info!("Device {} is not configured; sending SET_CONFIGURATION(0) anyway", device.id);
    }

    let outcome = usb_bridge
        .reset_configuration(device.id)
        .await
        .context("USB worker did not answer")?;

    match outcome {
        Ok(()) => {
            println!("Bus {:03} Device {:03} unconfigured", bus, address);
            Ok(())
        }
        Err(ResetError::Transport { status }) => {
            bail!(
                "Device did not acknowledge SET_CONFIGURATION(0): {} (configuration already released on the host)",
                status
            )
        }
        Err(e) => Err(e).context("Configuration reset failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location("1:7"), Ok((1, 7)));
        assert_eq!(parse_location(" 3 : 12 "), Ok((3, 12)));
        assert!(parse_location("17").is_err());
        assert!(parse_location("1:300").is_err());
        assert!(parse_location("a:1").is_err());
    }

    #[test]
    fn test_args_parse_device() {
        let args = Args::try_parse_from(["usb-unconfigure", "--device", "2:5"]).unwrap();
        assert_eq!(args.device, Some((2, 5)));
        assert!(!args.list_devices);
    }
}
