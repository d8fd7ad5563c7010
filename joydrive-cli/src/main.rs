//! Joydrive CLI Application
//!
//! Drives a Toyota RAV4 Hybrid's steering and acceleration from a joystick
//! while spoofing the CAN traffic of its forward camera and driving support
//! unit, through a comma.ai panda USB gateway. The joydrive-core library
//! does the frame generation; this binary adds:
//! - Argument parsing and mode selection
//! - The Linux joystick reader
//! - Gateway bring-up (safety mode, queue flush, firmware check)
//! - Interrupt handling and logging

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use joydrive_core::{ControlLoop, SafetyMode, SpoofMode, StopReason, UsbGateway, WireFormat};

mod joystick;

use joystick::Joystick;

/// Which units to emulate
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Forward camera traffic plus steering commands
    #[value(alias = "c")]
    Cam,
    /// Driving-support-unit traffic plus acceleration commands
    #[value(alias = "d")]
    Dsu,
    /// Both units at once
    #[value(alias = "cd")]
    Both,
}

impl From<Mode> for SpoofMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Cam => SpoofMode::Camera,
            Mode::Dsu => SpoofMode::Dsu,
            Mode::Both => SpoofMode::Both,
        }
    }
}

/// Record layout generation of the connected gateway
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    V1,
    V2,
}

impl From<FormatArg> for WireFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::V1 => WireFormat::V1,
            FormatArg::V2 => WireFormat::V2,
        }
    }
}

/// Joydrive - drive a RAV4 from a joystick through a panda CAN gateway
#[derive(Parser, Debug)]
#[command(name = "joydrive-cli")]
#[command(about = "Spoof camera/DSU CAN traffic and inject joystick commands", long_about = None)]
#[command(version)]
struct Args {
    /// Which units to emulate (aliases: c, d, cd)
    #[arg(value_enum)]
    mode: Mode,

    /// Joystick device to read
    #[arg(short, long, value_name = "DEVICE", default_value = "/dev/input/js0")]
    joystick: PathBuf,

    /// Wire format of the connected gateway generation
    #[arg(long, value_enum, value_name = "FORMAT", default_value = "v1")]
    wire_format: FormatArg,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Joydrive CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using core library v{}", joydrive_core::VERSION);

    let gateway =
        UsbGateway::open(args.wire_format.into()).context("Gateway startup failed")?;
    match gateway.firmware_version() {
        Ok(version) => log::info!("Gateway firmware: {version}"),
        Err(error) => log::warn!("Could not read the gateway firmware version: {error}"),
    }

    // Flush stale transmit queues before enabling output
    for bus in [0, 1] {
        gateway
            .clear_bus(bus)
            .with_context(|| format!("Bus {bus} clear failed"))?;
    }
    gateway
        .set_safety_mode(SafetyMode::AllOutput)
        .context("Safety mode change failed")?;

    let input = Joystick::open(&args.joystick)
        .with_context(|| format!("Could not open joystick {}", args.joystick.display()))?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("Could not install the interrupt handler")?;

    let mut control = ControlLoop::new(gateway, input, args.mode.into(), running)?;
    match control.run()? {
        StopReason::Interrupted => Ok(()),
        StopReason::TransportLost => bail!("Gateway link lost, stopped for safety"),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_aliases_parse() {
        let args = Args::try_parse_from(["joydrive-cli", "cd"]).unwrap();
        assert!(matches!(args.mode, Mode::Both));

        let args = Args::try_parse_from(["joydrive-cli", "cam"]).unwrap();
        assert!(matches!(args.mode, Mode::Cam));

        let args = Args::try_parse_from(["joydrive-cli", "d"]).unwrap();
        assert!(matches!(args.mode, Mode::Dsu));
    }

    #[test]
    fn test_missing_or_unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["joydrive-cli"]).is_err());
        assert!(Args::try_parse_from(["joydrive-cli", "x"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["joydrive-cli", "both"]).unwrap();
        assert_eq!(args.joystick, PathBuf::from("/dev/input/js0"));
        assert!(matches!(args.wire_format, FormatArg::V1));
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }
}
