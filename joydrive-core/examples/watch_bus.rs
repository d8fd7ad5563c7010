//! Listen-only dump of live CAN traffic through the gateway
//!
//! Opens the gateway in silent mode and prints every received frame,
//! tracking steering angle and vehicle speed from the stock sensor frames.
//! Needs a connected gateway; never transmits a CAN frame.
//!
//! Usage:
//!   cargo run --example watch_bus

use joydrive_core::{CarState, SafetyMode, UsbGateway, WireFormat};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let gateway = UsbGateway::open(WireFormat::V1)?;
    println!("Gateway firmware: {}", gateway.firmware_version()?);

    // Stock Toyota buses run 500 kbit/s
    gateway.set_bus_speed(0, 500)?;
    gateway.set_safety_mode(SafetyMode::Silent)?;

    let mut car = CarState::new();
    loop {
        for frame in gateway.recv_frames()? {
            let known = car.update(&frame);
            println!("{frame}");
            if known {
                println!("  angle {:7.1} deg  speed {:6.2} km/h", car.angle, car.speed);
            }
        }
    }
}
