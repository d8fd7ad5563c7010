//! Prints the outgoing frame batches of the first ticks, no hardware needed
//!
//! Useful for eyeballing the schedule, the counters and the checksum bytes
//! before going anywhere near a vehicle.
//!
//! Usage:
//!   cargo run --example dump_schedule [ticks] [cam|dsu|both]

use joydrive_core::{CommandState, FrameBatch, MessageScheduler, SpoofMode, UiStatus};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let ticks: u16 = match args.next() {
        Some(raw) => raw.parse()?,
        None => 10,
    };
    let mode = match args.next().as_deref() {
        None | Some("cam") => SpoofMode::Camera,
        Some("dsu") => SpoofMode::Dsu,
        Some("both") => SpoofMode::Both,
        Some(other) => anyhow::bail!("Unknown mode {other:?}, expected cam, dsu or both"),
    };

    let scheduler = MessageScheduler::new(mode)?;
    let mut state = CommandState::new();

    for _ in 0..ticks {
        let mut batch = FrameBatch::new();
        if scheduler.mode().camera_enabled() {
            batch.push(state.shape_steering(0));
        }
        if scheduler.mode().dsu_enabled() {
            if let Some(frame) = state.shape_acceleration(false, false, false) {
                batch.push(frame);
            }
        }
        scheduler.append_due(&mut batch, state.tick(), UiStatus::default(), false);

        println!("=== Tick {} ({} frames) ===", state.tick(), batch.len());
        print!("{batch}");
        state.advance_tick();
    }

    Ok(())
}
