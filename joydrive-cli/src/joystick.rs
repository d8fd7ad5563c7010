//! Linux joystick device reader
//!
//! Reads the kernel joystick interface (/dev/input/jsN) in non-blocking
//! mode and folds its 8-byte event records into an [`InputSnapshot`]. One
//! poll drains everything the kernel has buffered, so the control loop
//! always sees the newest stick position.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};

use joydrive_core::input::{InputSnapshot, InputSource, AXIS_CHANNELS, BUTTON_COUNT};

/// Size of one kernel joystick event record
const EVENT_SIZE: usize = 8;

// Event type codes of the kernel joystick interface
const EVENT_BUTTON: u8 = 0x01;
const EVENT_AXIS: u8 = 0x02;

/// An open joystick device plus the state accumulated from its events
pub struct Joystick {
    device: File,
    snapshot: InputSnapshot,
}

impl Joystick {
    /// Opens the device in non-blocking mode
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        info!("Joystick connected at {}", path.display());
        Ok(Joystick {
            device,
            snapshot: InputSnapshot::neutral(),
        })
    }
}

/// Folds one raw event record into the snapshot
///
/// Record layout: 4 bytes event time, little-endian signed 16-bit value,
/// type byte, axis/button number. Axes pair up two per channel, even
/// numbers horizontal and odd vertical. Out-of-range numbers and the
/// init-flagged replay events sent right after open are dropped; the state
/// starts neutral regardless of where the stick rests.
fn apply_event(snapshot: &mut InputSnapshot, event: &[u8; EVENT_SIZE]) {
    let value = LittleEndian::read_i16(&event[4..6]);
    let kind = event[6];
    let number = event[7] as usize;

    match kind {
        EVENT_BUTTON if number < BUTTON_COUNT => {
            snapshot.buttons[number] = value != 0;
        }
        EVENT_AXIS => {
            let channel = number / 2;
            if channel < AXIS_CHANNELS {
                if number % 2 == 0 {
                    snapshot.axes[channel].x = value;
                } else {
                    snapshot.axes[channel].y = value;
                }
            }
        }
        _ => {}
    }
}

impl InputSource for Joystick {
    fn poll(&mut self) -> io::Result<()> {
        let mut event = [0u8; EVENT_SIZE];
        loop {
            match self.device.read(&mut event) {
                // The kernel never returns 0 for a live joystick
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "joystick disconnected",
                    ));
                }
                Ok(EVENT_SIZE) => apply_event(&mut self.snapshot, &event),
                Ok(read) => debug!("Dropping a truncated {read}-byte joystick event"),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    fn snapshot(&self) -> InputSnapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(value: i16, kind: u8, number: u8) -> [u8; EVENT_SIZE] {
        let mut record = [0u8; EVENT_SIZE];
        LittleEndian::write_i16(&mut record[4..6], value);
        record[6] = kind;
        record[7] = number;
        record
    }

    #[test]
    fn test_axis_events_pair_into_channels() {
        let mut snapshot = InputSnapshot::neutral();
        apply_event(&mut snapshot, &event(12000, EVENT_AXIS, 0));
        apply_event(&mut snapshot, &event(-500, EVENT_AXIS, 1));
        apply_event(&mut snapshot, &event(777, EVENT_AXIS, 2));

        assert_eq!(snapshot.axes[0].x, 12000);
        assert_eq!(snapshot.axes[0].y, -500);
        assert_eq!(snapshot.axes[1].x, 777);
    }

    #[test]
    fn test_button_events_toggle_state() {
        let mut snapshot = InputSnapshot::neutral();
        apply_event(&mut snapshot, &event(1, EVENT_BUTTON, 1));
        assert!(snapshot.brake_held());

        apply_event(&mut snapshot, &event(0, EVENT_BUTTON, 1));
        assert!(!snapshot.brake_held());
    }

    #[test]
    fn test_init_events_are_dropped() {
        let mut snapshot = InputSnapshot::neutral();
        apply_event(&mut snapshot, &event(9999, EVENT_AXIS | 0x80, 0));
        apply_event(&mut snapshot, &event(1, EVENT_BUTTON | 0x80, 0));

        assert_eq!(snapshot, InputSnapshot::neutral());
    }

    #[test]
    fn test_out_of_range_numbers_are_dropped() {
        let mut snapshot = InputSnapshot::neutral();
        apply_event(&mut snapshot, &event(1, EVENT_BUTTON, BUTTON_COUNT as u8));
        apply_event(&mut snapshot, &event(5000, EVENT_AXIS, 2 * AXIS_CHANNELS as u8));

        assert_eq!(snapshot, InputSnapshot::neutral());
    }

    #[test]
    fn test_negative_full_deflection() {
        let mut snapshot = InputSnapshot::neutral();
        apply_event(&mut snapshot, &event(i16::MIN, EVENT_AXIS, 0));
        assert_eq!(snapshot.axes[0].x, i16::MIN);
        assert_eq!(snapshot.steer_target(), -3276);
    }
}
