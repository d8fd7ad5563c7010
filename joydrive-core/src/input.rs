//! Operator input abstraction
//!
//! The control loop consumes input through [`InputSource`]: a non-blocking
//! poll plus a copyable snapshot of stick and button state. The concrete
//! device reader lives with the binary; tests substitute fixed snapshots.

use std::io;

/// Number of two-axis analog channels a snapshot carries
pub const AXIS_CHANNELS: usize = 3;
/// Number of buttons a snapshot carries
pub const BUTTON_COUNT: usize = 12;

/// Button driving the accelerator integrator
pub const BUTTON_ACCEL: usize = 0;
/// Button driving the decelerator integrator
pub const BUTTON_BRAKE: usize = 1;
/// Button requesting cruise-control disengage
pub const BUTTON_CANCEL: usize = 2;

/// Divisor scaling the raw stick range down to steering torque units
pub const STEER_AXIS_DIVISOR: i16 = 10;

/// One two-axis analog channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisPair {
    /// Horizontal deflection, full signed 16-bit range
    pub x: i16,
    /// Vertical deflection, full signed 16-bit range
    pub y: i16,
}

/// Stick and button state as of the last poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    /// Analog channels; channel 0 is the primary stick
    pub axes: [AxisPair; AXIS_CHANNELS],
    /// Button states, true while held
    pub buttons: [bool; BUTTON_COUNT],
}

impl InputSnapshot {
    /// Everything centered, nothing pressed
    pub fn neutral() -> Self {
        InputSnapshot::default()
    }

    /// Steering torque target derived from the primary stick
    pub fn steer_target(&self) -> i16 {
        self.axes[0].x / STEER_AXIS_DIVISOR
    }

    /// Whether the accelerator button is held
    pub fn accel_held(&self) -> bool {
        self.buttons[BUTTON_ACCEL]
    }

    /// Whether the brake button is held
    pub fn brake_held(&self) -> bool {
        self.buttons[BUTTON_BRAKE]
    }

    /// Whether the cancel button is held
    pub fn cancel_held(&self) -> bool {
        self.buttons[BUTTON_CANCEL]
    }
}

/// A polled, never-blocking source of operator input
pub trait InputSource {
    /// Drains pending device events into the snapshot
    ///
    /// Must return immediately whether or not new events arrived; "nothing
    /// pending" is success, not an error.
    fn poll(&mut self) -> io::Result<()>;

    /// The state as of the last [`poll`](InputSource::poll)
    fn snapshot(&self) -> InputSnapshot;
}
