//! Operator command shaping
//!
//! Turns joystick state into rate-limited steering and acceleration frames.
//! Raw input never reaches the bus directly: steering torque ramps toward
//! the stick position, pedal commands integrate while a button is held, and
//! everything is clamped to values the vehicle's own plausibility checks
//! will accept.

use crate::frame::CanFrame;
use crate::rav4;

/// Largest steering torque magnitude commanded in either direction
pub const STEER_TORQUE_MAX: i16 = 1500;
/// Largest per-tick change of the ramped steering torque
pub const STEER_RAMP_STEP: i16 = 30;
/// Per-tick accelerator integrator increment
pub const ACCEL_STEP: i16 = 10;
/// Accelerator integrator ceiling
pub const ACCEL_MAX: i16 = 1500;
/// Per-tick decelerator integrator decrement
pub const DECEL_STEP: i16 = 20;
/// Decelerator integrator floor
pub const DECEL_MIN: i16 = -3000;

/// Per-tick command state carried across the control loop's lifetime
///
/// Owned by the loop and mutated exactly once per tick. The tick counter
/// wraps at 2^16; every consumer derives its counters and cadences from the
/// wrapped value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandState {
    tick: u16,
    steer: i16,
    accel: i16,
    decel: i16,
    cancel: bool,
}

impl CommandState {
    /// Fresh state: tick 0, everything neutral
    pub fn new() -> Self {
        CommandState::default()
    }

    /// The current tick counter
    pub fn tick(&self) -> u16 {
        self.tick
    }

    /// The current ramped steering torque
    pub fn steer(&self) -> i16 {
        self.steer
    }

    /// The current accelerator integrator value
    pub fn accel(&self) -> i16 {
        self.accel
    }

    /// The current decelerator integrator value
    pub fn decel(&self) -> i16 {
        self.decel
    }

    /// Advances the tick counter, wrapping at 2^16
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    /// Ramps the steering torque toward `target` and builds the command frame
    ///
    /// `target` is the scaled stick deflection. It is clamped to
    /// [`STEER_TORQUE_MAX`], then the ramped value moves toward it by at most
    /// [`STEER_RAMP_STEP`] per tick. A centered stick zeroes the torque on
    /// the spot instead of ramping down.
    pub fn shape_steering(&mut self, target: i16) -> CanFrame {
        let target = target.clamp(-STEER_TORQUE_MAX, STEER_TORQUE_MAX);
        if target == 0 {
            self.steer = 0;
        } else if target > self.steer {
            self.steer = (self.steer + STEER_RAMP_STEP).min(target);
        } else if target < self.steer {
            self.steer = (self.steer - STEER_RAMP_STEP).max(target);
        }
        rav4::steer_command(self.tick, self.steer)
    }

    /// Integrates the pedal buttons and builds the acceleration frame when
    /// one is due
    ///
    /// The brake wins over the accelerator: while it is held the accelerator
    /// integrator is discarded and the decelerator integrator runs down
    /// toward [`DECEL_MIN`]. Releasing a pedal resets its integrator, so a
    /// re-press always starts from zero. The combined value is emitted on
    /// the frame cadence of [`rav4::accel_command`]; `cancel` forces an
    /// emission and sets the cruise disengage bit.
    pub fn shape_acceleration(
        &mut self,
        accel_held: bool,
        brake_held: bool,
        cancel: bool,
    ) -> Option<CanFrame> {
        if brake_held {
            self.accel = 0;
            self.decel = (self.decel - DECEL_STEP).max(DECEL_MIN);
        } else {
            self.decel = 0;
            self.accel = if accel_held {
                (self.accel + ACCEL_STEP).min(ACCEL_MAX)
            } else {
                0
            };
        }
        self.cancel = cancel;
        rav4::accel_command(self.tick, self.accel + self.decel, cancel)
    }
}
