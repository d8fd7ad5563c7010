//! Vehicle telemetry decoding
//!
//! Decodes the handful of stock frames worth watching while spoofing:
//! steering angle and vehicle speed. Fed from [`recv_frames`] output when
//! the operator wants to observe the bus, never required by the control
//! loop itself.
//!
//! [`recv_frames`]: crate::gateway::UsbGateway::recv_frames

use crate::frame::CanFrame;

/// Identifier of the steering angle sensor frame
pub const STEER_ANGLE_ID: u16 = 0x024;
/// Identifier of the speed frame
pub const SPEED_ID: u16 = 0x0B4;

/// Last observed vehicle state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarState {
    /// Steering angle in degrees, positive left
    pub angle: f32,
    /// Vehicle speed in km/h
    pub speed: f32,
}

impl CarState {
    /// Fresh state, everything zero
    pub fn new() -> Self {
        CarState::default()
    }

    /// Folds one received frame into the state
    ///
    /// The angle signal is a 12-bit two's complement value in 1.5 degree
    /// units, big-endian in bytes 0-1. Speed rides bytes 5-6 big-endian in
    /// hundredths of a km/h. Returns whether the frame carried either
    /// signal.
    pub fn update(&mut self, frame: &CanFrame) -> bool {
        match frame.id {
            STEER_ANGLE_ID => {
                let raw = ((frame.data[0] as u16) << 8) | frame.data[1] as u16;
                let raw = if raw & 0x0800 != 0 { raw | 0xF000 } else { raw };
                self.angle = (raw as i16) as f32 * 1.5;
                true
            }
            SPEED_ID => {
                let raw = ((frame.data[5] as u16) << 8) | frame.data[6] as u16;
                self.speed = raw as f32 / 100.0;
                true
            }
            _ => false,
        }
    }
}
