//! Joydrive Core Library
//!
//! Emulates the forward-camera and driving-support-unit CAN traffic of a
//! Toyota RAV4 Hybrid and shapes joystick input into steering and acceleration
//! commands, delivered to the vehicle buses through a comma.ai panda USB
//! gateway.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on command generation:
//! - Byte-exact periodic frame tables for the video, camera, DSU, UI and
//!   forward-collision-warning families
//! - Rate-limited steering and pedal command shaping with a cancel path
//! - Both generations of the gateway's 16-byte bulk wire format
//! - A 100 Hz control loop with cooperative shutdown and a consecutive-failure
//!   transport policy
//!
//! The library does NOT:
//! - Parse command-line arguments or print usage
//! - Read any physical input device (callers supply an [`input::InputSource`])
//! - Format console output beyond the diagnostic batch dump
//!
//! All operator-facing functionality is in the application layer (joydrive-cli).
//!
//! # Example Usage
//!
//! ```
//! use joydrive_core::{FrameBatch, MessageScheduler, SpoofMode, UiStatus};
//!
//! // Tables for the camera half of the spoof
//! let scheduler = MessageScheduler::new(SpoofMode::Camera)?;
//!
//! // Everything is due on tick 0: 19 video + 13 camera + UI + FCW
//! let mut batch = FrameBatch::new();
//! scheduler.append_due(&mut batch, 0, UiStatus::default(), false);
//! assert_eq!(batch.len(), 34);
//!
//! // Nothing is due on tick 1; commands are the shaper's job
//! let mut batch = FrameBatch::new();
//! scheduler.append_due(&mut batch, 1, UiStatus::default(), false);
//! assert!(batch.is_empty());
//! # Ok::<(), joydrive_core::ScheduleError>(())
//! ```

// Public modules
pub mod command;
pub mod control;
pub mod frame;
pub mod gateway;
pub mod input;
pub mod rav4;
pub mod schedule;
pub mod telemetry;

// Re-export main types for convenience
pub use command::CommandState;
pub use control::{ControlError, ControlLoop, StopReason};
pub use frame::{CanFrame, FrameBatch};
pub use gateway::{CanGateway, GatewayError, SafetyMode, UsbGateway, WireFormat};
pub use input::{InputSnapshot, InputSource};
pub use rav4::{MessageScheduler, SpoofMode, UiStatus};
pub use schedule::{MessageTable, PeriodicMessage, ScheduleError};
pub use telemetry::CarState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a neutral tick-0 batch in both-units mode
        let scheduler = MessageScheduler::new(SpoofMode::Both).unwrap();
        let mut batch = FrameBatch::new();
        scheduler.append_due(&mut batch, 0, UiStatus::default(), false);
        assert_eq!(batch.len(), 47);
        assert!(!VERSION.is_empty());
    }
}
