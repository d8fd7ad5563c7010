//! Transport to the USB CAN gateway
//!
//! One bulk write per tick carries the whole frame batch, encoded in the
//! record layout of the connected hardware generation. Configuration rides
//! vendor control transfers. The loop owns the gateway exclusively; nothing
//! else holds the device.

use crate::frame::FrameBatch;

pub mod usb;
pub mod wire;

pub use usb::{SafetyMode, UsbGateway};
pub use wire::{WireFormat, BYTES_PER_FRAME};

/// Errors raised by the gateway transport
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No device with a matching vendor/product identifier on the bus
    #[error("No CAN gateway found on the USB bus")]
    DeviceNotFound,

    /// The device was found but refused a setup step
    #[error("Gateway configuration failed during {step}")]
    ConfigurationFailed {
        /// Which setup step was rejected
        step: &'static str,
        #[source]
        source: rusb::Error,
    },

    /// A bulk write transferred fewer bytes than the encoded batch
    #[error("Short bulk write: sent {sent} of {expected} bytes")]
    ShortWrite {
        /// Bytes the transfer reported as sent
        sent: usize,
        /// Size of the encoded batch
        expected: usize,
    },

    /// The underlying USB transfer failed outright
    #[error("USB transfer failed: {0}")]
    Transfer(#[from] rusb::Error),
}

/// A sink for per-tick frame batches
///
/// The control loop is written against this trait so tests can substitute a
/// recording or failing gateway for the hardware.
pub trait CanGateway {
    /// Encodes and transmits one batch
    ///
    /// A partial transfer is an error; the caller must treat it like any
    /// other transport failure.
    fn send_batch(&mut self, batch: &FrameBatch) -> Result<(), GatewayError>;
}
