//! USB access to the gateway hardware
//!
//! The gateway is a comma.ai panda-family device: configuration goes over
//! vendor control transfers, CAN traffic over a pair of bulk endpoints.
//! [`UsbGateway`] owns the claimed device handle for the process lifetime.

use std::time::Duration;

use log::{debug, info};
use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType};

use super::wire::WireFormat;
use super::{CanGateway, GatewayError};
use crate::frame::{CanFrame, FrameBatch};

/// USB vendor identifier of the gateway family
pub const GATEWAY_VENDOR_ID: u16 = 0xbbaa;
/// Product identifiers across gateway hardware revisions
pub const GATEWAY_PRODUCT_IDS: [u16; 2] = [0xddcc, 0xddee];

const BULK_OUT_ENDPOINT: u8 = 0x03;
const BULK_IN_ENDPOINT: u8 = 0x81;
const RECV_BUFFER_SIZE: usize = 0x1000;

// Vendor request codes understood by the firmware
const REQUEST_SAFETY_MODE: u8 = 0xdc;
const REQUEST_CAN_SPEED: u8 = 0xde;
const REQUEST_VERSION: u8 = 0xd6;
const REQUEST_CLEAR_BUS: u8 = 0xf1;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(100);

// Bounded so a wedged link surfaces as an error within a couple of ticks
// instead of stalling the loop indefinitely.
const TRANSFER_TIMEOUT: Duration = Duration::from_millis(20);

fn request_out() -> u8 {
    rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device)
}

fn request_in() -> u8 {
    rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device)
}

/// Transmit policy enforced by the gateway firmware
///
/// The firmware rejects every outgoing frame until a write-enabled mode has
/// been set, so one of these must be issued before the first batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMode {
    /// Listen only; every transmit is rejected
    Silent,
    /// Toyota message set with stock torque and acceleration limits
    Toyota,
    /// Toyota message set without the torque limiter
    ToyotaNoLimits,
    /// Every frame passes unchecked
    AllOutput,
}

impl SafetyMode {
    /// The numeric mode code the firmware expects
    pub fn code(self) -> u16 {
        match self {
            SafetyMode::Silent => 0x0000,
            SafetyMode::Toyota => 0x0002,
            SafetyMode::ToyotaNoLimits => 0x1336,
            SafetyMode::AllOutput => 0x1337,
        }
    }
}

/// The open, claimed gateway device
pub struct UsbGateway {
    handle: DeviceHandle<GlobalContext>,
    format: WireFormat,
}

impl UsbGateway {
    /// Finds the gateway on the USB bus, opens it and claims its interface
    ///
    /// The first device matching [`GATEWAY_VENDOR_ID`] and one of
    /// [`GATEWAY_PRODUCT_IDS`] wins. Every setup step is fatal on failure;
    /// a half-configured gateway must not reach the control loop.
    pub fn open(format: WireFormat) -> Result<Self, GatewayError> {
        let devices = rusb::devices().map_err(|source| GatewayError::ConfigurationFailed {
            step: "device enumeration",
            source,
        })?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(error) => {
                    debug!("Skipping a device with an unreadable descriptor: {error}");
                    continue;
                }
            };
            if descriptor.vendor_id() != GATEWAY_VENDOR_ID
                || !GATEWAY_PRODUCT_IDS.contains(&descriptor.product_id())
            {
                continue;
            }

            info!(
                "Opening gateway {:04x}:{:04x} on bus {} address {}",
                descriptor.vendor_id(),
                descriptor.product_id(),
                device.bus_number(),
                device.address()
            );

            let mut handle =
                device
                    .open()
                    .map_err(|source| GatewayError::ConfigurationFailed {
                        step: "device open",
                        source,
                    })?;
            handle
                .set_active_configuration(1)
                .map_err(|source| GatewayError::ConfigurationFailed {
                    step: "configuration select",
                    source,
                })?;
            handle
                .claim_interface(0)
                .map_err(|source| GatewayError::ConfigurationFailed {
                    step: "interface claim",
                    source,
                })?;

            return Ok(UsbGateway { handle, format });
        }

        Err(GatewayError::DeviceNotFound)
    }

    /// The record layout this gateway was opened with
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Reads the firmware version string
    pub fn firmware_version(&self) -> Result<String, GatewayError> {
        let mut buffer = [0u8; 0x40];
        let read = self.handle.read_control(
            request_in(),
            REQUEST_VERSION,
            0,
            0,
            &mut buffer,
            CONTROL_TIMEOUT,
        )?;
        Ok(String::from_utf8_lossy(&buffer[..read])
            .trim_end_matches('\0')
            .to_string())
    }

    /// Sets the firmware's transmit policy
    pub fn set_safety_mode(&self, mode: SafetyMode) -> Result<(), GatewayError> {
        debug!("Setting safety mode {:?} (0x{:04x})", mode, mode.code());
        self.handle.write_control(
            request_out(),
            REQUEST_SAFETY_MODE,
            mode.code(),
            0,
            &[],
            CONTROL_TIMEOUT,
        )?;
        Ok(())
    }

    /// Sets the bit rate of one CAN bus, in kbit/s
    pub fn set_bus_speed(&self, bus: u8, kbps: u16) -> Result<(), GatewayError> {
        debug!("Setting bus {bus} to {kbps} kbit/s");
        self.handle.write_control(
            request_out(),
            REQUEST_CAN_SPEED,
            bus as u16,
            kbps * 10,
            &[],
            CONTROL_TIMEOUT,
        )?;
        Ok(())
    }

    /// Flushes the transmit queue of one CAN bus
    pub fn clear_bus(&self, bus: u8) -> Result<(), GatewayError> {
        self.handle.write_control(
            request_out(),
            REQUEST_CLEAR_BUS,
            bus as u16,
            0,
            &[],
            CONTROL_TIMEOUT,
        )?;
        Ok(())
    }

    /// Reads whatever frames the gateway has buffered
    ///
    /// An empty read is normal on a quiet bus and comes back as an empty
    /// vector, not an error.
    pub fn recv_frames(&self) -> Result<Vec<CanFrame>, GatewayError> {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        match self
            .handle
            .read_bulk(BULK_IN_ENDPOINT, &mut buffer, TRANSFER_TIMEOUT)
        {
            Ok(read) => Ok(self.format.decode_frames(&buffer[..read])),
            Err(rusb::Error::Timeout) => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }
}

impl CanGateway for UsbGateway {
    fn send_batch(&mut self, batch: &FrameBatch) -> Result<(), GatewayError> {
        if batch.is_empty() {
            return Ok(());
        }

        let buffer = self.format.encode_batch(batch);
        let sent = self
            .handle
            .write_bulk(BULK_OUT_ENDPOINT, &buffer, TRANSFER_TIMEOUT)?;
        if sent != buffer.len() {
            return Err(GatewayError::ShortWrite {
                sent,
                expected: buffer.len(),
            });
        }
        Ok(())
    }
}

impl Drop for UsbGateway {
    fn drop(&mut self) {
        debug!("Releasing the gateway");
        if let Err(error) = self.handle.release_interface(0) {
            debug!("Interface release failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_mode_codes() {
        assert_eq!(SafetyMode::Silent.code(), 0x0000);
        assert_eq!(SafetyMode::Toyota.code(), 0x0002);
        assert_eq!(SafetyMode::ToyotaNoLimits.code(), 0x1336);
        assert_eq!(SafetyMode::AllOutput.code(), 0x1337);
    }

    #[test]
    fn test_vendor_request_types() {
        // bmRequestType bytes the firmware matches on
        assert_eq!(request_out(), 0x40);
        assert_eq!(request_in(), 0xC0);
    }
}
