pub mod executor;
pub mod interface;
pub mod protocol;

use std::time::Duration;

pub use executor::{CommandExecutor, ExchangePolicy};
pub use interface::{PortOpener, SerialInterface, SerialPortIO, SystemPortOpener};
pub use protocol::{BromicCommand, BromicProtocol, BromicResponse, ResponseKind};

use serde::{Deserialize, Serialize};

/// Fixed line settings of the Smart Heat Link bridge (19200 8-N-1, no flow control)
#[derive(Debug, Clone, Copy)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,
    pub timeout: Duration,
}

pub const SERIAL_SETTINGS: SerialSettings = SerialSettings {
    baud_rate: 19200,
    data_bits: serialport::DataBits::Eight,
    parity: serialport::Parity::None,
    stop_bits: serialport::StopBits::One,
    flow_control: serialport::FlowControl::None,
    timeout: Duration::from_millis(1000),
};

/// Overall deadline for collecting a reply after a frame is written
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(1500);
/// Minimum spacing between two consecutive frames on one link
pub const INTER_FRAME_DELAY: Duration = Duration::from_millis(100);
pub const MAX_RETRIES: u32 = 3;
/// Linear backoff unit: attempt `n` sleeps `n * BACKOFF_STEP` before retrying
pub const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// An OS-visible serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub device: String,
    pub description: String,
    pub vendor: Option<VendorInfo>,
}

/// USB metadata reported for a port, when there is any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorInfo {
    pub vid_pid: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Failed to connect to {port}: {reason}")]
    ConnectionFailed { port: String, reason: String },

    #[error("Not connected to device")]
    NotConnected,

    #[error("Serial port error: {0}")]
    Port(String),

    #[error("Command timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Checksum mismatch: received {received:02X}, calculated {calculated:02X}")]
    Checksum { received: u8, calculated: u8 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Device rejected command: {message}")]
    Command { message: String, code: Option<u8> },

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

impl SerialError {
    /// Faults of the wire itself; only these are worth another attempt
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            SerialError::Port(_) | SerialError::Timeout(_) | SerialError::SerialportError(_)
        )
    }

    /// OS-level serial faults, as opposed to a reply that never came
    pub fn is_serial_fault(&self) -> bool {
        matches!(self, SerialError::Port(_) | SerialError::SerialportError(_))
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SerialError::ConnectionFailed { .. }
                | SerialError::NotConnected
                | SerialError::Port(_)
                | SerialError::SerialportError(_)
        )
    }

    pub fn is_invalid_response(&self) -> bool {
        matches!(self, SerialError::Checksum { .. } | SerialError::InvalidResponse(_))
    }

    pub fn is_protocol_error(&self) -> bool {
        matches!(self, SerialError::ProtocolError(_)) || self.is_invalid_response()
    }

    /// Map an I/O failure from the port, keeping timeouts distinguishable
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                SerialError::Timeout(err.to_string())
            }
            _ => SerialError::Port(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
