use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::{Result, SerialError};

/// Leading byte of every command frame ('T')
pub const COMMAND_BYTE: u8 = 0x54;
/// Leading byte of a device error reply ('E')
pub const ERROR_COMMAND: u8 = 0x45;
/// Fixed reply meaning "command accepted"
pub const ACK_RESPONSE: [u8; 3] = [0x54, 0x06, 0x5A];

pub const FRAME_LENGTH: usize = 6;
pub const MIN_RESPONSE_LENGTH: usize = 3;

pub const MIN_ID_LOCATION: u16 = 1;
pub const MAX_ID_LOCATION: u16 = 50;
pub const MIN_BUTTON_CODE: u16 = 1;
pub const MAX_BUTTON_CODE: u16 = 7;
/// Upper id bound accepted by the bench encoder
pub const MAX_BENCH_ID: u16 = 2000;

/// Device error codes from the Bromic documentation
pub static ERROR_CODES: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (0x00, "Framing error"),
        (0x01, "Checksum error"),
        (0x02, "Wrong command error"),
        (0x03, "ID = 0 error"),
        (0x04, "ID > 2000 error"),
        (0x05, "Number of code to read/delete = 0 error"),
        (0x06, "Number of code to read > 16 or >128 error"),
        (0x07, "Number of code to read/delete > 2000 (out of range) error"),
        (0x08, "Serial code already stored error"),
        (0x09, "ID < 201 error"),
        (0x10, "Empty location transmission attempt error"),
        (0x11, "Value out of valid codes range memorization attempt error"),
    ])
});

/// An encoded command frame addressed to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BromicCommand {
    pub id_location: u16,
    pub button_code: u16,
    pub raw_bytes: Vec<u8>,
}

impl BromicCommand {
    pub fn hex(&self) -> String {
        hex::encode_upper(&self.raw_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseKind {
    Acknowledged,
    DeviceError { code: u8 },
    Unrecognized,
}

/// A classified reply from the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BromicResponse {
    pub kind: ResponseKind,
    pub message: String,
    pub raw_bytes: Vec<u8>,
}

impl BromicResponse {
    pub fn success(&self) -> bool {
        matches!(self.kind, ResponseKind::Acknowledged)
    }

    /// Code carried by an explicit device error reply
    pub fn error_code(&self) -> Option<u8> {
        match self.kind {
            ResponseKind::DeviceError { code } => Some(code),
            _ => None,
        }
    }

    /// Turn a rejection into `SerialError::Command` for callers that want `?`
    pub fn into_result(self) -> Result<BromicResponse> {
        if self.success() {
            Ok(self)
        } else {
            Err(SerialError::Command {
                code: self.error_code(),
                message: self.message,
            })
        }
    }
}

/// Bromic Smart Heat Link frame codec
pub struct BromicProtocol;

impl BromicProtocol {
    /// Low 8 bits of the byte sum
    pub fn calculate_checksum(data: &[u8]) -> u8 {
        data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
    }

    /// Encode a command for a paired target.
    ///
    /// Frame layout: `[0x54][id:2 BE][button:2 BE][checksum]`.
    pub fn encode_command(id_location: u16, button_code: u16) -> Result<BromicCommand> {
        if !(MIN_ID_LOCATION..=MAX_ID_LOCATION).contains(&id_location) {
            return Err(SerialError::ProtocolError(format!(
                "Invalid ID location: {}",
                id_location
            )));
        }
        if !(MIN_BUTTON_CODE..=MAX_BUTTON_CODE).contains(&button_code) {
            return Err(SerialError::ProtocolError(format!(
                "Invalid button code: {}",
                button_code
            )));
        }

        Ok(Self::build(id_location, button_code))
    }

    /// Encode with the generous bounds used on the bench: id 1-2000, any code
    pub fn encode_bench(id_location: u16, code: u16) -> Result<BromicCommand> {
        if !(MIN_ID_LOCATION..=MAX_BENCH_ID).contains(&id_location) {
            return Err(SerialError::ProtocolError(format!(
                "ID location out of bench range: {}",
                id_location
            )));
        }

        Ok(Self::build(id_location, code))
    }

    fn build(id_location: u16, button_code: u16) -> BromicCommand {
        let mut raw_bytes = Vec::with_capacity(FRAME_LENGTH);
        raw_bytes.push(COMMAND_BYTE);
        raw_bytes.extend_from_slice(&id_location.to_be_bytes());
        raw_bytes.extend_from_slice(&button_code.to_be_bytes());
        raw_bytes.push(Self::calculate_checksum(&raw_bytes));

        log::debug!(
            "Encoded command: ID={}, Button={} -> {}",
            id_location,
            button_code,
            hex::encode_upper(&raw_bytes)
        );

        BromicCommand {
            id_location,
            button_code,
            raw_bytes,
        }
    }

    /// Classify a reply from the device
    pub fn decode_response(data: &[u8]) -> Result<BromicResponse> {
        if data.is_empty() {
            return Err(SerialError::InvalidResponse("Empty response received".to_string()));
        }

        log::debug!("Decoding response: {}", hex::encode_upper(data));

        if data == ACK_RESPONSE {
            return Ok(BromicResponse {
                kind: ResponseKind::Acknowledged,
                message: "Command acknowledged".to_string(),
                raw_bytes: data.to_vec(),
            });
        }

        if data.len() >= MIN_RESPONSE_LENGTH && data[0] == ERROR_COMMAND {
            let code = data.get(1).copied().unwrap_or(0);
            let message = ERROR_CODES
                .get(&code)
                .map(|text| text.to_string())
                .unwrap_or_else(|| format!("Unknown error code: {:02X}", code));

            log::warn!("Device error: {} (code: {:02X})", message, code);

            return Ok(BromicResponse {
                kind: ResponseKind::DeviceError { code },
                message,
                raw_bytes: data.to_vec(),
            });
        }

        if data.len() < MIN_RESPONSE_LENGTH {
            return Err(SerialError::InvalidResponse(format!(
                "Response too short: {} bytes",
                data.len()
            )));
        }

        let (body, trailer) = data.split_at(data.len() - 1);
        let received = trailer[0];
        let calculated = Self::calculate_checksum(body);
        if received != calculated {
            return Err(SerialError::Checksum { received, calculated });
        }

        Ok(BromicResponse {
            kind: ResponseKind::Unrecognized,
            message: format!("Unknown response format: {}", hex::encode_upper(data)),
            raw_bytes: data.to_vec(),
        })
    }

    /// Check an externally supplied command frame
    pub fn validate_frame(data: &[u8]) -> bool {
        if data.len() < FRAME_LENGTH || data[0] != COMMAND_BYTE {
            return false;
        }

        let (body, trailer) = data.split_at(data.len() - 1);
        trailer[0] == Self::calculate_checksum(body)
    }

    /// Parse a typed hex command such as `"54 00 01 00 01 56"` or `"54:00:01:00:01:56"`.
    ///
    /// Returns `None` for anything that is not a complete, valid command frame.
    pub fn parse_hex_command(hex_string: &str) -> Option<BromicCommand> {
        let cleaned: String = hex_string
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let data = hex::decode(cleaned).ok()?;

        if data.len() != FRAME_LENGTH || data[0] != COMMAND_BYTE {
            return None;
        }
        if !Self::validate_frame(&data) {
            return None;
        }

        Some(BromicCommand {
            id_location: u16::from_be_bytes([data[1], data[2]]),
            button_code: u16::from_be_bytes([data[3], data[4]]),
            raw_bytes: data,
        })
    }

    /// Example frames for the first few targets, keyed by id then button
    pub fn command_examples() -> BTreeMap<u16, BTreeMap<u16, String>> {
        (1..=4)
            .map(|id| {
                let buttons = (MIN_BUTTON_CODE..=MAX_BUTTON_CODE)
                    .filter_map(|button| {
                        Self::encode_command(id, button)
                            .ok()
                            .map(|cmd| (button, cmd.hex()))
                    })
                    .collect();
                (id, buttons)
            })
            .collect()
    }
}
