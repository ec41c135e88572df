pub mod serial;
pub mod device;
pub mod config;

pub use config::{HubOptions, HubSettings};
pub use device::{ConnectionState, DeviceHub, HubStatistics};
pub use serial::{BromicCommand, BromicProtocol, BromicResponse, SerialError};
