pub mod controller;
pub mod hub;
pub mod models;

pub use controller::{ControllerEntry, ControllerType};
pub use hub::{connection_observer, ConnectionObserver, DeviceHub};
pub use models::*;
