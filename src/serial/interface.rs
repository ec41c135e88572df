use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use super::protocol::MIN_RESPONSE_LENGTH;
use super::{PortInfo, Result, SerialError, VendorInfo, SERIAL_SETTINGS};

/// Pause between polls of the receive buffer
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Blocking byte-level access to an open port
pub trait SerialPortIO: Send {
    /// Bytes already buffered by the driver
    fn bytes_to_read(&mut self) -> Result<u32>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Block until written bytes are queued for transmission
    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// `SerialPortIO` over a port opened through the `serialport` crate
struct SystemPort {
    port: Box<dyn SerialPort>,
}

impl SerialPortIO for SystemPort {
    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.port.read(buf).map_err(SerialError::from_io)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data).map_err(SerialError::from_io)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush().map_err(SerialError::from_io)
    }
}

/// One open link to a Smart Heat Link bridge
pub struct SerialInterface {
    port_name: String,
    io: Option<Box<dyn SerialPortIO>>,
}

impl SerialInterface {
    /// Open `port_name` with the fixed line settings
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, SERIAL_SETTINGS.baud_rate)
            .data_bits(SERIAL_SETTINGS.data_bits)
            .parity(SERIAL_SETTINGS.parity)
            .stop_bits(SERIAL_SETTINGS.stop_bits)
            .flow_control(SERIAL_SETTINGS.flow_control)
            .timeout(SERIAL_SETTINGS.timeout)
            .open()
            .map_err(|e| SerialError::Port(e.to_string()))?;

        log::info!("Opened serial port {}", port_name);
        Self::from_io(port_name, Box::new(SystemPort { port }))
    }

    /// Wrap an already open port. Bytes left over from before this session are discarded.
    pub fn from_io(port_name: &str, io: Box<dyn SerialPortIO>) -> Result<Self> {
        let mut interface = Self {
            port_name: port_name.to_string(),
            io: Some(io),
        };
        interface.drain_input()?;
        Ok(interface)
    }

    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    /// Close the port. Safe to call more than once; close failures are only logged.
    pub fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            match io.close() {
                Ok(()) => log::info!("Closed serial port {}", self.port_name),
                Err(e) => log::warn!("Error closing serial port {}: {}", self.port_name, e),
            }
        }
    }

    fn io_mut(&mut self) -> Result<&mut Box<dyn SerialPortIO>> {
        self.io.as_mut().ok_or(SerialError::NotConnected)
    }

    /// Throw away whatever the driver has buffered
    pub fn drain_input(&mut self) -> Result<usize> {
        let io = self.io_mut()?;
        let waiting = io.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(0);
        }

        let mut stale = vec![0u8; waiting];
        let n = io.read(&mut stale)?;
        log::debug!("Discarded stale input: {}", hex::encode_upper(&stale[..n]));
        Ok(n)
    }

    /// Write a whole frame and wait for it to be queued
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let io = self.io_mut()?;
        log::debug!("Sending: {}", hex::encode_upper(frame));
        io.write_all(frame)?;
        io.flush()
    }

    /// Collect a reply until at least three bytes arrived or `deadline` elapsed.
    ///
    /// Replies known to the device are three bytes long, so the first poll that brings the
    /// buffer to three bytes ends the read. Longer replies are cut at whatever that poll
    /// returned. A partial reply is returned as-is at the deadline; no bytes at all is a
    /// timeout.
    pub fn read_response(&mut self, deadline: Duration) -> Result<Vec<u8>> {
        let io = self.io_mut()?;
        let start = Instant::now();
        let mut response = Vec::new();

        while start.elapsed() < deadline {
            let waiting = io.bytes_to_read()? as usize;
            if waiting == 0 {
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            let mut chunk = vec![0u8; waiting];
            let n = io.read(&mut chunk)?;
            chunk.truncate(n);
            log::debug!("Received chunk: {}", hex::encode_upper(&chunk));
            response.extend_from_slice(&chunk);

            if response.len() >= MIN_RESPONSE_LENGTH {
                log::debug!("Complete response: {}", hex::encode_upper(&response));
                return Ok(response);
            }
        }

        if !response.is_empty() {
            log::debug!("Partial response: {}", hex::encode_upper(&response));
            return Ok(response);
        }

        Err(SerialError::Timeout("No response received from device".to_string()))
    }

    /// Enumerate OS-visible serial ports, sorted by device path
    pub fn discover_ports() -> Result<Vec<PortInfo>> {
        Ok(port_infos(serialport::available_ports()?))
    }

    /// Whether `port_name` can be opened with the fixed settings
    pub fn test_port(port_name: &str) -> bool {
        match Self::open(port_name) {
            Ok(mut interface) => {
                interface.close();
                true
            }
            Err(e) => {
                log::debug!("Port test failed for {}: {}", port_name, e);
                false
            }
        }
    }
}

/// Describe each port and order them by device path
fn port_infos(ports: Vec<SerialPortInfo>) -> Vec<PortInfo> {
    let mut infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|port| {
            let (description, vendor) = match port.port_type {
                SerialPortType::UsbPort(usb_info) => {
                    let description = usb_info
                        .product
                        .clone()
                        .unwrap_or_else(|| "USB serial device".to_string());
                    let vendor = VendorInfo {
                        vid_pid: format!("{:04X}:{:04X}", usb_info.vid, usb_info.pid),
                        manufacturer: usb_info.manufacturer,
                        product: usb_info.product,
                        serial_number: usb_info.serial_number,
                    };
                    (description, Some(vendor))
                }
                SerialPortType::PciPort => ("PCI serial port".to_string(), None),
                SerialPortType::BluetoothPort => ("Bluetooth serial port".to_string(), None),
                SerialPortType::Unknown => ("Unknown".to_string(), None),
            };

            PortInfo {
                device: port.port_name,
                description,
                vendor,
            }
        })
        .collect();

    infos.sort_by(|a, b| a.device.cmp(&b.device));
    infos
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens a `SerialInterface` for the hub
#[async_trait::async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self, port_name: &str) -> Result<SerialInterface>;
}

/// Opens real serial devices on the blocking pool
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

#[async_trait::async_trait]
impl PortOpener for SystemPortOpener {
    async fn open(&self, port_name: &str) -> Result<SerialInterface> {
        let port_name = port_name.to_string();
        tokio::task::spawn_blocking(move || SerialInterface::open(&port_name))
            .await
            .map_err(|e| SerialError::Port(format!("Serial worker failed: {}", e)))?
    }
}
