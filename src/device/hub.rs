use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::controller::command_for;
use super::{ConnectionState, HubStatistics};
use crate::config::HubSettings;
use crate::serial::{
    BromicCommand, BromicProtocol, BromicResponse, CommandExecutor, PortInfo, PortOpener, Result,
    SerialError, SerialInterface, SystemPortOpener,
};

/// Called with the new connectivity on every connect/disconnect transition
pub type ConnectionObserver = Arc<dyn Fn(bool) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a `ConnectionObserver`
pub fn connection_observer<F>(f: F) -> ConnectionObserver
where
    F: Fn(bool) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Harmless command used to check that the bridge still answers
const PROBE_ID: u16 = 1;
const PROBE_BUTTON: u16 = 1;

pub const LEARN_ATTEMPTS: u32 = 3;
pub const LEARN_SPACING: Duration = Duration::from_millis(800);

/// Connection hub for one Smart Heat Link bridge.
/// Owns the serial link, its statistics and the connectivity observers.
pub struct DeviceHub {
    port_name: String,
    settings: HubSettings,
    opener: Arc<dyn PortOpener>,
    executor: CommandExecutor,
    state: RwLock<ConnectionState>,
    lifecycle: Mutex<()>,
    statistics: RwLock<HubStatistics>,
    observers: RwLock<Vec<ConnectionObserver>>,
}

impl DeviceHub {
    pub fn new(port_name: &str, settings: HubSettings) -> Self {
        Self::with_opener(port_name, settings, Arc::new(SystemPortOpener))
    }

    pub fn with_opener(port_name: &str, settings: HubSettings, opener: Arc<dyn PortOpener>) -> Self {
        let executor = CommandExecutor::new(settings.exchange_policy());
        Self {
            port_name: port_name.to_string(),
            settings,
            opener,
            executor,
            state: RwLock::new(ConnectionState::Disconnected),
            lifecycle: Mutex::new(()),
            statistics: RwLock::new(HubStatistics::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await.is_connected()
    }

    /// Copy of the current counters
    pub async fn statistics(&self) -> HubStatistics {
        self.statistics.read().await.clone()
    }

    pub async fn add_connection_observer(&self, observer: ConnectionObserver) {
        self.observers.write().await.push(observer);
    }

    /// Remove a previously added observer. Returns false if it was not registered.
    pub async fn remove_connection_observer(&self, observer: &ConnectionObserver) -> bool {
        let mut observers = self.observers.write().await;
        match observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
            Some(pos) => {
                observers.remove(pos);
                true
            }
            None => false,
        }
    }

    async fn notify_connection_state(&self, connected: bool) {
        let observers = self.observers.read().await.clone();
        for observer in observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer(connected))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Error in connection observer: {:#}", e),
                Err(_) => log::error!("Connection observer panicked"),
            }
        }
    }

    /// Open the port. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected().await {
            return Ok(());
        }

        let opened = match self.opener.open(&self.port_name).await {
            Ok(interface) => self.executor.attach(interface).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                self.statistics.write().await.last_success = Some(Utc::now());
                log::info!("Connected to Bromic device on {}", self.port_name);
                self.notify_connection_state(true).await;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                self.statistics.write().await.record_connection_error(e.to_string());
                log::error!("Failed to connect to {}: {}", self.port_name, e);
                self.notify_connection_state(false).await;
                Err(SerialError::ConnectionFailed {
                    port: self.port_name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Close the port. Never fails; close-time errors are only logged.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_connected().await {
            return;
        }

        self.executor.detach().await;
        *self.state.write().await = ConnectionState::Disconnected;
        log::info!("Disconnected from Bromic device on {}", self.port_name);
        self.notify_connection_state(false).await;
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.connect().await
    }

    /// Tear the link down after an OS-level fault outlived every retry
    async fn handle_link_lost(&self, error: &SerialError) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_connected().await {
            return;
        }

        log::warn!("Lost serial link on {}: {}", self.port_name, error);
        self.executor.detach().await;
        *self.state.write().await = ConnectionState::Disconnected;
        self.notify_connection_state(false).await;
    }

    /// Send a button press with the configured retry count
    pub async fn send(&self, id_location: u16, button_code: u16) -> Result<BromicResponse> {
        self.send_with_retries(id_location, button_code, self.settings.max_retries)
            .await
    }

    pub async fn send_with_retries(
        &self,
        id_location: u16,
        button_code: u16,
        retries: u32,
    ) -> Result<BromicResponse> {
        if !self.is_connected().await {
            return Err(SerialError::NotConnected);
        }

        let command = BromicProtocol::encode_command(id_location, button_code)?;
        self.send_command(&command, retries).await
    }

    /// Send an already encoded command, e.g. a parsed hex frame or a bench frame
    pub async fn send_command(&self, command: &BromicCommand, retries: u32) -> Result<BromicResponse> {
        if !self.is_connected().await {
            return Err(SerialError::NotConnected);
        }

        let result = self.executor.execute(command, retries).await;

        {
            let mut stats = self.statistics.write().await;
            match &result {
                Ok(response) if response.success() => {
                    stats.record_success();
                    log::debug!(
                        "Command successful: ID={}, Button={}",
                        command.id_location,
                        command.button_code
                    );
                }
                Ok(response) => stats.record_failure(response.message.clone()),
                Err(e) => stats.record_failure(e.to_string()),
            }
        }

        if let Err(e) = &result {
            if e.is_serial_fault() {
                self.handle_link_lost(e).await;
            }
        }

        result
    }

    /// Send a typed hex frame such as `"54 00 01 00 01 56"`
    pub async fn send_raw(&self, hex_command: &str) -> Result<BromicResponse> {
        let command = BromicProtocol::parse_hex_command(hex_command).ok_or_else(|| {
            SerialError::ProtocolError(format!("Invalid raw command format: {}", hex_command))
        })?;
        self.send_command(&command, self.settings.max_retries).await
    }

    /// Teach a receiver the given button. A device rejection is an error here.
    /// Codes outside the normal button range (dimmer Off) go out as bench frames.
    pub async fn learn_button(&self, id_location: u16, button_code: u16) -> Result<BromicResponse> {
        let command = command_for(id_location, button_code)?;
        let response = self
            .send_command(&command, self.settings.max_retries)
            .await?
            .into_result()?;
        log::info!(
            "Button learning successful: ID={}, Button={}",
            id_location,
            button_code
        );
        Ok(response)
    }

    /// Repeat the learn command so one copy lands inside the receiver's learn window.
    /// Every send must be acknowledged; the first failure aborts.
    pub async fn learn_button_with_retries(
        &self,
        id_location: u16,
        button_code: u16,
        attempts: u32,
        spacing: Duration,
    ) -> Result<BromicResponse> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            let response = self.learn_button(id_location, button_code).await?;
            if attempt >= attempts {
                return Ok(response);
            }
            attempt += 1;
            tokio::time::sleep(spacing).await;
        }
    }

    /// Whether the bridge still answers. A device rejection of the probe counts as working.
    pub async fn test_connection(&self) -> bool {
        if !self.is_connected().await {
            return false;
        }

        match self.send_with_retries(PROBE_ID, PROBE_BUTTON, 1).await {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Connection test failed: {}", e);
                false
            }
        }
    }

    /// List serial ports without touching any open link
    pub async fn discover_ports() -> Result<Vec<PortInfo>> {
        tokio::task::spawn_blocking(SerialInterface::discover_ports)
            .await
            .map_err(|e| SerialError::Port(format!("Port discovery failed: {}", e)))?
    }

    pub async fn test_port(port_name: &str) -> bool {
        let port_name = port_name.to_string();
        tokio::task::spawn_blocking(move || SerialInterface::test_port(&port_name))
            .await
            .unwrap_or(false)
    }
}
