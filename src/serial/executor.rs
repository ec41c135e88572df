//! Single-writer command execution with inter-frame spacing and bounded retries.
//!
//! All blocking serial I/O runs on tokio's blocking pool. The link is guarded by one
//! mutex held for the whole write+read exchange, so two callers can never interleave
//! frames on the wire. Backoff sleeps happen outside the lock.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::protocol::{BromicCommand, BromicProtocol, BromicResponse};
use super::{Result, SerialError, SerialInterface, BACKOFF_STEP, COMMAND_TIMEOUT, INTER_FRAME_DELAY};

/// Timing of one exchange and of the retry loop around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePolicy {
    pub response_timeout: Duration,
    pub inter_frame_delay: Duration,
    pub backoff_step: Duration,
}

impl Default for ExchangePolicy {
    fn default() -> Self {
        Self {
            response_timeout: COMMAND_TIMEOUT,
            inter_frame_delay: INTER_FRAME_DELAY,
            backoff_step: BACKOFF_STEP,
        }
    }
}

struct Link {
    interface: Option<SerialInterface>,
    last_exchange: Option<Instant>,
}

impl Link {
    fn exchange(&mut self, command: &BromicCommand, policy: &ExchangePolicy) -> Result<BromicResponse> {
        let interface = self.interface.as_mut().ok_or(SerialError::NotConnected)?;

        if let Some(last) = self.last_exchange {
            let since = last.elapsed();
            if since < policy.inter_frame_delay {
                thread::sleep(policy.inter_frame_delay - since);
            }
        }

        let result = transact(interface, command, policy.response_timeout);
        self.last_exchange = Some(Instant::now());
        result
    }
}

fn transact(
    interface: &mut SerialInterface,
    command: &BromicCommand,
    response_timeout: Duration,
) -> Result<BromicResponse> {
    interface.drain_input()?;
    interface.write_frame(&command.raw_bytes)?;
    let data = interface.read_response(response_timeout)?;
    BromicProtocol::decode_response(&data)
}

/// Runs commands over the shared link, one exchange at a time
#[derive(Clone)]
pub struct CommandExecutor {
    link: Arc<Mutex<Link>>,
    policy: ExchangePolicy,
}

impl CommandExecutor {
    pub fn new(policy: ExchangePolicy) -> Self {
        Self {
            link: Arc::new(Mutex::new(Link {
                interface: None,
                last_exchange: None,
            })),
            policy,
        }
    }

    /// Run `f` with the link locked, off the async scheduler
    async fn with_link<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Link) -> R + Send + 'static,
        R: Send + 'static,
    {
        let link = self.link.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = link.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await
        .map_err(|e| SerialError::Port(format!("Serial worker failed: {}", e)))
    }

    /// Hand an open interface to the executor
    pub async fn attach(&self, interface: SerialInterface) -> Result<()> {
        self.with_link(move |link| {
            if let Some(mut previous) = link.interface.replace(interface) {
                previous.close();
            }
            link.last_exchange = None;
        })
        .await
    }

    /// Close and drop the interface, waiting for any exchange in flight
    pub async fn detach(&self) {
        let result = self
            .with_link(|link| {
                if let Some(mut interface) = link.interface.take() {
                    interface.close();
                }
            })
            .await;
        if let Err(e) = result {
            log::warn!("Error while closing link: {}", e);
        }
    }

    async fn exchange(&self, command: &BromicCommand) -> Result<BromicResponse> {
        let command = command.clone();
        let policy = self.policy.clone();
        self.with_link(move |link| link.exchange(&command, &policy)).await?
    }

    /// Send `command`, retrying transport faults up to `retries` more times.
    ///
    /// Any decoded reply ends the loop, including a device rejection. Decode failures
    /// and parameter errors are returned without another attempt.
    pub async fn execute(&self, command: &BromicCommand, retries: u32) -> Result<BromicResponse> {
        let attempts = retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.exchange(command).await {
                Ok(response) => {
                    log::debug!(
                        "Command ID={}, Button={} answered on attempt {}: {}",
                        command.id_location,
                        command.button_code,
                        attempt,
                        response.message
                    );
                    return Ok(response);
                }
                Err(e) if e.is_transport_fault() && attempt < attempts => {
                    log::warn!("Command failed (attempt {}/{}): {}", attempt, attempts, e);
                    tokio::time::sleep(self.policy.backoff_step.saturating_mul(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transport_fault() {
                        log::error!("Command failed after {} attempts: {}", attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
