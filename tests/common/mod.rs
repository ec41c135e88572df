#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bromic_link_lib::serial::{PortOpener, Result, SerialError, SerialInterface, SerialPortIO};
use bromic_link_lib::HubSettings;

pub const ACK: [u8; 3] = [0x54, 0x06, 0x5A];

/// What the fake bridge does with the next frame written to it
#[derive(Debug, Clone)]
pub enum Reply {
    Bytes(Vec<u8>),
    Silence,
    Unplugged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Write(Vec<u8>),
    Read(Vec<u8>),
}

/// Shared view of everything the fake bridge saw
#[derive(Clone, Default)]
pub struct Recorder {
    script: Arc<Mutex<VecDeque<Reply>>>,
    events: Arc<Mutex<Vec<(Wire, Instant)>>>,
}

impl Recorder {
    pub fn scripted(replies: Vec<Reply>) -> Self {
        let recorder = Self::default();
        recorder.script.lock().unwrap().extend(replies);
        recorder
    }

    pub fn events(&self) -> Vec<Wire> {
        self.events.lock().unwrap().iter().map(|(w, _)| w.clone()).collect()
    }

    pub fn timed_events(&self) -> Vec<(Wire, Instant)> {
        self.events.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|w| match w {
                Wire::Write(bytes) => Some(bytes),
                Wire::Read(_) => None,
            })
            .collect()
    }
}

/// Answers each written frame with the next scripted reply, ACK once the script runs out
pub struct FakeBridge {
    recorder: Recorder,
    pending: Vec<u8>,
}

impl SerialPortIO for FakeBridge {
    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.pending.len() as u32)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        let read: Vec<u8> = self.pending.drain(..n).collect();
        self.recorder
            .events
            .lock()
            .unwrap()
            .push((Wire::Read(read), Instant::now()));
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.recorder
            .events
            .lock()
            .unwrap()
            .push((Wire::Write(data.to_vec()), Instant::now()));

        let reply = self
            .recorder
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Bytes(ACK.to_vec()));
        match reply {
            Reply::Bytes(bytes) => self.pending = bytes,
            Reply::Silence => {}
            Reply::Unplugged => return Err(SerialError::Port("device unplugged".into())),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens `FakeBridge`s sharing one recorder, or fails every open
pub struct FakeOpener {
    pub recorder: Recorder,
    pub fail: bool,
    pub opens: Arc<Mutex<u32>>,
}

impl FakeOpener {
    pub fn new(recorder: Recorder) -> Arc<Self> {
        Arc::new(Self {
            recorder,
            fail: false,
            opens: Arc::new(Mutex::new(0)),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            recorder: Recorder::default(),
            fail: true,
            opens: Arc::new(Mutex::new(0)),
        })
    }
}

#[async_trait::async_trait]
impl PortOpener for FakeOpener {
    async fn open(&self, port_name: &str) -> Result<SerialInterface> {
        *self.opens.lock().unwrap() += 1;
        if self.fail {
            return Err(SerialError::Port(format!("No such file or directory: {}", port_name)));
        }
        let bridge = FakeBridge {
            recorder: self.recorder.clone(),
            pending: Vec::new(),
        };
        SerialInterface::from_io(port_name, Box::new(bridge))
    }
}

/// Timings short enough for tests
pub fn fast_settings() -> HubSettings {
    HubSettings {
        max_retries: 3,
        response_timeout_ms: 50,
        inter_frame_delay_ms: 5,
        backoff_step_ms: 5,
    }
}
