//! # Omnimeter Serial Transport
//!
//! Raw byte exchange with a meter over an RS-485 serial line.
//!
//! The line runs at 9600 baud, seven data bits, even parity and one stop bit.
//! Responses are collected with a polling loop rather than blocking reads:
//! the port is asked how many bytes are waiting, and the loop gives up after
//! `max_waits` empty polls. A response is complete when it is either the
//! single ACK byte or a full 255 byte frame.
//!
//! Nothing here retries. A short or empty response is handed back as is and
//! the caller decides what it means.

use crate::constants::{OMNI_ACK, OMNI_FRAME_LEN};
use crate::error::MeterError;
use crate::logging::SharedSink;
use crate::util::hex::{format_hex_compact, pretty_hex};
use log::Level;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;
use tokio_serial::{DataBits, Parity, SerialPort, StopBits};

/// Line settings. Only the baud rate is adjustable; framing is fixed at 7E1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// Timeout handed to the OS for a single read call.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: 9600,
            timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Timing of the response polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Empty polls allowed before giving up.
    pub max_waits: u32,
    /// Sleep after each empty poll.
    pub wait_sleep_ms: u64,
    /// Sleep after every write and after a completed response.
    pub force_wait_ms: u64,
    /// Settle time after the port is opened.
    pub init_wait_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            max_waits: 60,
            wait_sleep_ms: 50,
            force_wait_ms: 100,
            init_wait_ms: 200,
        }
    }
}

impl PollConfig {
    /// No sleeping at all. Used with in-memory transports.
    pub fn immediate() -> Self {
        PollConfig {
            max_waits: 1,
            wait_sleep_ms: 0,
            force_wait_ms: 0,
            init_wait_ms: 0,
        }
    }

    pub fn wait_sleep(&self) -> Duration {
        Duration::from_millis(self.wait_sleep_ms)
    }

    pub fn force_wait(&self) -> Duration {
        Duration::from_millis(self.force_wait_ms)
    }

    pub fn init_wait(&self) -> Duration {
        Duration::from_millis(self.init_wait_ms)
    }
}

/// Byte level access to a meter line.
///
/// Implemented by [`SerialTransport`] for real hardware and by
/// [`MockTransport`](crate::meter::serial_mock::MockTransport) in tests.
pub trait Transport: Send {
    /// Opens the line. Opening an already open line is a no-op.
    fn open(&mut self) -> Result<(), MeterError>;

    fn is_open(&self) -> bool;

    /// Writes `bytes`, then sleeps the forced post-write wait.
    fn send(&mut self, bytes: &[u8], context: &str) -> Result<(), MeterError>;

    /// Collects one response: a lone ACK, a full frame, or whatever arrived
    /// before the wait budget ran out (possibly nothing).
    fn poll_for_response(&mut self, context: &str) -> Result<Vec<u8>, MeterError>;

    fn close(&mut self);

    /// Port name, for diagnostics.
    fn name(&self) -> &str;
}

/// The byte stream under a [`SerialTransport`].
///
/// Real hardware is a `tokio_serial` port; tests can drive the poll loop with
/// a scripted stream instead.
pub trait LinePort: Read + Write + Send {
    /// Bytes waiting in the input buffer.
    fn bytes_to_read(&self) -> Result<u32, MeterError>;
}

impl LinePort for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> Result<u32, MeterError> {
        SerialPort::bytes_to_read(&**self).map_err(MeterError::from)
    }
}

/// True once a poll loop has seen a complete response.
pub fn response_complete(buf: &[u8]) -> bool {
    buf.len() >= OMNI_FRAME_LEN || buf == [OMNI_ACK]
}

/// A physical serial port.
pub struct SerialTransport {
    port_name: String,
    serial: SerialConfig,
    poll: PollConfig,
    port: Option<Box<dyn LinePort>>,
    sink: SharedSink,
}

impl SerialTransport {
    pub fn new(port_name: &str, serial: SerialConfig, poll: PollConfig, sink: SharedSink) -> Self {
        SerialTransport {
            port_name: port_name.to_string(),
            serial,
            poll,
            port: None,
            sink,
        }
    }

    /// Wraps a line that is already open. `open` is then a no-op.
    pub fn with_port(port_name: &str, port: Box<dyn LinePort>, poll: PollConfig, sink: SharedSink) -> Self {
        SerialTransport {
            port_name: port_name.to_string(),
            serial: SerialConfig::default(),
            poll,
            port: Some(port),
            sink,
        }
    }

    /// Replaces the poll timing, e.g. for slow radio bridges.
    pub fn set_poll_config(&mut self, poll: PollConfig) {
        self.poll = poll;
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn LinePort>, MeterError> {
        let name = &self.port_name;
        self.port
            .as_mut()
            .ok_or_else(|| MeterError::Transport(format!("port {name} is not open")))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), MeterError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = tokio_serial::new(&self.port_name, self.serial.baudrate)
            .data_bits(DataBits::Seven)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(self.serial.timeout())
            .open()
            .map_err(|e| {
                self.sink.log(Level::Error, "", &format!("Cannot open {}: {e}", self.port_name));
                MeterError::from(e)
            })?;
        self.sink.log(Level::Info, "", &format!("Port = {}", self.port_name));
        self.sink.log(Level::Info, "", &format!("Rate = {}", self.serial.baudrate));
        self.port = Some(Box::new(port));
        thread::sleep(self.poll.init_wait());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, bytes: &[u8], context: &str) -> Result<(), MeterError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let force_wait = self.poll.force_wait();
        let sink = self.sink.clone();
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        sink.log(Level::Debug, context, &format!("TX {}", format_hex_compact(bytes)));
        thread::sleep(force_wait);
        Ok(())
    }

    fn poll_for_response(&mut self, context: &str) -> Result<Vec<u8>, MeterError> {
        let poll = self.poll.clone();
        let sink = self.sink.clone();
        let port = self.port_mut()?;

        let mut response = Vec::with_capacity(OMNI_FRAME_LEN);
        let mut waits = 0;
        while waits < poll.max_waits {
            let available = port.bytes_to_read()? as usize;
            if available == 0 {
                waits += 1;
                thread::sleep(poll.wait_sleep());
                continue;
            }
            let want = available.min(OMNI_FRAME_LEN - response.len());
            let mut chunk = vec![0u8; want];
            let got = port.read(&mut chunk)?;
            response.extend_from_slice(&chunk[..got]);
            if response_complete(&response) {
                sink.log(Level::Debug, context, &format!("RX {} bytes\n{}", response.len(), pretty_hex(&response, 16)));
                thread::sleep(poll.force_wait());
                return Ok(response);
            }
        }

        sink.log(
            Level::Warn,
            context,
            &format!("No complete response after {} waits ({} bytes)", poll.max_waits, response.len()),
        );
        Ok(response)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            self.sink.log(Level::Info, "", &format!("Closed {}", self.port_name));
        }
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{MemorySink, NullSink};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_defaults() {
        let poll = PollConfig::default();
        assert_eq!(poll.max_waits, 60);
        assert_eq!(poll.wait_sleep(), Duration::from_millis(50));
        assert_eq!(poll.force_wait(), Duration::from_millis(100));
        assert_eq!(poll.init_wait(), Duration::from_millis(200));
        assert_eq!(SerialConfig::default().baudrate, 9600);
    }

    #[test]
    fn test_response_complete() {
        assert!(response_complete(&[0x06]));
        assert!(!response_complete(&[0x15]));
        assert!(!response_complete(&[0x06, 0x06]));
        assert!(response_complete(&[b'0'; 255]));
        assert!(!response_complete(&[]));
    }

    #[test]
    fn test_unopened_port_fails() {
        let mut t = SerialTransport::new("/dev/null-port", SerialConfig::default(), PollConfig::immediate(), Arc::new(NullSink));
        assert!(!t.is_open());
        assert!(matches!(t.send(b"x", "t"), Err(MeterError::Transport(_))));
        assert!(matches!(t.poll_for_response("t"), Err(MeterError::Transport(_))));
    }

    /// Input arrives in scripted chunks; each `bytes_to_read` call is one poll.
    struct ScriptedPort {
        chunks: VecDeque<Vec<u8>>,
        polls: Arc<AtomicUsize>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedPort {
        fn new(chunks: &[&[u8]]) -> Self {
            ScriptedPort {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                polls: Arc::new(AtomicUsize::new(0)),
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let Some(front) = self.chunks.front_mut() else {
                return Ok(0);
            };
            let n = buf.len().min(front.len());
            buf[..n].copy_from_slice(&front[..n]);
            front.drain(..n);
            if front.is_empty() {
                self.chunks.pop_front();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LinePort for ScriptedPort {
        fn bytes_to_read(&self) -> Result<u32, MeterError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chunks.front().map_or(0, |c| c.len() as u32))
        }
    }

    fn scripted(port: ScriptedPort, max_waits: u32) -> (SerialTransport, Arc<AtomicUsize>, MemorySink) {
        let polls = port.polls.clone();
        let sink = MemorySink::new();
        let poll = PollConfig {
            max_waits,
            ..PollConfig::immediate()
        };
        let transport = SerialTransport::with_port("scripted", Box::new(port), poll, Arc::new(sink.clone()));
        (transport, polls, sink)
    }

    #[test]
    fn test_silent_line_exhausts_wait_budget() {
        let (mut t, polls, sink) = scripted(ScriptedPort::new(&[]), 3);
        let response = t.poll_for_response("read").unwrap();
        assert!(response.is_empty());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert!(sink.contains("No complete response after 3 waits (0 bytes)"));
    }

    #[test]
    fn test_partial_frame_returned_after_budget() {
        let (mut t, polls, sink) = scripted(ScriptedPort::new(&[&[b'0'; 40]]), 2);
        let response = t.poll_for_response("read").unwrap();
        assert_eq!(response.len(), 40);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert!(sink.contains("(40 bytes)"));
    }

    #[test]
    fn test_frame_in_chunks_completes_early() {
        let port = ScriptedPort::new(&[&[b'1'; 100], &[b'2'; 155], &[b'3'; 10]]);
        let (mut t, polls, _) = scripted(port, 5);
        let response = t.poll_for_response("read").unwrap();
        assert_eq!(response.len(), OMNI_FRAME_LEN);
        assert_eq!(response[254], b'2');
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ack_completes_and_send_writes() {
        let port = ScriptedPort::new(&[&[OMNI_ACK]]);
        let written = port.written.clone();
        let (mut t, _, _) = scripted(port, 5);
        assert!(t.open().is_ok());
        t.send(b"\x01P1", "auth").unwrap();
        assert_eq!(t.poll_for_response("auth").unwrap(), vec![OMNI_ACK]);
        assert_eq!(*written.lock().unwrap(), b"\x01P1".to_vec());
    }

    #[test]
    fn test_poll_config_from_partial_json() {
        let poll: PollConfig = serde_json::from_str(r#"{"max_waits": 10}"#).unwrap();
        assert_eq!(poll.max_waits, 10);
        assert_eq!(poll.force_wait_ms, 100);
    }
}
