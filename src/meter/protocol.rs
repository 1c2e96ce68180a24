//! # Omnimeter Command Protocol
//!
//! The read/write state machine shared by every meter variant.
//!
//! ```text
//! Idle -> ContextSet -> [PasswordAuth] -> FrameSent -> AwaitResponse
//!      -> Validated -> PostTerminate -> Idle
//! ```
//!
//! [`CommandProtocol`] owns the attached transport, the active context label
//! and the human readable result message of the last command. It performs the
//! individual exchanges (query, password, write, settings read, termination);
//! the meter variants chain them into complete commands.

use crate::constants::OMNI_FRAME_LEN;
use crate::error::MeterError;
use crate::logging::SharedSink;
use crate::meter::frame::{self, ReadCommand, WriteCommand};
use crate::meter::password::Password;
use crate::meter::transport::Transport;
use crate::util::hex::format_hex_compact;
use log::Level;

/// Represents the states of a command sequence.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolState {
    Idle,
    ContextSet,
    PasswordAuth,
    FrameSent,
    AwaitResponse,
    Validated,
    PostTerminate,
}

/// Exchange layer between a meter and its line.
pub struct CommandProtocol {
    transport: Option<Box<dyn Transport>>,
    sink: SharedSink,
    context: String,
    command_msg: String,
    state: ProtocolState,
}

impl CommandProtocol {
    pub fn new(sink: SharedSink) -> Self {
        CommandProtocol {
            transport: None,
            sink,
            context: String::new(),
            command_msg: String::new(),
            state: ProtocolState::Idle,
        }
    }

    /// Attaches a line. The transport does not need to be open yet.
    pub fn attach(&mut self, transport: Box<dyn Transport>) -> Option<Box<dyn Transport>> {
        self.transport.replace(transport)
    }

    /// Hands the line back, e.g. to move it to another meter on the same bus.
    pub fn detach(&mut self) -> Option<Box<dyn Transport>> {
        self.transport.take()
    }

    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn log(&self, level: Level, message: &str) {
        self.sink.log(level, &self.context, message);
    }

    /// Sets the label of the command in flight. An empty label returns the
    /// machine to `Idle`.
    pub fn set_context(&mut self, context: &str) {
        if self.context.is_empty() && !context.is_empty() && !context.starts_with("request") {
            self.sink.log(Level::Info, "", &format!("Context: {context}"));
        }
        self.context = context.to_string();
        self.state = if context.is_empty() {
            ProtocolState::Idle
        } else {
            ProtocolState::ContextSet
        };
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Records the result message of the current command.
    pub fn write_cmd_msg(&mut self, msg: &str) {
        self.sink.log(Level::Info, &self.context, &format!("(writeCmdMsg) {msg}"));
        self.command_msg = msg.to_string();
    }

    pub fn command_message(&self) -> &str {
        &self.command_msg
    }

    pub fn clear_cmd_msg(&mut self) {
        self.command_msg.clear();
    }

    fn line(&mut self) -> Result<&mut Box<dyn Transport>, MeterError> {
        self.transport
            .as_mut()
            .ok_or_else(|| MeterError::Transport("no serial port attached".into()))
    }

    /// Writes one frame.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), MeterError> {
        let context = self.context.clone();
        let line = self.line()?;
        if !line.is_open() {
            line.open()?;
        }
        line.send(bytes, &context)?;
        self.state = ProtocolState::FrameSent;
        Ok(())
    }

    /// Collects one response, possibly empty.
    pub fn receive(&mut self) -> Result<Vec<u8>, MeterError> {
        let context = self.context.clone();
        self.state = ProtocolState::AwaitResponse;
        self.line()?.poll_for_response(&context)
    }

    /// Sends a frame that expects a full 255 byte answer.
    ///
    /// An empty answer is a transport failure. A short or long one is handed
    /// back and left for the decoder to reject.
    pub fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, MeterError> {
        self.send(bytes)?;
        let raw = self.receive()?;
        if raw.is_empty() {
            self.log(Level::Warn, "Empty return read.");
            return Err(MeterError::Transport("no response within wait budget".into()));
        }
        if raw.len() != OMNI_FRAME_LEN {
            self.log(Level::Debug, &format!("Short read: {}", format_hex_compact(&raw)));
        }
        Ok(raw)
    }

    /// Sends a frame that expects a lone ACK.
    fn expect_ack(&mut self, bytes: &[u8]) -> Result<bool, MeterError> {
        self.send(bytes)?;
        let response = self.receive()?;
        Ok(frame::is_ack(&response))
    }

    /// Password sub-exchange. Never sends the termination frame.
    pub fn authenticate(&mut self, password: &Password) -> Result<(), MeterError> {
        self.state = ProtocolState::PasswordAuth;
        let accepted = self
            .expect_ack(&frame::password_frame(password))
            .map_err(|e| {
                self.log(Level::Warn, &format!("Password call failure by error: {e}"));
                e
            })?;
        if accepted {
            self.log(Level::Info, "Password accepted");
            Ok(())
        } else {
            self.log(Level::Warn, "Password call failure no 06");
            Err(MeterError::Auth(format!("no ACK to password ({})", self.context)))
        }
    }

    /// Sends a write frame and waits for its ACK.
    pub fn send_write(&mut self, command: WriteCommand, payload: &[u8]) -> Result<(), MeterError> {
        let frame = frame::write_frame(command, payload);
        if self.expect_ack(&frame)? {
            self.state = ProtocolState::Validated;
            Ok(())
        } else {
            Err(MeterError::Protocol(format!(
                "{} not acknowledged",
                command.label()
            )))
        }
    }

    /// Sends a settings read frame and returns the raw answer.
    pub fn settings_read(&mut self, command: ReadCommand) -> Result<Vec<u8>, MeterError> {
        self.exchange(&frame::settings_read_frame(command))
    }

    /// Sends the termination frame.
    ///
    /// Failures are logged only; the outcome of the command stands.
    pub fn post_end(&mut self) {
        match self.send(&frame::terminator()) {
            Ok(()) => self.log(Level::Debug, "Termination string sent"),
            Err(e) => self.log(Level::Warn, &format!("Termination string not sent: {e}")),
        }
        self.state = ProtocolState::PostTerminate;
    }
}

impl std::fmt::Debug for CommandProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProtocol")
            .field("transport", &self.transport.as_ref().map(|t| t.name().to_string()))
            .field("context", &self.context)
            .field("command_msg", &self.command_msg)
            .field("state", &self.state)
            .finish()
    }
}
