//! Mock transport for testing
//!
//! Simulates a meter line without hardware. Responses are queued up front and
//! handed out one per [`Transport::poll_for_response`] call; everything sent
//! is captured so tests can assert on the exact bytes and frame order.
//!
//! Clones share state, so a test can keep one handle while the meter owns
//! another.

use crate::error::MeterError;
use crate::meter::transport::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    responses: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    polls: usize,
    next_error: Option<String>,
}

/// In-memory [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A mock that is already open.
    pub fn new() -> Self {
        let mock = Self::default();
        lock(&mock.state).open = true;
        mock
    }

    /// A mock that must be opened before use.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Queues the next response. An empty vector simulates a timeout.
    pub fn queue_response(&self, data: &[u8]) {
        lock(&self.state).responses.push_back(data.to_vec());
    }

    pub fn queue_ack(&self) {
        self.queue_response(&[crate::constants::OMNI_ACK]);
    }

    pub fn queue_silence(&self) {
        self.queue_response(&[]);
    }

    /// Every frame sent so far, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent.clone()
    }

    /// All sent bytes concatenated.
    pub fn get_tx_data(&self) -> Vec<u8> {
        lock(&self.state).sent.concat()
    }

    pub fn poll_count(&self) -> usize {
        lock(&self.state).polls
    }

    /// Responses still waiting to be polled.
    pub fn pending_responses(&self) -> usize {
        lock(&self.state).responses.len()
    }

    /// The next send or poll fails with a transport error.
    pub fn set_next_error(&self, message: &str) {
        lock(&self.state).next_error = Some(message.to_string());
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.responses.clear();
        state.sent.clear();
        state.polls = 0;
        state.next_error = None;
    }

    fn check(state: &mut MockState) -> Result<(), MeterError> {
        if let Some(message) = state.next_error.take() {
            return Err(MeterError::Transport(message));
        }
        if !state.open {
            return Err(MeterError::Transport("mock port is not open".into()));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), MeterError> {
        lock(&self.state).open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn send(&mut self, bytes: &[u8], _context: &str) -> Result<(), MeterError> {
        let mut state = lock(&self.state);
        Self::check(&mut state)?;
        if !bytes.is_empty() {
            state.sent.push(bytes.to_vec());
        }
        Ok(())
    }

    fn poll_for_response(&mut self, _context: &str) -> Result<Vec<u8>, MeterError> {
        let mut state = lock(&self.state);
        Self::check(&mut state)?;
        state.polls += 1;
        Ok(state.responses.pop_front().unwrap_or_default())
    }

    fn close(&mut self) {
        lock(&self.state).open = false;
    }

    fn name(&self) -> &str {
        "mock"
    }
}
