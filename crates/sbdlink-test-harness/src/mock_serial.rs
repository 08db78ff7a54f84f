//! Mock serial transport for deterministic testing of the AT transceiver.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. Each response is a queue of chunks, one chunk per
//! `receive()` call, so tests can reproduce replies that trickle in across
//! several reads, stall halfway, or never arrive.
//!
//! The mock is a cheap handle onto shared state: clone it before boxing it
//! into the code under test and keep the clone to inspect what was sent.
//!
//! # Example
//!
//! ```
//! use sbdlink_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the transceiver sends this request, deliver the reply in two reads.
//! mock.expect_chunks(b"AT+CSQ\r\n", &[b"+CSQ:", b"4\r\n\r\nOK\r\n"]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sbdlink_core::error::{Error, Result};
use sbdlink_core::transport::Transport;
use sbdlink_core::types::LineMode;

/// A pre-loaded request and the chunks delivered after it is sent.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// Bytes returned by successive `receive()` calls. An empty chunk is a
    /// quiet window: the call waits out its timeout and returns `Ok(0)`.
    chunks: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct State {
    expectations: VecDeque<Expectation>,
    /// Chunks not yet handed to `receive()`.
    pending: VecDeque<Vec<u8>>,
    connected: bool,
    mode: LineMode,
    /// Every actual mode transition, in order.
    mode_log: Vec<LineMode>,
    /// Log of all bytes sent through this transport.
    sent_log: Vec<Vec<u8>>,
    /// Line mode in effect for each entry of `sent_log`.
    sent_modes: Vec<LineMode>,
    flush_count: usize,
    fail_next_send: Option<io::ErrorKind>,
    /// Fail the next attempt to switch into this mode.
    fail_set_mode: Option<LineMode>,
}

/// A mock [`Transport`] for testing protocol code without a modem.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; its chunks are
/// then queued for `receive()`. A send that does not match, or one with no
/// expectation left, fails with [`Error::Protocol`].
///
/// With nothing queued, `receive()` behaves like a quiet serial line: it
/// waits for the timeout and returns `Ok(0)`.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state, in text mode.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(State {
                expectations: VecDeque::new(),
                pending: VecDeque::new(),
                connected: true,
                mode: LineMode::Text,
                mode_log: Vec::new(),
                sent_log: Vec::new(),
                sent_modes: Vec::new(),
                flush_count: 0,
                fail_next_send: None,
                fail_set_mode: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the log from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request whose reply arrives in a single read.
    ///
    /// An empty `response` means the modem stays silent.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        let chunks = if response.is_empty() {
            Vec::new()
        } else {
            vec![response.to_vec()]
        };
        self.push(request, chunks);
    }

    /// Add an expected request whose reply arrives as `chunks`, one per read.
    pub fn expect_chunks(&self, request: &[u8], chunks: &[&[u8]]) {
        self.push(request, chunks.iter().map(|c| c.to_vec()).collect());
    }

    /// Add an expected request that gets no reply at all.
    pub fn expect_silence(&self, request: &[u8]) {
        self.push(request, Vec::new());
    }

    fn push(&self, request: &[u8], chunks: Vec<Vec<u8>>) {
        self.state().expectations.push_back(Expectation {
            request: request.to_vec(),
            chunks,
        });
    }

    /// Queue unsolicited input, e.g. power-up echo, ahead of any reply.
    pub fn inject_input(&self, data: &[u8]) {
        self.state().pending.push_back(data.to_vec());
    }

    /// Make the next `send()` fail with an I/O error of the given kind.
    pub fn fail_next_send(&self, kind: io::ErrorKind) {
        self.state().fail_next_send = Some(kind);
    }

    /// Make the next attempt to switch into `mode` fail with an I/O error.
    pub fn fail_next_set_mode(&self, mode: LineMode) {
        self.state().fail_set_mode = Some(mode);
    }

    /// All data that has been sent through this transport, one element per
    /// `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().sent_log.clone()
    }

    /// Line mode in effect for each `send()` call.
    pub fn sent_modes(&self) -> Vec<LineMode> {
        self.state().sent_modes.clone()
    }

    /// Every mode transition performed, in order. No-op switches are not
    /// recorded.
    pub fn mode_log(&self) -> Vec<LineMode> {
        self.state().mode_log.clone()
    }

    pub fn current_mode(&self) -> LineMode {
        self.state().mode
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.state().expectations.len()
    }

    /// Bytes queued but not yet read.
    pub fn pending_input(&self) -> usize {
        self.state().pending.iter().map(Vec::len).sum()
    }

    /// How many times `flush_input()` was called.
    pub fn flush_count(&self) -> usize {
        self.state().flush_count
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent calls return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if let Some(kind) = state.fail_next_send.take() {
            return Err(Error::Io(io::Error::new(kind, "mock send failure")));
        }

        // Record what was sent.
        state.sent_log.push(data.to_vec());
        let mode = state.mode;
        state.sent_modes.push(mode);

        // Match against the next expectation.
        match state.expectations.pop_front() {
            Some(expectation) if expectation.request == data => {
                state.pending.extend(expectation.chunks);
                Ok(data.len())
            }
            Some(expectation) => Err(Error::protocol(
                format!(
                    "unexpected send data: expected {:?}, got {:?}",
                    String::from_utf8_lossy(&expectation.request),
                    String::from_utf8_lossy(data)
                ),
                data,
            )),
            None => Err(Error::protocol(
                "no more expectations in mock transport",
                data,
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let chunk = {
            let mut state = self.state();
            if !state.connected {
                return Err(Error::NotConnected);
            }
            match state.pending.pop_front() {
                Some(mut chunk) if !chunk.is_empty() => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        state.pending.push_front(chunk.split_off(n));
                    }
                    Some(n)
                }
                _ => None,
            }
        };

        match chunk {
            Some(n) => Ok(n),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(0)
            }
        }
    }

    async fn set_mode(&mut self, mode: LineMode) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.fail_set_mode == Some(mode) && state.mode != mode {
            state.fail_set_mode = None;
            return Err(Error::Io(io::Error::other("mock mode switch failure")));
        }
        if state.mode != mode {
            state.mode = mode;
            state.mode_log.push(mode);
        }
        Ok(())
    }

    fn mode(&self) -> LineMode {
        self.state().mode
    }

    async fn flush_input(&mut self) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.pending.clear();
        state.flush_count += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.connected = false;
        state.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}
