//! In-memory modem for tests and demos.
//!
//! [`MockModem`] is a duplex transport that behaves like a modem on the far
//! end of a serial line: every command line written to it (terminated by
//! `\r`, or by Ctrl-Z for a PDU payload) is handed to a responder closure
//! whose reply is queued for reading. Unsolicited output can be injected at
//! any time, replies can be delayed, and the line can be closed under a
//! pending read.

use crate::constants::CTRL_Z;
use crate::error::ModemError;
use crate::modem::transport::{PortOpener, SerialConfig, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Produces the modem's reply to one command, `None` for no reply at all.
pub type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

const OK_REPLY: &str = "\r\nOK\r\n";

struct MockState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    commands: Vec<String>,
    line: Vec<u8>,
    responder: Responder,
    read_waker: Option<Waker>,
    delay: Duration,
    closed: bool,
}

impl MockState {
    fn push_rx(&mut self, data: &[u8]) {
        self.rx.extend(data);
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }
}

/// Scripted modem endpoint. Clones share the same line.
#[derive(Clone)]
pub struct MockModem {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockModem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockModem")
            .field("commands", &state.commands)
            .field("pending_rx", &state.rx.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl MockModem {
    /// A modem that answers `OK` to everything.
    pub fn new() -> Self {
        Self::with_responder(|_| Some(OK_REPLY.to_string()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        MockModem {
            state: Arc::new(Mutex::new(MockState {
                rx: VecDeque::new(),
                tx: Vec::new(),
                commands: Vec::new(),
                line: Vec::new(),
                responder: Box::new(responder),
                read_waker: None,
                delay: Duration::ZERO,
                closed: false,
            })),
        }
    }

    /// Replies by command prefix; the first matching entry wins and
    /// unmatched commands get `OK`.
    pub fn with_replies(replies: &[(&str, &str)]) -> Self {
        let table: Vec<(String, String)> = replies
            .iter()
            .map(|(prefix, reply)| (prefix.to_string(), reply.to_string()))
            .collect();
        Self::with_responder(move |command| {
            let reply = table
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| OK_REPLY.to_string());
            Some(reply)
        })
    }

    /// A modem that never answers.
    pub fn silent() -> Self {
        Self::with_responder(|_| None)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        self.lock().responder = Box::new(responder);
    }

    /// Delays every reply by `delay`, as a slow device would.
    pub fn set_response_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Queues device-initiated output such as `+CMTI` lines.
    pub fn push_unsolicited(&self, text: &str) {
        self.lock().push_rx(text.as_bytes());
    }

    /// Commands received so far, in arrival order, without terminators.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Every byte written to the modem.
    pub fn written(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Hangs up the line: pending and later reads see end of stream,
    /// writes fail.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn complete_line(&self, state: &mut MockState) {
        let command = String::from_utf8_lossy(&state.line).trim().to_string();
        state.line.clear();
        if command.is_empty() {
            return;
        }
        state.commands.push(command.clone());

        let Some(reply) = (state.responder)(&command) else {
            return;
        };
        if state.delay.is_zero() {
            state.push_rx(reply.as_bytes());
            return;
        }

        let delay = state.delay;
        let shared = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.closed {
                state.push_rx(reply.as_bytes());
            }
        });
    }
}

impl AsyncRead for MockModem {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.lock();
        if !state.rx.is_empty() {
            let available = state.rx.len().min(buf.remaining());
            let data: Vec<u8> = state.rx.drain(..available).collect();
            buf.put_slice(&data);
            return Poll::Ready(Ok(()));
        }
        if state.closed {
            return Poll::Ready(Ok(()));
        }
        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MockModem {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut state = this.lock();
        if state.closed {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock modem closed")));
        }
        state.tx.extend_from_slice(buf);
        for &byte in buf {
            match byte {
                b'\r' | b'\n' | CTRL_Z => this.complete_line(&mut state),
                _ => state.line.push(byte),
            }
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Hands out registered [`MockModem`]s by path; any other path fails to open.
#[derive(Debug, Default, Clone)]
pub struct MockOpener {
    modems: Arc<Mutex<HashMap<String, MockModem>>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, modem: MockModem) {
        self.modems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), modem);
    }
}

#[async_trait]
impl PortOpener for MockOpener {
    async fn open(
        &self,
        path: &str,
        _config: &SerialConfig,
    ) -> Result<Box<dyn Transport>, ModemError> {
        let modem = self
            .modems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| ModemError::TransportError(format!("{path}: no such device")))?;
        Ok(Box::new(modem))
    }
}
