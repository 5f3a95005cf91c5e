//! # AT Transaction Engine
//!
//! A transaction owns a port's line from the moment its command is written
//! until a terminator shows up in the accumulated response or the deadline
//! passes. Multi-step exchanges (the `AT+CMGS` prompt followed by the PDU
//! payload) run several [`Transaction::exchange`] calls under one
//! [`Transaction`] so nothing else can be written in between.

use crate::constants::{CTRL_Z, DEFAULT_TERMINATORS, FINAL_TERMINATORS, LINE_TERMINATOR};
use crate::error::ModemError;
use crate::modem::connection::{closed, ModemConnection};
use crate::modem::transport::Transport;
use bytes::BytesMut;
use log::{debug, trace};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, MutexGuard};
use tokio::time::{timeout, timeout_at, Instant};

const READ_CHUNK: usize = 256;

/// How the command text is terminated on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    /// `\r\n`, for ordinary command lines.
    Line,
    /// Ctrl-Z, for a PDU payload after the `>` prompt.
    CtrlZ,
}

/// One command awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub text: String,
    pub suffix: Suffix,
    /// The response is complete once it contains any of these.
    pub terminators: &'static [&'static str],
    pub timeout: Duration,
}

impl PendingCommand {
    /// A command line waiting on `OK`, `ERROR` or `>`.
    pub fn new(text: impl Into<String>, timeout: Duration) -> Self {
        PendingCommand {
            text: text.into(),
            suffix: Suffix::Line,
            terminators: DEFAULT_TERMINATORS,
            timeout,
        }
    }

    /// A PDU payload sent after the prompt; only the final result ends it.
    pub fn payload(pdu_hex: impl Into<String>, timeout: Duration) -> Self {
        PendingCommand {
            text: pdu_hex.into(),
            suffix: Suffix::CtrlZ,
            terminators: FINAL_TERMINATORS,
            timeout,
        }
    }

    pub fn with_terminators(mut self, terminators: &'static [&'static str]) -> Self {
        self.terminators = terminators;
        self
    }

    /// Bytes written to the transport.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 2);
        bytes.extend_from_slice(self.text.as_bytes());
        match self.suffix {
            Suffix::Line => bytes.extend_from_slice(LINE_TERMINATOR.as_bytes()),
            Suffix::CtrlZ => bytes.push(CTRL_Z),
        }
        bytes
    }

    fn is_complete(&self, response: &str) -> bool {
        self.terminators.iter().any(|t| response.contains(t))
    }
}

/// Exclusive hold on one port's line.
pub struct Transaction<'a> {
    conn: &'a ModemConnection,
    port: MutexGuard<'a, Box<dyn Transport>>,
    close_signal: watch::Receiver<bool>,
}

impl ModemConnection {
    /// Waits for the line and returns a transaction holding it.
    pub async fn transaction(&self) -> Result<Transaction<'_>, ModemError> {
        let close_signal = self.close_signal();
        let port = self.port.lock().await;
        if self.is_closed() {
            return Err(ModemError::TransportError(format!("{}: transport closed", self.name())));
        }
        Ok(Transaction {
            conn: self,
            port,
            close_signal,
        })
    }
}

impl Transaction<'_> {
    /// Writes one command and reads until a terminator or the deadline.
    ///
    /// On timeout the error carries the trimmed partial response (possibly
    /// empty). A close of the connection or end of stream while waiting
    /// fails at once with a transport error.
    pub async fn exchange(&mut self, command: &PendingCommand) -> Result<String, ModemError> {
        let deadline = Instant::now() + command.timeout;
        debug!("{} <- {}", self.conn.name(), command.text);

        self.discard_stale_input().await;
        self.port.write_all(&command.wire_bytes()).await?;
        self.port.flush().await?;

        let mut response = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let read = tokio::select! {
                read = timeout_at(deadline, self.port.read(&mut chunk)) => Some(read),
                _ = closed(&mut self.close_signal) => None,
            };

            match read {
                None => {
                    return Err(ModemError::TransportError(format!(
                        "{}: transport closed while command pending",
                        self.conn.name()
                    )));
                }
                Some(Err(_)) => {
                    let partial = String::from_utf8_lossy(&response).trim().to_string();
                    debug!(
                        "{} timed out after {:?} (partial {:?})",
                        self.conn.name(),
                        command.timeout,
                        partial
                    );
                    return Err(ModemError::Timeout(partial));
                }
                Some(Ok(Ok(0))) => {
                    self.conn.mark_dead();
                    return Err(ModemError::TransportError(format!(
                        "{}: end of stream",
                        self.conn.name()
                    )));
                }
                Some(Ok(Ok(n))) => {
                    trace!("{} -> {:?}", self.conn.name(), String::from_utf8_lossy(&chunk[..n]));
                    response.extend_from_slice(&chunk[..n]);
                }
                Some(Ok(Err(e))) => {
                    self.conn.mark_dead();
                    return Err(e.into());
                }
            }

            let text = String::from_utf8_lossy(&response);
            if command.is_complete(&text) {
                let result = text.trim().to_string();
                debug!("{} -> {}", self.conn.name(), result.replace("\r\n", " | "));
                self.conn.dispatch_urcs(&result);
                return Ok(result);
            }
        }
    }

    /// Drops input already waiting on the line, such as a late reply to a
    /// command that timed out. Unsolicited codes in it are still dispatched.
    async fn discard_stale_input(&mut self) {
        let mut stale = BytesMut::new();
        let mut chunk = [0u8; READ_CHUNK];
        while let Ok(Ok(n)) = timeout(Duration::ZERO, self.port.read(&mut chunk)).await {
            if n == 0 {
                break;
            }
            stale.extend_from_slice(&chunk[..n]);
        }
        if !stale.is_empty() {
            let text = String::from_utf8_lossy(&stale);
            debug!("{} discarded stale input {:?}", self.conn.name(), text.trim());
            self.conn.dispatch_urcs(&text);
        }
    }
}

/// Runs a single-command transaction on `conn`.
pub async fn execute(
    conn: &ModemConnection,
    command: &PendingCommand,
) -> Result<String, ModemError> {
    conn.transaction().await?.exchange(command).await
}
