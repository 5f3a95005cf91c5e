//! One attached modem port.

use crate::modem::response::{find_urcs, Urc};
use crate::modem::transport::{port_name, Transport};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex};

/// Identity fields read from the modem after it connects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub imei: String,
    pub imsi: String,
    pub phone_number: String,
    pub operator: String,
}

/// An open transport plus the guard that serializes access to it.
///
/// Whoever holds `port` owns the line: a command transaction holds it from
/// write to final result, the background read loop holds it for one bounded
/// read at a time.
pub struct ModemConnection {
    name: String,
    path: String,
    pub(crate) port: Mutex<Box<dyn Transport>>,
    alive: AtomicBool,
    closed: watch::Sender<bool>,
    identity: RwLock<DeviceInfo>,
    urc_sink: Option<mpsc::Sender<Urc>>,
}

impl std::fmt::Debug for ModemConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemConnection")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl ModemConnection {
    pub fn new(path: &str, transport: Box<dyn Transport>) -> Self {
        let (closed, _) = watch::channel(false);
        ModemConnection {
            name: port_name(path),
            path: path.to_string(),
            port: Mutex::new(transport),
            alive: AtomicBool::new(true),
            closed,
            identity: RwLock::new(DeviceInfo::default()),
            urc_sink: None,
        }
    }

    /// Routes unsolicited codes seen on this line to `sink`.
    pub fn with_urc_sink(mut self, sink: mpsc::Sender<Urc>) -> Self {
        self.urc_sink = Some(sink);
        self
    }

    /// Forwards every unsolicited code found in `text` to the sink, if any.
    /// Called for command responses as well as idle reads.
    pub(crate) fn dispatch_urcs(&self, text: &str) {
        let Some(sink) = &self.urc_sink else {
            return;
        };
        for urc in find_urcs(text) {
            match sink.try_send(urc) {
                Ok(()) => {}
                Err(TrySendError::Full(urc)) => {
                    warn!("{}: URC queue full, dropped {urc:?}", self.name)
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }

    /// Registry key, the device base name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Records that the transport hit end of stream or failed.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Tears the connection down. Any transaction waiting on the line fails
    /// immediately with a transport-closed error.
    pub fn close(&self) {
        self.mark_dead();
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn identity(&self) -> DeviceInfo {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_identity(&self, info: DeviceInfo) {
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = info;
    }
}

/// Resolves once `close()` has been called on the connection.
pub(crate) async fn closed(signal: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *signal.borrow_and_update();
        if is_closed {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}
