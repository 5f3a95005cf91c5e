//! # Connection Registry
//!
//! Owns every attached modem. Each connected port gets a background read
//! loop that publishes unsolicited output to the [`EventBus`] and a worker
//! that reacts to `+CMTI` notifications by listing storage and handing newly
//! completed messages to the registered [`IncomingMessageHandler`].
//!
//! The port map sits behind one lock that is only held to read or update
//! the map itself; opening, probing and command traffic happen outside it.
//!
//! ```rust,no_run
//! use modem_rs::{ModemConfig, ModemRegistry};
//!
//! # async fn demo() -> Result<(), modem_rs::ModemError> {
//! let registry = ModemRegistry::new(ModemConfig::default());
//! for port in registry.scan().await {
//!     let signal = registry.signal_quality(&port).await?;
//!     println!("{port}: {:?} dBm", signal.dbm);
//! }
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::config::ModemConfig;
use crate::constants::{AT_CHARSET_UCS2, AT_ECHO_OFF, AT_PDU_MODE, AT_PROBE};
use crate::error::ModemError;
use crate::event_bus::{CancelHandle, EventBus};
use crate::modem::connection::{DeviceInfo, ModemConnection};
use crate::modem::response::{check_result, SignalQuality, Urc};
use crate::modem::sms::{self, SendReport, StoredMessage};
use crate::modem::transaction::{execute, PendingCommand};
use crate::modem::transport::{expand_candidates, port_name, PortOpener, SerialOpener};
use crate::pdu::DecodedMessage;
use crate::util::logging::LogThrottle;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Queue depth between a port's line and its URC worker.
const URC_QUEUE: usize = 32;
/// Longest partial line kept between idle reads.
const MAX_PENDING_LINE: usize = 1024;
/// Pause after a failed idle read.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Raw unsolicited output read from one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEvent {
    pub port: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortState {
    Disconnected,
    Probing,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    pub name: String,
    pub path: String,
    pub state: PortState,
    /// Cached identity, for connected ports.
    pub identity: Option<DeviceInfo>,
}

/// Receives messages that arrived while the registry was running.
///
/// Each call runs on its own task; a slow or failing handler never holds up
/// the port.
#[async_trait]
pub trait IncomingMessageHandler: Send + Sync {
    async fn on_incoming_message(&self, message: DecodedMessage, port: &str);
}

#[async_trait]
impl<F> IncomingMessageHandler for F
where
    F: Fn(DecodedMessage, &str) + Send + Sync,
{
    async fn on_incoming_message(&self, message: DecodedMessage, port: &str) {
        self(message, port)
    }
}

struct PortEntry {
    conn: Arc<ModemConnection>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct Pool {
    connected: HashMap<String, PortEntry>,
    /// Paths currently being opened and probed, by name.
    probing: HashMap<String, String>,
}

/// Explicitly constructed owner of all modem connections.
///
/// Dropping the registry closes every port it still holds.
pub struct ModemRegistry {
    config: ModemConfig,
    opener: Arc<dyn PortOpener>,
    pool: RwLock<Pool>,
    events: EventBus<PortEvent>,
    handler: Option<Arc<dyn IncomingMessageHandler>>,
    next_reference: AtomicU8,
}

impl ModemRegistry {
    /// A registry that opens real serial ports.
    pub fn new(config: ModemConfig) -> Self {
        Self::with_opener(config, Arc::new(SerialOpener))
    }

    pub fn with_opener(config: ModemConfig, opener: Arc<dyn PortOpener>) -> Self {
        ModemRegistry {
            config,
            opener,
            pool: RwLock::new(Pool::default()),
            events: EventBus::new(),
            handler: None,
            next_reference: AtomicU8::new(rand::random()),
        }
    }

    /// Installs the incoming-message callback. Ports connected afterwards
    /// use it.
    pub fn with_handler(mut self, handler: Arc<dyn IncomingMessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus<PortEvent> {
        &self.events
    }

    /// Subscribes to unsolicited output from every port.
    pub fn subscribe(&self, buffer: usize) -> (mpsc::Receiver<PortEvent>, CancelHandle<PortEvent>) {
        self.events.subscribe(buffer)
    }

    /// Probes every configured candidate that is not already connected.
    /// Returns the names of newly connected ports.
    pub async fn scan(&self) -> Vec<String> {
        let mut connected = Vec::new();
        for path in expand_candidates(&self.config.ports) {
            let name = port_name(&path);
            if self.pool.read().await.connected.contains_key(&name) {
                continue;
            }
            match self.connect(&path).await {
                Ok(name) => connected.push(name),
                Err(e) => debug!("Probe of {path} failed: {e}"),
            }
        }
        info!(
            "Scan finished, {} new port(s), {} total",
            connected.len(),
            self.connected_count().await
        );
        connected
    }

    /// Opens, probes and initializes one port, then starts its loops.
    ///
    /// Connecting a port that is already connected returns its name.
    pub async fn connect(&self, path: &str) -> Result<String, ModemError> {
        let name = port_name(path);
        {
            let mut pool = self.pool.write().await;
            if pool.connected.contains_key(&name) {
                return Ok(name);
            }
            if pool.probing.contains_key(&name) {
                return Err(ModemError::Other(format!("{name}: probe already in progress")));
            }
            pool.probing.insert(name.clone(), path.to_string());
        }

        let result = self.open_and_probe(path).await;
        let mut pool = self.pool.write().await;
        pool.probing.remove(&name);
        let (conn, urcs) = result?;

        let tasks = vec![
            tokio::spawn(read_loop(
                Arc::clone(&conn),
                self.events.clone(),
                self.config.idle_read(),
            )),
            tokio::spawn(urc_worker(
                Arc::clone(&conn),
                urcs,
                self.handler.clone(),
                self.config.command_timeout(),
            )),
        ];
        pool.connected.insert(name.clone(), PortEntry { conn, tasks });
        info!("Connected {name} ({path})");
        Ok(name)
    }

    async fn open_and_probe(
        &self,
        path: &str,
    ) -> Result<(Arc<ModemConnection>, mpsc::Receiver<Urc>), ModemError> {
        let transport = self.opener.open(path, &self.config.serial_config()).await?;
        let (urc_tx, urc_rx) = mpsc::channel(URC_QUEUE);
        let conn = Arc::new(ModemConnection::new(path, transport).with_urc_sink(urc_tx));

        let probe = PendingCommand::new(AT_PROBE, self.config.probe_timeout());
        if let Err(e) = execute(&conn, &probe).await {
            conn.close();
            return Err(e);
        }

        self.initialize(&conn).await;
        Ok((conn, urc_rx))
    }

    /// Echo off, PDU mode, optional UCS-2 charset, identity. Failures are
    /// logged and the port stays usable.
    async fn initialize(&self, conn: &ModemConnection) {
        let mut commands = vec![AT_ECHO_OFF, AT_PDU_MODE];
        if self.config.select_ucs2_charset {
            commands.push(AT_CHARSET_UCS2);
        }
        for command in commands {
            let result = execute(conn, &PendingCommand::new(command, self.config.command_timeout()))
                .await
                .and_then(|response| check_result(&response));
            if let Err(e) = result {
                warn!("{}: init command {command} failed: {e}", conn.name());
            }
        }
        if let Err(e) = sms::device_info(conn, self.config.command_timeout()).await {
            warn!("{}: identity query failed: {e}", conn.name());
        }
    }

    async fn lookup(&self, port: &str) -> Result<Arc<ModemConnection>, ModemError> {
        let pool = self.pool.read().await;
        pool.connected
            .get(port)
            .or_else(|| pool.connected.get(&port_name(port)))
            .map(|entry| Arc::clone(&entry.conn))
            .ok_or_else(|| ModemError::NotConnected(port.to_string()))
    }

    async fn connected_count(&self) -> usize {
        self.pool.read().await.connected.len()
    }

    /// Every candidate and known port with its state, sorted by name.
    pub async fn list_ports(&self) -> Vec<PortStatus> {
        let mut ports: BTreeMap<String, PortStatus> = expand_candidates(&self.config.ports)
            .into_iter()
            .map(|path| {
                let name = port_name(&path);
                let status = PortStatus {
                    name: name.clone(),
                    path,
                    state: PortState::Disconnected,
                    identity: None,
                };
                (name, status)
            })
            .collect();

        let pool = self.pool.read().await;
        for (name, path) in &pool.probing {
            ports.insert(
                name.clone(),
                PortStatus {
                    name: name.clone(),
                    path: path.clone(),
                    state: PortState::Probing,
                    identity: None,
                },
            );
        }
        for (name, entry) in &pool.connected {
            ports.insert(
                name.clone(),
                PortStatus {
                    name: name.clone(),
                    path: entry.conn.path().to_string(),
                    state: PortState::Connected,
                    identity: Some(entry.conn.identity()),
                },
            );
        }
        ports.into_values().collect()
    }

    /// Sends a raw command and returns the raw response, error results
    /// included.
    pub async fn send_command(&self, port: &str, text: &str) -> Result<String, ModemError> {
        let conn = self.lookup(port).await?;
        execute(&conn, &PendingCommand::new(text, self.config.command_timeout())).await
    }

    pub async fn device_info(&self, port: &str) -> Result<DeviceInfo, ModemError> {
        let conn = self.lookup(port).await?;
        sms::device_info(&conn, self.config.command_timeout()).await
    }

    pub async fn signal_quality(&self, port: &str) -> Result<SignalQuality, ModemError> {
        let conn = self.lookup(port).await?;
        sms::signal_quality(&conn, self.config.command_timeout()).await
    }

    pub async fn list_messages(&self, port: &str) -> Result<Vec<StoredMessage>, ModemError> {
        let conn = self.lookup(port).await?;
        sms::list_messages(&conn, self.config.command_timeout()).await
    }

    /// Sends an SMS, split into as many parts as needed. Each multi-part
    /// message gets the next value of a rolling concatenation reference.
    pub async fn send_message(
        &self,
        port: &str,
        number: &str,
        text: &str,
    ) -> Result<SendReport, ModemError> {
        let conn = self.lookup(port).await?;
        let reference = self.next_reference.fetch_add(1, Ordering::Relaxed);
        sms::send_message(
            &conn,
            number,
            text,
            reference,
            self.config.command_timeout(),
            self.config.send_timeout(),
        )
        .await
    }

    pub async fn delete_message(&self, port: &str, index: u32) -> Result<(), ModemError> {
        let conn = self.lookup(port).await?;
        sms::delete_message(&conn, index, self.config.command_timeout()).await
    }

    /// Removes a port, stops its loops and fails any command still waiting
    /// on it.
    pub async fn disconnect(&self, port: &str) -> Result<(), ModemError> {
        let entry = {
            let mut pool = self.pool.write().await;
            let key = if pool.connected.contains_key(port) {
                port.to_string()
            } else {
                port_name(port)
            };
            pool.connected.remove(&key)
        };
        match entry {
            Some(entry) => {
                teardown(entry);
                Ok(())
            }
            None => Err(ModemError::NotConnected(port.to_string())),
        }
    }

    /// Disconnects every port.
    pub async fn shutdown(&self) {
        let entries: Vec<PortEntry> = {
            let mut pool = self.pool.write().await;
            pool.connected.drain().map(|(_, entry)| entry).collect()
        };
        let count = entries.len();
        entries.into_iter().for_each(teardown);
        info!("Registry shut down, {count} port(s) closed");
    }

    /// Re-probes every port and tears down those that fail. Returns the
    /// names removed.
    pub async fn health_check(&self) -> Vec<String> {
        let snapshot: Vec<Arc<ModemConnection>> = {
            let pool = self.pool.read().await;
            pool.connected.values().map(|entry| Arc::clone(&entry.conn)).collect()
        };

        let mut failed = Vec::new();
        for conn in snapshot {
            let healthy = conn.is_alive()
                && execute(&conn, &PendingCommand::new(AT_PROBE, self.config.probe_timeout()))
                    .await
                    .map_err(|e| warn!("{}: health check failed: {e}", conn.name()))
                    .is_ok();
            if !healthy {
                failed.push(conn.name().to_string());
            }
        }

        for name in &failed {
            let entry = self.pool.write().await.connected.remove(name);
            if let Some(entry) = entry {
                teardown(entry);
                info!("Removed {name} after failed health check");
            }
        }
        failed
    }

    /// Runs [`ModemRegistry::health_check`] every configured interval until
    /// the registry is dropped. Returns `None` when the interval is 0.
    pub fn spawn_health_monitor(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.config.health_check_interval()?;
        let registry = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let removed = registry.health_check().await;
                if !removed.is_empty() {
                    info!("Health monitor removed {removed:?}");
                }
            }
        }))
    }
}

impl Drop for ModemRegistry {
    /// Ports still connected are torn down as by [`ModemRegistry::shutdown`].
    fn drop(&mut self) {
        let pool = self.pool.get_mut();
        pool.connected.drain().for_each(|(_, entry)| teardown(entry));
    }
}

fn teardown(entry: PortEntry) {
    entry.conn.close();
    for task in &entry.tasks {
        task.abort();
    }
    info!("Disconnected {}", entry.conn.name());
}

/// Splits idle reads into complete lines.
#[derive(Debug, Default)]
struct LineAssembler {
    pending: String,
}

impl LineAssembler {
    fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        if self.pending.len() > MAX_PENDING_LINE {
            self.pending.clear();
        }
        lines
    }
}

/// Reads whatever the modem says while no transaction holds the line.
async fn read_loop(conn: Arc<ModemConnection>, events: EventBus<PortEvent>, idle: Duration) {
    let mut throttle = LogThrottle::new(10_000, 3);
    let mut lines = LineAssembler::default();
    let mut chunk = [0u8; 512];

    while conn.is_alive() {
        let read = {
            let mut port = conn.port.lock().await;
            tokio::time::timeout(idle, port.read(&mut chunk)).await
        };

        match read {
            Err(_) => continue,
            Ok(Ok(0)) => {
                warn!("{}: end of stream, port is down", conn.name());
                conn.mark_dead();
            }
            Ok(Ok(n)) => {
                let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
                for line in lines.push(&text) {
                    conn.dispatch_urcs(&line);
                }
                if !text.trim().is_empty() {
                    events.publish(PortEvent {
                        port: conn.name().to_string(),
                        text,
                    });
                }
            }
            Ok(Err(e)) => {
                crate::log_warn_throttled!(throttle, "{}: read failed: {e}", conn.name());
                tokio::time::sleep(READ_ERROR_BACKOFF).await;
            }
        }
    }
    debug!("{}: read loop stopped", conn.name());
}

/// Identity of a stored message already handed to the handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeliveryKey {
    indices: Vec<u32>,
    sender: String,
    timestamp: Option<String>,
}

impl DeliveryKey {
    fn of(stored: &StoredMessage) -> Self {
        DeliveryKey {
            indices: stored.indices.clone(),
            sender: stored.message.sender.clone(),
            timestamp: stored.message.timestamp.clone(),
        }
    }
}

/// Remembers which stored messages have been delivered, so a message
/// announced once per fragment reaches the handler once.
#[derive(Debug, Default)]
struct DeliveryLedger {
    delivered: HashSet<DeliveryKey>,
}

impl DeliveryLedger {
    /// Picks the complete messages that touch an announced index and were
    /// not delivered before. Entries no longer in storage are forgotten.
    fn select(
        &mut self,
        listing: Vec<StoredMessage>,
        announced: &HashSet<u32>,
    ) -> Vec<StoredMessage> {
        let present: HashSet<DeliveryKey> = listing.iter().map(DeliveryKey::of).collect();
        self.delivered.retain(|key| present.contains(key));

        listing
            .into_iter()
            .filter(|m| m.complete && m.indices.iter().any(|i| announced.contains(i)))
            .filter(|m| self.delivered.insert(DeliveryKey::of(m)))
            .collect()
    }
}

/// Handles unsolicited codes for one port. Notifications already queued
/// are batched into a single listing.
async fn urc_worker(
    conn: Arc<ModemConnection>,
    mut urcs: mpsc::Receiver<Urc>,
    handler: Option<Arc<dyn IncomingMessageHandler>>,
    timeout: Duration,
) {
    let mut ledger = DeliveryLedger::default();
    while let Some(urc) = urcs.recv().await {
        let mut announced = HashSet::new();
        let mut next = Some(urc);
        while let Some(Urc::NewMessage { storage, index }) = next {
            info!("{}: new message in {storage} at index {index}", conn.name());
            announced.insert(index);
            next = urcs.try_recv().ok();
        }
        let Some(handler) = &handler else {
            continue;
        };

        let messages = match sms::list_messages(&conn, timeout).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("{}: listing after new message failed: {e}", conn.name());
                continue;
            }
        };
        for stored in ledger.select(messages, &announced) {
            let handler = Arc::clone(handler);
            let port = conn.name().to_string();
            tokio::spawn(async move {
                handler.on_incoming_message(stored.message, &port).await;
            });
        }
    }
}
