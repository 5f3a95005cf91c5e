//! # Logging Utilities
//!
//! Rate limiting for log lines that can repeat at line speed (a flapping
//! serial port, a modem spewing garbage) and a hex helper for PDU dumps.
//!
//! ```rust
//! use modem_rs::util::logging::LogThrottle;
//!
//! let mut throttle = LogThrottle::new(1000, 5); // 5 messages per second
//! if throttle.allow() {
//!     log::warn!("read failed");
//! }
//! ```

use std::time::Instant;

/// Longest PDU prefix written to the log, in hex characters.
const MAX_LOG_HEX_CHARS: usize = 128;

/// Throttling structure for rate-limiting log messages
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Start time of current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    ///
    /// # Arguments
    /// * `window_ms` - Time window in milliseconds
    /// * `cap` - Maximum messages allowed per window
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);
        self.count <= self.cap
    }

    /// Get current throttle statistics
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            window_ms: self.window_ms,
            cap: self.cap,
            count: self.count,
            window_remaining_ms: self
                .window_ms
                .saturating_sub(self.t0.elapsed().as_millis() as u64),
        }
    }

    /// Reset the throttle (start new window immediately)
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
    }
}

/// Statistics about a log throttle instance
#[derive(Debug, Clone, Copy)]
pub struct ThrottleStats {
    pub window_ms: u64,
    pub cap: u32,
    pub count: u32,
    pub window_remaining_ms: u64,
}

/// Logs a hex PDU at debug level, cut short past 64 octets.
pub fn log_pdu_hex(prefix: &str, pdu_hex: &str) {
    log::debug!("{}", format_pdu_hex(prefix, pdu_hex));
}

fn format_pdu_hex(prefix: &str, pdu_hex: &str) -> String {
    let pdu_hex = pdu_hex.trim();
    match pdu_hex.get(..MAX_LOG_HEX_CHARS) {
        Some(head) if pdu_hex.len() > MAX_LOG_HEX_CHARS => {
            format!("{prefix}: {head} ... ({} hex chars total)", pdu_hex.len())
        }
        _ => format!("{prefix}: {pdu_hex}"),
    }
}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}
