//! Runtime configuration.
//!
//! All tunable parameters for the emulator. The host simulator reads an
//! optional JSON override from the file named by `ROMEMU_CONFIG`; missing
//! fields keep their defaults.

use serde::{Deserialize, Serialize};

use crate::adapters::tcp_transport::DEFAULT_PORT;
use crate::app::ports::ConfigError;
use crate::rpc::codec::MAX_PAYLOAD;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "ROMEMU_CONFIG";

/// Core emulator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    // --- Bus observation ---
    /// Addresses per observation window (signal analysis and Trace replies)
    pub trace_window: u16,
    /// Deadline for filling one window (microseconds)
    pub trace_timeout_us: u32,

    // --- Menu ---
    /// How long the empty-slot screen stays up before the menu returns (ms)
    pub empty_slot_error_ms: u32,

    // --- Transports ---
    /// TCP listen port for the packet protocol
    pub tcp_port: u16,
    pub enable_tcp: bool,
    /// Serve the packet protocol on the console
    pub enable_stdio: bool,

    // --- Timing ---
    /// Control loop sleep when nothing happened (microseconds)
    pub idle_sleep_us: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            // Bus observation
            trace_window: 128,
            trace_timeout_us: 150,

            // Menu
            empty_slot_error_ms: 3000,

            // Transports
            tcp_port: DEFAULT_PORT,
            enable_tcp: true,
            enable_stdio: false,

            // Timing
            idle_sleep_us: 100,
        }
    }
}

impl EmulatorConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Trace replies carry two bytes per sample.
        if self.trace_window == 0 || usize::from(self.trace_window) * 2 > MAX_PAYLOAD {
            return Err(ConfigError::ValidationFailed("trace_window must be 1..=512"));
        }
        if self.trace_timeout_us == 0 || self.trace_timeout_us > 100_000 {
            return Err(ConfigError::ValidationFailed(
                "trace_timeout_us must be 1..=100000",
            ));
        }
        if self.empty_slot_error_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "empty_slot_error_ms must be at most 60000",
            ));
        }
        if self.enable_tcp && self.tcp_port == 0 {
            return Err(ConfigError::ValidationFailed("tcp_port must be non-zero"));
        }
        if self.idle_sleep_us > 100_000 {
            return Err(ConfigError::ValidationFailed(
                "idle_sleep_us must be at most 100000",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by the file named in `ROMEMU_CONFIG` if set.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::IoError)?;
                log::info!("config: loaded {}", path.to_string_lossy());
                Self::from_json(&text)
            }
            None => Ok(Self::default()),
        }
    }
}
