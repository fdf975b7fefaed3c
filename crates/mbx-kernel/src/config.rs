//! Boot-time configuration
//!
//! Every field has a default matching the classic teaching-kernel sizing, so
//! a partial JSON document only needs to name what it changes:
//!
//! ```json
//! { "max_slots": 64, "debug": true }
//! ```

use alloc::string::String;
use core::fmt;
use serde::{Deserialize, Serialize};

use mbx_kernel_core::{Limits, MAX_MAILBOXES, MAX_MESSAGE, MAX_PROCS, MAX_SLOTS};

use crate::devices::DEVICE_MESSAGE_SIZE;

/// Default number of disk units
pub const DEFAULT_DISK_UNITS: usize = 2;

/// Default number of terminal units
pub const DEFAULT_TERM_UNITS: usize = 4;

/// Default clock interrupts per posted clock event
pub const DEFAULT_CLOCK_TICKS_PER_EVENT: u32 = 5;

/// Default size of the syscall vector
pub const DEFAULT_MAX_SYSCALLS: usize = 50;

/// Default number of audit events kept in memory
pub const DEFAULT_AUDIT_LOG_CAPACITY: usize = 10000;

/// Kernel configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Mailbox table size (device mailboxes included)
    pub max_mailboxes: usize,
    /// Global slot pool size
    pub max_slots: usize,
    /// Blocked-process registry size
    pub max_procs: usize,
    /// Largest message any mailbox may accept
    pub max_message: usize,
    /// Disk units with a reserved mailbox
    pub disk_units: usize,
    /// Terminal units with a reserved mailbox
    pub term_units: usize,
    /// Clock interrupts per posted clock status
    pub clock_ticks_per_event: u32,
    /// Buffer capacity of each device mailbox (0 = rendezvous)
    pub device_mailbox_capacity: usize,
    /// Entries in the syscall vector
    pub max_syscalls: usize,
    /// Trace every mailbox operation to the HAL console
    pub debug: bool,
    /// Audit events kept before the oldest are dropped
    pub audit_log_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_mailboxes: MAX_MAILBOXES,
            max_slots: MAX_SLOTS,
            max_procs: MAX_PROCS,
            max_message: MAX_MESSAGE,
            disk_units: DEFAULT_DISK_UNITS,
            term_units: DEFAULT_TERM_UNITS,
            clock_ticks_per_event: DEFAULT_CLOCK_TICKS_PER_EVENT,
            device_mailbox_capacity: 0,
            max_syscalls: DEFAULT_MAX_SYSCALLS,
            debug: false,
            audit_log_capacity: DEFAULT_AUDIT_LOG_CAPACITY,
        }
    }
}

impl KernelConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig = serde_json::from_str(json)
            .map_err(|e| ConfigError::Parse(alloc::format!("{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|e| ConfigError::Parse(alloc::format!("{}", e)))
    }

    /// Check the configuration can boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_mailboxes == 0 {
            return Err(ConfigError::ZeroSized("max_mailboxes"));
        }
        if self.max_procs == 0 {
            return Err(ConfigError::ZeroSized("max_procs"));
        }
        if self.clock_ticks_per_event == 0 {
            return Err(ConfigError::ZeroSized("clock_ticks_per_event"));
        }
        if self.max_syscalls == 0 {
            return Err(ConfigError::ZeroSized("max_syscalls"));
        }
        if self.max_message < DEVICE_MESSAGE_SIZE {
            return Err(ConfigError::MessageTooSmall {
                max_message: self.max_message,
            });
        }
        let needed = self.device_mailboxes();
        if needed > self.max_mailboxes {
            return Err(ConfigError::DevicesExceedTable {
                needed,
                available: self.max_mailboxes,
            });
        }
        Ok(())
    }

    /// Number of reserved device mailboxes (clock + disks + terminals)
    pub fn device_mailboxes(&self) -> usize {
        1 + self.disk_units + self.term_units
    }

    /// Table sizing for the core state
    pub fn limits(&self) -> Limits {
        Limits {
            max_mailboxes: self.max_mailboxes,
            max_slots: self.max_slots,
            max_procs: self.max_procs,
            max_message: self.max_message,
        }
    }
}

/// Configuration errors
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// JSON did not parse
    Parse(String),
    /// A field that must be positive is zero
    ZeroSized(&'static str),
    /// The largest message cannot carry a device status
    MessageTooSmall {
        /// Configured message limit
        max_message: usize,
    },
    /// Device mailboxes do not fit in the table
    DevicesExceedTable {
        /// Reserved mailboxes required
        needed: usize,
        /// Table size
        available: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Invalid config: {}", msg),
            ConfigError::ZeroSized(field) => write!(f, "{} must be positive", field),
            ConfigError::MessageTooSmall { max_message } => write!(
                f,
                "max_message {} cannot hold a {}-byte device status",
                max_message, DEVICE_MESSAGE_SIZE
            ),
            ConfigError::DevicesExceedTable { needed, available } => write!(
                f,
                "{} device mailboxes do not fit in a table of {}",
                needed, available
            ),
        }
    }
}
