//! Process configuration for the mail extension
//!
//! SMTP settings come from the host (see `settings`); this covers only the
//! knobs of the process embedding the extension.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on each SMTP round trip
    pub smtp_timeout: Duration,
    /// EHLO client name sent to the relay
    pub hello_name: Option<String>,
    /// Capacity of the channel-backed event sink
    pub event_buffer: usize,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp_timeout: Duration::from_secs(30),
            hello_name: None,
            event_buffer: 256,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timeout_secs: u64 = lookup("MAILCORE_SMTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("Invalid MAILCORE_SMTP_TIMEOUT_SECS")?;
        if timeout_secs == 0 {
            anyhow::bail!("MAILCORE_SMTP_TIMEOUT_SECS must be greater than zero");
        }

        let event_buffer: usize = lookup("MAILCORE_EVENT_BUFFER")
            .unwrap_or_else(|| "256".to_string())
            .parse()
            .context("Invalid MAILCORE_EVENT_BUFFER")?;
        if event_buffer == 0 {
            anyhow::bail!("MAILCORE_EVENT_BUFFER must be greater than zero");
        }

        let log_format = lookup("MAILCORE_LOG_FORMAT")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "text".to_string());
        if log_format != "text" && log_format != "json" {
            anyhow::bail!("MAILCORE_LOG_FORMAT must be 'text' or 'json', got '{}'", log_format);
        }

        Ok(Self {
            smtp_timeout: Duration::from_secs(timeout_secs),
            hello_name: lookup("MAILCORE_HELLO_NAME")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            event_buffer,
            telemetry: TelemetryConfig {
                log_format,
                metrics_enabled: lookup("MAILCORE_METRICS_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
            },
        })
    }
}
