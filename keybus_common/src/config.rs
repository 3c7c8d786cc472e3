//! Configuration loading traits and types.
//!
//! `ConfigLoader` loads any `serde`-deserializable type from a TOML file.
//! `KeybusConfig` is the tree read by `keybusd`; every section except
//! `[shared]` has defaults, so a minimal file only names the service.
//!
//! # Usage
//!
//! ```rust,no_run
//! use keybus_common::config::{ConfigError, ConfigLoader, KeybusConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = KeybusConfig::load(Path::new("keybus.toml"))?;
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DATA_HOLD_NS, DECODER_PRIORITY, DEFAULT_QUEUE_WORDS, FRAME_VALIDITY_NS,
    KEYPAD_SAMPLE_OFFSET_NS, MIN_VALID_BITS, PANEL_SAMPLE_OFFSET_NS, POLL_SLICE_NS,
    PREDICTOR_PERIOD_NS, PREDICTOR_PRIORITY, PREFAULT_HEAP_BYTES, SAMPLER_PRIORITY, WORD_BITS,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "keybus-garage"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "keybusd".to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if reading or TOML parsing fails
///
/// Semantic validation is left to the caller.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        let parsed =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(parsed)
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Sections ───────────────────────────────────────────────────────

/// `[bus]`: wiring and timing of the keybus interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// BCM GPIO number of the clock input.
    pub clock_pin: u8,
    /// BCM GPIO number of the data input.
    pub data_in_pin: u8,
    /// BCM GPIO number of the data output.
    pub data_out_pin: u8,
    /// Physical address of the GPIO register block.
    pub gpio_base: u64,
    /// Device exposing physical memory.
    pub mem_device: PathBuf,
    /// Sampler polling slice.
    pub poll_slice_ns: i64,
    /// Panel-read sample offset after the clock falling edge.
    pub panel_sample_offset_ns: i64,
    /// Keypad read-back sample offset after the clock rising edge.
    pub keypad_sample_offset_ns: i64,
    /// Hold time after the keypad sample before releasing the data line.
    pub data_hold_ns: i64,
    /// Gap after which a rising edge starts a new word.
    pub frame_validity_ns: i64,
    /// Frames shorter than this are discarded.
    pub min_valid_bits: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            clock_pin: 13,
            data_in_pin: 5,
            data_out_pin: 16,
            gpio_base: 0x3F20_0000,
            mem_device: PathBuf::from("/dev/mem"),
            poll_slice_ns: POLL_SLICE_NS,
            panel_sample_offset_ns: PANEL_SAMPLE_OFFSET_NS,
            keypad_sample_offset_ns: KEYPAD_SAMPLE_OFFSET_NS,
            data_hold_ns: DATA_HOLD_NS,
            frame_validity_ns: FRAME_VALIDITY_NS,
            min_valid_bits: MIN_VALID_BITS,
        }
    }
}

/// `[queues]`: link queue capacities in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Bus → app (overwrite oldest).
    pub bus_to_app: usize,
    /// App → bus (reject when full).
    pub app_to_bus: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            bus_to_app: DEFAULT_QUEUE_WORDS,
            app_to_bus: DEFAULT_QUEUE_WORDS,
        }
    }
}

/// `[rt]`: scheduling and memory parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RtConfig {
    /// CPU reserved for the sampler.
    pub sampler_cpu: usize,
    /// CPUs shared by the decoder, predictor and responder.
    pub worker_cpus: Vec<usize>,
    /// `SCHED_FIFO` priority of the sampler.
    pub sampler_priority: i32,
    /// `SCHED_FIFO` priority of the decoder and responder.
    pub decoder_priority: i32,
    /// `SCHED_FIFO` priority of the predictor.
    pub predictor_priority: i32,
    /// Heap bytes touched at startup.
    pub prefault_heap_bytes: usize,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            sampler_cpu: 0,
            worker_cpus: vec![1, 2, 3],
            sampler_priority: SAMPLER_PRIORITY,
            decoder_priority: DECODER_PRIORITY,
            predictor_priority: PREDICTOR_PRIORITY,
            prefault_heap_bytes: PREFAULT_HEAP_BYTES,
        }
    }
}

/// `[responder]`: command socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponderConfig {
    /// Listen address.
    pub bind: IpAddr,
    /// Listen port; must be in the dynamic range 49152..=65535.
    pub port: u16,
    /// How long a client may take to send its request line.
    pub read_timeout_ms: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 50_000,
            read_timeout_ms: 2_000,
        }
    }
}

/// `[predictor]`: external prediction collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    /// Collaborator executable.
    pub program: PathBuf,
    /// Leading arguments; timestamp, obs time and zone CSV are appended.
    #[serde(default)]
    pub args: Vec<String>,
    /// File every output line is appended to.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Executable run once when any prediction is positive.
    #[serde(default)]
    pub on_positive: Option<PathBuf>,
    /// Arguments for `on_positive`.
    #[serde(default)]
    pub on_positive_args: Vec<String>,
    /// Wake period.
    #[serde(default = "default_predictor_period")]
    pub period_ns: i64,
}

fn default_predictor_period() -> i64 {
    PREDICTOR_PERIOD_NS
}

// ─── Root ───────────────────────────────────────────────────────────

/// Full `keybusd` configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "keybus"
///
/// [responder]
/// port = 50001
///
/// [predictor]
/// program = "/usr/local/bin/predict"
/// args = ["--model", "/var/lib/keybus/knn.rds"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeybusConfig {
    /// Shared settings.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Bus wiring and timing.
    #[serde(default)]
    pub bus: BusConfig,
    /// Queue capacities.
    #[serde(default)]
    pub queues: QueueConfig,
    /// Real-time parameters.
    #[serde(default)]
    pub rt: RtConfig,
    /// Command socket.
    #[serde(default)]
    pub responder: ResponderConfig,
    /// Prediction collaborator; disabled when absent.
    #[serde(default)]
    pub predictor: Option<PredictorConfig>,
}

impl KeybusConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first failed rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let bus = &self.bus;
        if bus.clock_pin == bus.data_in_pin
            || bus.clock_pin == bus.data_out_pin
            || bus.data_in_pin == bus.data_out_pin
        {
            return Err(invalid("bus pins must be distinct".to_string()));
        }
        if let Some(pin) = [bus.clock_pin, bus.data_in_pin, bus.data_out_pin]
            .into_iter()
            .find(|&p| p > 53)
        {
            return Err(invalid(format!("GPIO {pin} out of range 0..=53")));
        }
        for (name, ns) in [
            ("poll_slice_ns", bus.poll_slice_ns),
            ("panel_sample_offset_ns", bus.panel_sample_offset_ns),
            ("keypad_sample_offset_ns", bus.keypad_sample_offset_ns),
            ("data_hold_ns", bus.data_hold_ns),
            ("frame_validity_ns", bus.frame_validity_ns),
        ] {
            if ns <= 0 {
                return Err(invalid(format!("bus.{name} must be positive")));
            }
        }
        if bus.min_valid_bits == 0 || bus.min_valid_bits > WORD_BITS {
            return Err(invalid(format!(
                "bus.min_valid_bits must be in 1..={WORD_BITS}"
            )));
        }

        if self.queues.bus_to_app < 2 || self.queues.app_to_bus < 2 {
            return Err(invalid("queue capacities must be at least 2 words".to_string()));
        }

        let rt = &self.rt;
        if rt.worker_cpus.is_empty() {
            return Err(invalid("rt.worker_cpus cannot be empty".to_string()));
        }
        if rt.worker_cpus.contains(&rt.sampler_cpu) {
            return Err(invalid(format!(
                "sampler CPU {} must not be a worker CPU",
                rt.sampler_cpu
            )));
        }
        for (name, prio) in [
            ("sampler_priority", rt.sampler_priority),
            ("decoder_priority", rt.decoder_priority),
            ("predictor_priority", rt.predictor_priority),
        ] {
            if !(1..=99).contains(&prio) {
                return Err(invalid(format!("rt.{name} must be in 1..=99")));
            }
        }
        if rt.sampler_priority <= rt.decoder_priority {
            return Err(invalid("sampler priority must be the highest".to_string()));
        }
        if rt.predictor_priority >= rt.decoder_priority {
            return Err(invalid(
                "predictor priority must be below decoder priority".to_string(),
            ));
        }

        if self.responder.port < 49152 {
            return Err(invalid(format!(
                "responder.port {} outside 49152..=65535",
                self.responder.port
            )));
        }
        if self.responder.read_timeout_ms == 0 {
            return Err(invalid("responder.read_timeout_ms must be positive".to_string()));
        }

        if let Some(predictor) = &self.predictor {
            if predictor.program.as_os_str().is_empty() {
                return Err(invalid("predictor.program cannot be empty".to_string()));
            }
            if predictor.period_ns <= 0 {
                return Err(invalid("predictor.period_ns must be positive".to_string()));
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::ValidationError(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            level: LogLevel,
        }
        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let w: Wrapper = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(w.level, level);
        }
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config: KeybusConfig =
            toml::from_str(include_str!("../../config/keybus.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bus, BusConfig::default());
        assert_eq!(config.queues, QueueConfig::default());
        assert_eq!(config.rt, RtConfig::default());
        assert_eq!(config.responder, ResponderConfig::default());
        assert!(config.predictor.is_none());
    }

    #[test]
    fn test_defaults_validate() {
        let config = KeybusConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bus.clock_pin, 13);
        assert_eq!(config.queues.bus_to_app, DEFAULT_QUEUE_WORDS);
        assert!(config.predictor.is_none());
    }

    #[test]
    fn test_load_minimal_file() {
        let file = write_temp("[shared]\nservice_name = \"kb\"\n");
        let config = KeybusConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shared.service_name, "kb");
        assert_eq!(config.responder.port, 50_000);
    }

    #[test]
    fn test_load_full_file() {
        let file = write_temp(
            r#"
[shared]
service_name = "keybus"
log_level = "debug"

[bus]
clock_pin = 17
data_in_pin = 27
data_out_pin = 22

[queues]
bus_to_app = 64
app_to_bus = 8

[rt]
sampler_cpu = 3
worker_cpus = [0, 1, 2]

[responder]
bind = "0.0.0.0"
port = 60000

[predictor]
program = "/usr/bin/predict"
args = ["--vanilla", "knn.R"]
log_file = "/tmp/predict.log"
on_positive = "/usr/bin/notify"
on_positive_args = ["lamp", "ON"]
"#,
        );
        let config = KeybusConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.bus.data_out_pin, 22);
        assert_eq!(config.bus.poll_slice_ns, POLL_SLICE_NS);
        assert_eq!(config.queues.app_to_bus, 8);
        assert_eq!(config.rt.sampler_cpu, 3);
        assert_eq!(config.responder.port, 60000);
        let predictor = config.predictor.unwrap();
        assert_eq!(predictor.args, vec!["--vanilla", "knn.R"]);
        assert_eq!(predictor.period_ns, PREDICTOR_PERIOD_NS);
        assert_eq!(predictor.on_positive_args, vec!["lamp", "ON"]);
    }

    #[test]
    fn test_missing_file() {
        let err = KeybusConfig::load(Path::new("/nonexistent/keybus.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound));
    }

    #[test]
    fn test_parse_error() {
        let file = write_temp("[shared\nservice_name = ");
        let err = KeybusConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_temp("[bus]\nclock_pinn = 4\n");
        let err = KeybusConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    fn rejects(mutate: impl FnOnce(&mut KeybusConfig)) {
        let mut config = KeybusConfig::default();
        mutate(&mut config);
        assert!(
            matches!(config.validate(), Err(ConfigError::ValidationError(_))),
            "{config:?}"
        );
    }

    #[test]
    fn test_validation_rules() {
        rejects(|c| c.shared.service_name.clear());
        rejects(|c| c.bus.data_in_pin = c.bus.clock_pin);
        rejects(|c| c.bus.data_out_pin = 60);
        rejects(|c| c.bus.poll_slice_ns = 0);
        rejects(|c| c.bus.min_valid_bits = WORD_BITS + 1);
        rejects(|c| c.queues.bus_to_app = 1);
        rejects(|c| c.rt.worker_cpus.clear());
        rejects(|c| c.rt.worker_cpus.push(c.rt.sampler_cpu));
        rejects(|c| c.rt.sampler_priority = 100);
        rejects(|c| c.rt.sampler_priority = c.rt.decoder_priority);
        rejects(|c| c.rt.predictor_priority = c.rt.decoder_priority);
        rejects(|c| c.responder.port = 8080);
        rejects(|c| c.responder.read_timeout_ms = 0);
        rejects(|c| {
            c.predictor = Some(PredictorConfig {
                program: PathBuf::new(),
                args: vec![],
                log_file: None,
                on_positive: None,
                on_positive_args: vec![],
                period_ns: PREDICTOR_PERIOD_NS,
            })
        });
    }
}
