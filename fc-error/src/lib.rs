//! Unified error handling for fancontrol-rs
//!
//! Every fatal condition the daemon can hit maps to one of the types below.
//! They use thiserror for Display/Error impls. All of them end the process
//! with exit code 1; the only non-fatal failure (a channel that refuses to
//! return to full speed during restore) is not an error at all but a
//! `DisableOutcome` in fc-core.

use std::io;
use std::path::PathBuf;

/// Result type alias using FancontrolError
pub type Result<T> = std::result::Result<T, FancontrolError>;

/// Problems found while parsing or validating the configuration text.
///
/// All of these happen before any hardware is touched.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Can't read configuration file {path}: {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("Some mandatory settings missing, please check your config file! ({0})")]
    MissingField(&'static str),

    #[error("Config error ({channel}): {reason}")]
    MalformedMapping { channel: String, reason: String },

    #[error("Config error ({channel}): multiple fans per input currently unsupported ({fans})")]
    UnsupportedFanGroup { channel: String, fans: String },

    #[error("Config error ({channel}): {reason}")]
    InvalidRange { channel: String, reason: &'static str },
}

impl ConfigError {
    /// Create a malformed mapping error
    pub fn malformed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedMapping {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// How an attribute must be accessible for the daemon to work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A referenced sysfs attribute that is missing or has the wrong access mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAttribute {
    pub path: String,
    pub access: Access,
}

impl std::fmt::Display for MissingAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.access {
            Access::Write => write!(f, "{} doesn't exist or isn't writable", self.path),
            Access::Read => write!(f, "{} doesn't exist or isn't readable", self.path),
        }
    }
}

/// Sensor root and attribute path problems, detected before enabling
#[derive(thiserror::Error, Debug)]
pub enum PathError {
    #[error("Invalid path to sensors: {0}")]
    Unrecognized(String),

    #[error("No sensors found in {0}! (did you load the necessary modules?)")]
    RootNotFound(PathBuf),

    #[error("{} referenced file(s) missing: {}", .0.len(), join_missing(.0))]
    MissingSysfsNode(Vec<MissingAttribute>),
}

fn join_missing(missing: &[MissingAttribute]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure to read or write a single attribute file.
///
/// Keeps "file is absent" apart from "file is there but holds garbage".
#[derive(thiserror::Error, Debug)]
pub enum SysfsError {
    #[error("{0} not found")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("No integer in {path} (read {content:?})")]
    Parse { path: PathBuf, content: String },
}

impl SysfsError {
    /// Classify an io::Error raised while accessing `path`
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Path of the attribute that failed
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound(path) => path,
            Self::Io { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

/// What the daemon was doing with a sensor when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorOp {
    ReadTemperature,
    ReadPwm,
    ReadFan,
    WritePwm,
}

impl std::fmt::Display for SensorOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ReadTemperature => "reading temperature",
            Self::ReadPwm => "reading PWM value",
            Self::ReadFan => "reading fan value",
            Self::WritePwm => "writing PWM value",
        };
        f.write_str(s)
    }
}

/// Unified error type for all fancontrol operations
#[derive(thiserror::Error, Debug)]
pub enum FancontrolError {
    // ============================================================================
    // Startup validation
    // ============================================================================
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Path(#[from] PathError),

    // ============================================================================
    // Hardware access
    // ============================================================================
    #[error("Error {op} for {channel}: {source}")]
    Sensor {
        channel: String,
        op: SensorOp,
        source: SysfsError,
    },

    #[error("Error enabling PWM on {channel}: {source}")]
    Enable { channel: String, source: SysfsError },

    // ============================================================================
    // Process lock marker
    // ============================================================================
    #[error("File {0} exists, is fancontrol already running?")]
    AlreadyRunning(PathBuf),

    #[error("Lock file {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },
}

impl FancontrolError {
    /// Create a sensor error for `channel`
    pub fn sensor(channel: impl Into<String>, op: SensorOp, source: SysfsError) -> Self {
        Self::Sensor {
            channel: channel.into(),
            op,
            source,
        }
    }

    /// Process exit code for this error. Every error here is fatal.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
