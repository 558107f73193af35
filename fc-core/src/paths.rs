//! Sensor root detection and attribute path checks
//!
//! Attribute paths in the configuration are usually relative. Which
//! directory they are relative to depends on how the first pwm path looks:
//!
//! | first pwm path           | root                   |
//! |--------------------------|------------------------|
//! | `/...`                   | `/`                    |
//! | `hwmonN/...`             | `/sys/class/hwmon`     |
//! | `N-XXXX/...` (i2c name)  | `/sys/bus/i2c/devices` |
//!
//! Some drivers moved their attributes from the hard device directory to the
//! class device directory, so hwmon configurations written for older kernels
//! can carry a stale `device/` segment. [`fixup_legacy_paths`] rewrites those.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{error, info};

use crate::config::{Configuration, DeviceHints, Mapping};
use crate::constants::paths;
use crate::error::{Access, MissingAttribute, PathError};
use crate::sysfs::AttributeStore;

/// Which directory relative attribute paths are resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Absolute,
    HwmonClass,
    I2cBus,
}

fn is_i2c_device_name(path: &str) -> bool {
    static I2C_NAME: OnceLock<Option<Regex>> = OnceLock::new();
    I2C_NAME
        .get_or_init(|| Regex::new(r"^[0-9]+-").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(path))
}

impl RootKind {
    /// Classify the sensor root from the first configured pwm path
    pub fn classify(first_pwm_path: &str) -> Result<Self, PathError> {
        if first_pwm_path.starts_with('/') {
            Ok(Self::Absolute)
        } else if first_pwm_path.starts_with("hwmon") {
            Ok(Self::HwmonClass)
        } else if is_i2c_device_name(first_pwm_path) {
            Ok(Self::I2cBus)
        } else {
            Err(PathError::Unrecognized(first_pwm_path.to_string()))
        }
    }

    /// Root directory relative to the filesystem prefix
    pub fn relative_dir(&self) -> &'static str {
        match self {
            Self::Absolute => "",
            Self::HwmonClass => paths::HWMON_CLASS,
            Self::I2cBus => paths::I2C_DEVICES,
        }
    }
}

/// A classified and existing sensor root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRoot {
    pub kind: RootKind,
    pub dir: PathBuf,
}

/// Finds the sensor root below a filesystem prefix (`/` outside of tests)
#[derive(Debug, Clone)]
pub struct PathResolver {
    prefix: PathBuf,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    pub fn new() -> Self {
        Self::with_prefix(paths::ABSOLUTE_ROOT)
    }

    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Classify the root from the first mapping and check that it is a directory
    pub fn resolve_root(&self, configuration: &Configuration) -> Result<SensorRoot, PathError> {
        let first = configuration
            .mappings()
            .first()
            .map(Mapping::pwm_path)
            .unwrap_or_default();
        let kind = RootKind::classify(first)?;
        let dir = self.root_dir(kind);

        if !dir.is_dir() {
            return Err(PathError::RootNotFound(dir));
        }
        info!(root = %dir.display(), ?kind, "Sensor root resolved");
        Ok(SensorRoot { kind, dir })
    }

    fn root_dir(&self, kind: RootKind) -> PathBuf {
        let rel = kind.relative_dir();
        if rel.is_empty() {
            self.prefix.clone()
        } else {
            self.prefix.join(rel)
        }
    }
}

/// Rewrite `<path>/device/...` to `<path>/...` for every hinted device
/// directory that has a `name` attribute of its own.
///
/// Returns a new configuration; the input is left untouched.
pub fn fixup_legacy_paths<S: AttributeStore + ?Sized>(
    configuration: &Configuration,
    hints: &DeviceHints,
    store: &S,
) -> Configuration {
    let mut mappings: Vec<Mapping> = configuration.mappings().to_vec();

    for (alias, _) in &hints.devpath {
        let name_attr = format!("{}/{}", alias, paths::NAME_ATTRIBUTE);
        if !store.exists(&name_attr) {
            continue;
        }
        let legacy = format!("{}/{}/", alias, paths::DEVICE_SEGMENT);
        let class = format!("{}/", alias);

        mappings = mappings
            .iter()
            .map(|m| {
                let pwm = rewrite(m.pwm_path(), &legacy, &class);
                let temp = rewrite(m.temp_path(), &legacy, &class);
                let fan = m.fan_path().map(|f| rewrite(f, &legacy, &class));
                m.with_paths(pwm, temp, fan)
            })
            .collect();
    }

    configuration.with_mappings(mappings)
}

fn rewrite(path: &str, legacy: &str, class: &str) -> String {
    if !path.contains(legacy) {
        return path.to_string();
    }
    let adjusted = path.replacen(legacy, class, 1);
    info!("Adjusting {} -> {}", path, adjusted);
    adjusted
}

/// Check every referenced attribute, collecting all failures before
/// reporting them together.
pub fn verify_attributes<S: AttributeStore + ?Sized>(
    configuration: &Configuration,
    store: &S,
) -> Result<(), PathError> {
    let mut missing = Vec::new();

    for m in configuration.mappings() {
        if !store.is_writable(m.pwm_path()) {
            missing.push(MissingAttribute {
                path: m.pwm_path().to_string(),
                access: Access::Write,
            });
        }
        if !store.is_readable(m.temp_path()) {
            missing.push(MissingAttribute {
                path: m.temp_path().to_string(),
                access: Access::Read,
            });
        }
        if let Some(fan) = m.fan_path() {
            if !store.is_readable(fan) {
                missing.push(MissingAttribute {
                    path: fan.to_string(),
                    access: Access::Read,
                });
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    for m in &missing {
        error!("Error: File {}", m);
    }
    error!(
        "At least one referenced file is missing. Either some required kernel \
         modules haven't been loaded, or your configuration file is outdated. \
         In the latter case, you should run pwmconfig again."
    );
    Err(PathError::MissingSysfsNode(missing))
}
