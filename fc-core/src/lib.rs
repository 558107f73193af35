//! fancontrol core library
//!
//! Temperature-driven fan control over hwmon pwm attributes.
//!
//! # Module Structure
//!
//! - `config` - pwmconfig-style configuration file parsing and validation
//! - `paths` - sensor root detection, legacy path fixup, attribute checks
//! - `sysfs` - attribute store abstraction (real sysfs and in-memory)
//! - `control` - duty-cycle computation and the per-tick update
//! - `lifecycle` - enable/disable state machine and the restore path
//! - `lock` - single-instance pid marker
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use fc_core::{load_config, ControlLoop, PathResolver, SysfsStore};
//!
//! let (config, _hints) = load_config(Path::new("/etc/fancontrol")).unwrap();
//! let root = PathResolver::new().resolve_root(&config).unwrap();
//! let store = SysfsStore::new(root.dir);
//! ControlLoop::new(&config, &store).tick().unwrap();
//! ```

pub mod config;
pub mod constants;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod paths;
pub mod sysfs;

// Re-export error types
pub use error::{FancontrolError, Result};

pub use config::{load_config, Configuration, DeviceHints, DutyCurve, Mapping};
pub use control::{compute_target, Band, ControlLoop, Target};
pub use lifecycle::{DisableOutcome, LifecycleManager, LifecycleState};
pub use lock::PidLock;
pub use paths::{fixup_legacy_paths, verify_attributes, PathResolver, RootKind, SensorRoot};
pub use sysfs::{AttributeStore, MemoryStore, SysfsStore};
