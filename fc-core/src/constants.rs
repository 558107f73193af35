//! Constants and configuration values for fancontrol
//!
//! Centralizes the fixed paths, PWM values and timing used by the daemon.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Default configuration file (as written by pwmconfig)
    pub const CONFIG_FILE: &str = "/etc/fancontrol";

    /// Lock marker holding the pid of the running instance
    pub const PID_FILE: &str = "/var/run/fancontrol.pid";

    /// Sensor root for absolute attribute paths
    pub const ABSOLUTE_ROOT: &str = "/";

    /// Sensor root for `hwmonN/...` attribute paths
    pub const HWMON_CLASS: &str = "sys/class/hwmon";

    /// Sensor root for `N-XXXX/...` i2c attribute paths
    pub const I2C_DEVICES: &str = "sys/bus/i2c/devices";

    /// Attribute whose presence marks a class device directory
    pub const NAME_ATTRIBUTE: &str = "name";

    /// Path segment dropped when migrating from hard device to class device layout
    pub const DEVICE_SEGMENT: &str = "device";

    /// Suffix of the enable-mode attribute next to a pwm attribute
    pub const ENABLE_SUFFIX: &str = "_enable";
}

/// PWM constants
pub mod pwm {
    /// Maximum PWM value (full speed)
    pub const MAX_VALUE: i64 = 255;

    /// Duty cycle written on enable and restore
    pub const FULL_SPEED: i64 = MAX_VALUE;

    /// Lowest read-back duty cycle accepted as "back at full speed"
    pub const RESTORED_THRESHOLD: i64 = 190;

    /// PWM enable values
    pub mod enable {
        /// PWM control disabled (fan runs at full speed)
        pub const DISABLED: i64 = 0;
        /// Manual PWM control
        pub const MANUAL: i64 = 1;
    }
}

/// Temperature constants
pub mod temperature {
    /// Temperature readings are in millidegrees
    pub const MILLIDEGREES_PER_DEGREE: i64 = 1000;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Delay after kicking a stalled fan with MINSTART before writing the target
    pub const STALL_SETTLE_DELAY: Duration = Duration::from_secs(1);
}

/// Size limits
pub mod limits {
    /// Mapping count above which a warning is logged. Not enforced.
    pub const SOFT_MAX_MAPPINGS: usize = 32;

    /// Bytes read from an attribute file when parsing its value
    pub const ATTRIBUTE_READ_BYTES: u64 = 11;
}
