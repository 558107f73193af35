//! Configuration loading and validation
//!
//! Parses the line-oriented `KEY=value` format written by pwmconfig:
//!
//! ```text
//! INTERVAL=10
//! DEVPATH=hwmon0=devices/platform/nct6775.2592
//! DEVNAME=hwmon0=nct6779
//! FCTEMPS=hwmon0/pwm1=hwmon0/temp1_input
//! FCFANS=hwmon0/pwm1=hwmon0/fan1_input
//! MINTEMP=hwmon0/pwm1=40
//! MAXTEMP=hwmon0/pwm1=70
//! MINSTART=hwmon0/pwm1=150
//! MINSTOP=hwmon0/pwm1=100
//! ```
//!
//! `FCTEMPS` defines the channels and their order. Every other per-channel
//! list is looked up by the channel's pwm key. The whole file is validated
//! before anything is returned; there is no partial configuration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::constants::{limits, pwm};
use crate::error::ConfigError;

/// Duty-cycle curve settings for one channel.
///
/// Temperatures are in degrees, duty cycles in raw PWM units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCurve {
    pub min_temp: i32,
    pub max_temp: i32,
    pub min_start: i32,
    pub min_stop: i32,
    pub min_pwm: i32,
    pub max_pwm: i32,
}

impl DutyCurve {
    /// Check the ordering constraints between the settings.
    ///
    /// Rules are checked in a fixed order and the first violation is returned.
    pub fn check(&self) -> Result<(), &'static str> {
        if self.min_temp >= self.max_temp {
            return Err("MINTEMP must be less than MAXTEMP");
        }
        if i64::from(self.max_pwm) > pwm::MAX_VALUE {
            return Err("MAXPWM must be at most 255");
        }
        if self.min_stop >= self.max_pwm {
            return Err("MINSTOP must be less than MAXPWM");
        }
        if self.min_stop < self.min_pwm {
            return Err("MINSTOP must be greater than or equal to MINPWM");
        }
        if self.min_pwm < 0 {
            return Err("MINPWM must be at least 0");
        }
        Ok(())
    }
}

/// One controlled fan channel. Only constructible through [`Mapping::new`],
/// so every `Mapping` in existence satisfies [`DutyCurve::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pwm_path: String,
    temp_path: String,
    fan_path: Option<String>,
    curve: DutyCurve,
}

impl Mapping {
    pub fn new(
        pwm_path: impl Into<String>,
        temp_path: impl Into<String>,
        fan_path: Option<String>,
        curve: DutyCurve,
    ) -> Result<Self, ConfigError> {
        let pwm_path = pwm_path.into();
        if let Some(fans) = fan_path.as_deref() {
            if fans.contains('+') {
                return Err(ConfigError::UnsupportedFanGroup {
                    channel: pwm_path,
                    fans: fans.to_string(),
                });
            }
        }
        curve.check().map_err(|reason| ConfigError::InvalidRange {
            channel: pwm_path.clone(),
            reason,
        })?;
        Ok(Self {
            pwm_path,
            temp_path: temp_path.into(),
            fan_path,
            curve,
        })
    }

    /// Copy of this mapping pointing at different attribute paths.
    /// The curve was validated already and is kept as is.
    pub fn with_paths(&self, pwm_path: String, temp_path: String, fan_path: Option<String>) -> Self {
        Self {
            pwm_path,
            temp_path,
            fan_path,
            curve: self.curve,
        }
    }

    /// The pwm attribute, which is also the channel key
    pub fn pwm_path(&self) -> &str {
        &self.pwm_path
    }

    pub fn temp_path(&self) -> &str {
        &self.temp_path
    }

    pub fn fan_path(&self) -> Option<&str> {
        self.fan_path.as_deref()
    }

    /// The enable-mode attribute that sits next to the pwm attribute
    pub fn enable_path(&self) -> String {
        format!("{}{}", self.pwm_path, crate::constants::paths::ENABLE_SUFFIX)
    }

    pub fn curve(&self) -> &DutyCurve {
        &self.curve
    }
}

/// Validated, immutable daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    interval: u64,
    mappings: Vec<Mapping>,
}

impl Configuration {
    /// Assemble a configuration from already validated mappings
    pub fn new(interval: u64, mappings: Vec<Mapping>) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::MissingField("INTERVAL"));
        }
        if mappings.is_empty() {
            return Err(ConfigError::MissingField("FCTEMPS"));
        }
        Ok(Self { interval, mappings })
    }

    /// Parse configuration text using the default soft mapping limit
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::parse_with_limit(text, limits::SOFT_MAX_MAPPINGS)
    }

    /// Parse configuration text. Exceeding `soft_limit` mappings only warns.
    pub fn parse_with_limit(text: &str, soft_limit: usize) -> Result<Self, ConfigError> {
        let keys = RawKeys::parse(text);

        let interval = keys
            .get("INTERVAL")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .ok_or(ConfigError::MissingField("INTERVAL"))?;

        let fctemps = keys.require("FCTEMPS")?;
        let min_temp = keys.require_list("MINTEMP")?;
        let max_temp = keys.require_list("MAXTEMP")?;
        let min_start = keys.require_list("MINSTART")?;
        let min_stop = keys.require_list("MINSTOP")?;
        let fcfans = keys.list("FCFANS");
        let min_pwm = keys.list("MINPWM");
        let max_pwm = keys.list("MAXPWM");

        let mut mappings: Vec<Mapping> = Vec::new();
        for token in fctemps.split_whitespace() {
            let (pwm_key, temp_key) = split_pair(token).ok_or_else(|| {
                ConfigError::malformed(token, "FCTEMPS value is improperly formatted")
            })?;

            if mappings.iter().any(|m| m.pwm_path() == pwm_key) {
                return Err(ConfigError::malformed(pwm_key, "channel listed twice in FCTEMPS"));
            }

            let fan_path = fcfans
                .as_ref()
                .and_then(|l| l.get(pwm_key))
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let curve = DutyCurve {
                min_temp: required_int(&min_temp, "MINTEMP", pwm_key)?,
                max_temp: required_int(&max_temp, "MAXTEMP", pwm_key)?,
                min_start: required_int(&min_start, "MINSTART", pwm_key)?,
                min_stop: required_int(&min_stop, "MINSTOP", pwm_key)?,
                min_pwm: optional_int(min_pwm.as_ref(), "MINPWM", pwm_key)?.unwrap_or(0),
                max_pwm: optional_int(max_pwm.as_ref(), "MAXPWM", pwm_key)?
                    .unwrap_or(pwm::MAX_VALUE as i32),
            };

            mappings.push(Mapping::new(pwm_key, temp_key, fan_path, curve)?);
        }

        if mappings.len() > soft_limit {
            warn!(
                count = mappings.len(),
                limit = soft_limit,
                "More fan channels configured than usual"
            );
        }

        Self::new(interval as u64, mappings)
    }

    /// Seconds between two control ticks
    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Same interval, new mappings. Used by path fixup.
    pub(crate) fn with_mappings(&self, mappings: Vec<Mapping>) -> Self {
        Self {
            interval: self.interval,
            mappings,
        }
    }

    /// Log the effective settings, one block per channel
    pub fn log_summary(&self) {
        info!("Common settings: INTERVAL={}", self.interval);
        for m in &self.mappings {
            let c = m.curve();
            info!(
                channel = %m.pwm_path(),
                temp = %m.temp_path(),
                fan = %m.fan_path().unwrap_or("none"),
                min_temp = c.min_temp,
                max_temp = c.max_temp,
                min_start = c.min_start,
                min_stop = c.min_stop,
                min_pwm = c.min_pwm,
                max_pwm = c.max_pwm,
                "Settings for channel"
            );
        }
    }
}

/// `alias=path` device hints from `DEVPATH`.
///
/// Only the legacy path fixup looks at these; they are dropped afterwards.
/// `DEVNAME` is accepted in the file but carries nothing the daemon uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHints {
    pub devpath: Vec<(String, String)>,
}

impl DeviceHints {
    pub fn parse(text: &str) -> Self {
        let keys = RawKeys::parse(text);
        Self {
            devpath: hint_pairs(keys.get("DEVPATH"), "DEVPATH"),
        }
    }
}

fn hint_pairs(value: Option<&str>, key: &str) -> Vec<(String, String)> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .split_whitespace()
        .filter_map(|token| match split_pair(token) {
            Some((alias, path)) => Some((alias.to_string(), path.to_string())),
            None => {
                warn!(key, token, "Ignoring malformed device hint");
                None
            }
        })
        .collect()
}

/// Read a configuration file and parse it into configuration plus hints
pub fn load_config(path: &Path) -> Result<(Configuration, DeviceHints), ConfigError> {
    info!("Loading configuration from {}...", path.display());
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let configuration = Configuration::parse(&text)?;
    configuration.log_summary();
    Ok((configuration, DeviceHints::parse(&text)))
}

// ============================================================================
// Raw key handling
// ============================================================================

/// The last value seen for each recognized `KEY=` line
struct RawKeys<'a> {
    values: HashMap<&'a str, &'a str>,
}

const KNOWN_KEYS: &[&str] = &[
    "INTERVAL", "DEVPATH", "DEVNAME", "FCTEMPS", "FCFANS", "MINTEMP", "MAXTEMP", "MINSTART",
    "MINSTOP", "MINPWM", "MAXPWM",
];

impl<'a> RawKeys<'a> {
    fn parse(text: &'a str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            if line.starts_with('#') {
                continue;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if KNOWN_KEYS.contains(&key) {
                values.insert(key, value);
            }
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.values.get(key).copied()
    }

    fn require(&self, key: &'static str) -> Result<&'a str, ConfigError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingField(key))
    }

    fn require_list(&self, key: &'static str) -> Result<KeyedList<'a>, ConfigError> {
        self.require(key).map(KeyedList::parse)
    }

    fn list(&self, key: &str) -> Option<KeyedList<'a>> {
        self.get(key).map(KeyedList::parse)
    }
}

/// A space separated `key=value` list, looked up by exact key
struct KeyedList<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> KeyedList<'a> {
    fn parse(value: &'a str) -> Self {
        let entries = value
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .collect();
        Self { entries }
    }

    /// First value for `key`
    fn get(&self, key: &str) -> Option<&'a str> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }
}

/// Split `left=right` with both sides non-empty
fn split_pair(token: &str) -> Option<(&str, &str)> {
    let (left, right) = token.split_once('=')?;
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}

fn parse_int(value: &str, field: &str, channel: &str) -> Result<i32, ConfigError> {
    value
        .parse::<i32>()
        .map_err(|_| ConfigError::malformed(channel, format!("{} value {:?} is not an integer", field, value)))
}

fn required_int(list: &KeyedList<'_>, field: &str, channel: &str) -> Result<i32, ConfigError> {
    let value = list
        .get(channel)
        .ok_or_else(|| ConfigError::malformed(channel, format!("no {} entry for this channel", field)))?;
    parse_int(value, field, channel)
}

fn optional_int(list: Option<&KeyedList<'_>>, field: &str, channel: &str) -> Result<Option<i32>, ConfigError> {
    match list.and_then(|l| l.get(channel)) {
        Some(value) => parse_int(value, field, channel).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
INTERVAL=5
FCTEMPS=pwm1=temp1
MINTEMP=pwm1=20
MAXTEMP=pwm1=60
MINSTART=pwm1=150
MINSTOP=pwm1=100
";

    fn curve(min_temp: i32, max_temp: i32, min_stop: i32, min_pwm: i32, max_pwm: i32) -> DutyCurve {
        DutyCurve { min_temp, max_temp, min_start: 150, min_stop, min_pwm, max_pwm }
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = Configuration::parse(MINIMAL).unwrap();
        assert_eq!(config.interval(), 5);
        assert_eq!(config.mappings().len(), 1);

        let m = &config.mappings()[0];
        assert_eq!(m.pwm_path(), "pwm1");
        assert_eq!(m.temp_path(), "temp1");
        assert_eq!(m.fan_path(), None);
        assert_eq!(m.enable_path(), "pwm1_enable");
        assert_eq!(m.curve().min_pwm, 0);
        assert_eq!(m.curve().max_pwm, 255);
        assert_eq!(m.curve().min_temp, 20);
        assert_eq!(m.curve().max_temp, 60);
        assert_eq!(m.curve().min_start, 150);
        assert_eq!(m.curve().min_stop, 100);
    }

    #[test]
    fn test_full_config_two_channels() {
        let text = "\
# Configuration file generated by pwmconfig
INTERVAL=10
DEVPATH=hwmon0=devices/platform/it87.656
DEVNAME=hwmon0=it8728
FCTEMPS=hwmon0/pwm1=hwmon0/temp1_input hwmon0/pwm2=hwmon0/temp2_input
FCFANS=hwmon0/pwm1=hwmon0/fan1_input hwmon0/pwm2=
MINTEMP=hwmon0/pwm1=40 hwmon0/pwm2=35
MAXTEMP=hwmon0/pwm1=70 hwmon0/pwm2=65
MINSTART=hwmon0/pwm1=150 hwmon0/pwm2=120
MINSTOP=hwmon0/pwm1=100 hwmon0/pwm2=80
MINPWM=hwmon0/pwm2=30
MAXPWM=hwmon0/pwm1=200
";
        let config = Configuration::parse(text).unwrap();
        let m = config.mappings();
        assert_eq!(m.len(), 2);

        assert_eq!(m[0].pwm_path(), "hwmon0/pwm1");
        assert_eq!(m[0].fan_path(), Some("hwmon0/fan1_input"));
        assert_eq!(m[0].curve().max_pwm, 200);
        assert_eq!(m[0].curve().min_pwm, 0);

        assert_eq!(m[1].pwm_path(), "hwmon0/pwm2");
        assert_eq!(m[1].fan_path(), None);
        assert_eq!(m[1].curve().min_pwm, 30);
        assert_eq!(m[1].curve().max_pwm, 255);

        let hints = DeviceHints::parse(text);
        assert_eq!(hints.devpath, vec![("hwmon0".into(), "devices/platform/it87.656".into())]);
    }

    #[test]
    fn test_comment_lines_are_ignored() {
        let text = format!("#INTERVAL=0\n{}#MINTEMP=pwm1=90\n", MINIMAL);
        let config = Configuration::parse(&text).unwrap();
        assert_eq!(config.interval(), 5);
        assert_eq!(config.mappings()[0].curve().min_temp, 20);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = MINIMAL.replace('\n', "\r\n");
        let config = Configuration::parse(&text).unwrap();
        assert_eq!(config.mappings()[0].curve().min_stop, 100);
    }

    #[test]
    fn test_interval_missing_or_not_positive() {
        for bad in ["", "INTERVAL=0\n", "INTERVAL=-3\n", "INTERVAL=soon\n"] {
            let text = MINIMAL.replace("INTERVAL=5\n", bad);
            assert!(
                matches!(Configuration::parse(&text), Err(ConfigError::MissingField("INTERVAL"))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_mandatory_list_missing() {
        let text = MINIMAL.replace("MINSTOP=pwm1=100\n", "");
        assert!(matches!(Configuration::parse(&text), Err(ConfigError::MissingField("MINSTOP"))));

        let text = MINIMAL.replace("FCTEMPS=pwm1=temp1\n", "");
        assert!(matches!(Configuration::parse(&text), Err(ConfigError::MissingField("FCTEMPS"))));
    }

    #[test]
    fn test_malformed_fctemps_token() {
        let text = MINIMAL.replace("FCTEMPS=pwm1=temp1", "FCTEMPS=pwm1");
        assert!(matches!(Configuration::parse(&text), Err(ConfigError::MalformedMapping { .. })));
    }

    #[test]
    fn test_missing_channel_entry_names_channel() {
        let text = MINIMAL.replace("MAXTEMP=pwm1=60", "MAXTEMP=pwm2=60");
        match Configuration::parse(&text) {
            Err(ConfigError::MalformedMapping { channel, reason }) => {
                assert_eq!(channel, "pwm1");
                assert!(reason.contains("MAXTEMP"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_integer_value_rejected() {
        let text = MINIMAL.replace("MINSTART=pwm1=150", "MINSTART=pwm1=fast");
        assert!(matches!(Configuration::parse(&text), Err(ConfigError::MalformedMapping { .. })));
    }

    #[test]
    fn test_fan_group_rejected() {
        let text = format!("{}FCFANS=pwm1=fan1_input+fan2_input\n", MINIMAL);
        match Configuration::parse(&text) {
            Err(ConfigError::UnsupportedFanGroup { channel, fans }) => {
                assert_eq!(channel, "pwm1");
                assert_eq!(fans, "fan1_input+fan2_input");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_min_temp_above_max_temp_rejected() {
        let text = MINIMAL
            .replace("MINTEMP=pwm1=20", "MINTEMP=pwm1=80")
            .replace("MAXTEMP=pwm1=60", "MAXTEMP=pwm1=70");
        match Configuration::parse(&text) {
            Err(ConfigError::InvalidRange { channel, reason }) => {
                assert_eq!(channel, "pwm1");
                assert_eq!(reason, "MINTEMP must be less than MAXTEMP");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_first_invalid_mapping_aborts_load() {
        let text = "\
INTERVAL=5
FCTEMPS=pwm1=temp1 pwm2=temp2
MINTEMP=pwm1=20 pwm2=50
MAXTEMP=pwm1=60 pwm2=50
MINSTART=pwm1=150 pwm2=150
MINSTOP=pwm1=100 pwm2=100
";
        match Configuration::parse(text) {
            Err(ConfigError::InvalidRange { channel, .. }) => assert_eq!(channel, "pwm2"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let text = MINIMAL.replace("FCTEMPS=pwm1=temp1", "FCTEMPS=pwm1=temp1 pwm1=temp2");
        assert!(matches!(Configuration::parse(&text), Err(ConfigError::MalformedMapping { .. })));
    }

    #[test]
    fn test_duty_curve_rules() {
        assert!(curve(20, 60, 100, 0, 255).check().is_ok());
        assert!(curve(20, 60, 0, 0, 1).check().is_ok());
        assert_eq!(curve(60, 60, 100, 0, 255).check(), Err("MINTEMP must be less than MAXTEMP"));
        assert_eq!(curve(20, 60, 100, 0, 256).check(), Err("MAXPWM must be at most 255"));
        assert_eq!(curve(20, 60, 200, 0, 200).check(), Err("MINSTOP must be less than MAXPWM"));
        assert_eq!(
            curve(20, 60, 40, 50, 255).check(),
            Err("MINSTOP must be greater than or equal to MINPWM")
        );
        assert_eq!(curve(20, 60, -5, -10, 255).check(), Err("MINPWM must be at least 0"));
    }

    #[test]
    fn test_soft_limit_only_warns() {
        let mut fctemps = Vec::new();
        let mut lists = vec![Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for i in 0..40 {
            fctemps.push(format!("pwm{i}=temp{i}"));
            lists[0].push(format!("pwm{i}=20"));
            lists[1].push(format!("pwm{i}=60"));
            lists[2].push(format!("pwm{i}=150"));
            lists[3].push(format!("pwm{i}=100"));
        }
        let text = format!(
            "INTERVAL=2\nFCTEMPS={}\nMINTEMP={}\nMAXTEMP={}\nMINSTART={}\nMINSTOP={}\n",
            fctemps.join(" "),
            lists[0].join(" "),
            lists[1].join(" "),
            lists[2].join(" "),
            lists[3].join(" "),
        );
        let config = Configuration::parse_with_limit(&text, 32).unwrap();
        assert_eq!(config.mappings().len(), 40);
        assert_eq!(config.mappings()[39].pwm_path(), "pwm39");
    }

    #[test]
    fn test_load_config_unreadable() {
        let err = load_config(Path::new("/nonexistent/fancontrol")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_later_key_overrides_earlier() {
        let text = format!("INTERVAL=5\n{}INTERVAL=7\nMINTEMP=pwm1=30\n", MINIMAL);
        let config = Configuration::parse(&text).unwrap();
        assert_eq!(config.interval(), 7);
        assert_eq!(config.mappings()[0].curve().min_temp, 30);
    }
}
