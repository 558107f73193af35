//! Duty-cycle control
//!
//! Each tick reads the current temperature of every channel and maps it onto
//! a piecewise-linear curve:
//!
//! ```text
//!  pwm
//!  maxPwm |                 ________
//!         |               /
//!         |             /
//!  minStop|           /
//!         |           |
//!  minPwm |___________|
//!         +-----------+-----+-------- temp
//!                  minTemp maxTemp
//! ```
//!
//! The ramp starts at MINSTOP, the lowest duty cycle a fan that is already
//! spinning keeps turning at. A fan that is found stopped while the ramp
//! applies is kicked with MINSTART first.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{Configuration, DutyCurve, Mapping};
use crate::constants::{temperature, timing};
use crate::error::{FancontrolError, Result, SensorOp};
use crate::sysfs::AttributeStore;

/// Which part of the curve a temperature falls on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// At or below MINTEMP
    Idle,
    /// Between MINTEMP and MAXTEMP
    Ramp,
    /// At or above MAXTEMP
    Full,
}

/// Computed duty cycle for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub band: Band,
    pub pwm: i64,
}

/// Map a temperature in millidegrees onto the channel's curve.
///
/// Integer arithmetic with truncating division.
pub fn compute_target(curve: &DutyCurve, temp_milli: i64) -> Target {
    let min_t = i64::from(curve.min_temp) * temperature::MILLIDEGREES_PER_DEGREE;
    let max_t = i64::from(curve.max_temp) * temperature::MILLIDEGREES_PER_DEGREE;
    let min_stop = i64::from(curve.min_stop);
    let max_pwm = i64::from(curve.max_pwm);

    if temp_milli <= min_t {
        Target { band: Band::Idle, pwm: i64::from(curve.min_pwm) }
    } else if temp_milli >= max_t {
        Target { band: Band::Full, pwm: max_pwm }
    } else {
        let pwm = (temp_milli - min_t) * (max_pwm - min_stop) / (max_t - min_t) + min_stop;
        Target { band: Band::Ramp, pwm }
    }
}

/// Per-tick control over all configured channels
pub struct ControlLoop<'a, S: AttributeStore + ?Sized> {
    configuration: &'a Configuration,
    store: &'a S,
    settle_delay: Duration,
}

impl<'a, S: AttributeStore + ?Sized> ControlLoop<'a, S> {
    pub fn new(configuration: &'a Configuration, store: &'a S) -> Self {
        Self {
            configuration,
            store,
            settle_delay: timing::STALL_SETTLE_DELAY,
        }
    }

    /// Override the pause between the MINSTART kick and the target write
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Update every channel in configuration order.
    ///
    /// Stops at the first failing channel. Writes already issued to earlier
    /// channels in this tick stay in place.
    pub fn tick(&self) -> Result<()> {
        for mapping in self.configuration.mappings() {
            self.tick_mapping(mapping)?;
        }
        Ok(())
    }

    /// Read, compute and write one channel. Returns the duty cycle written.
    pub fn tick_mapping(&self, mapping: &Mapping) -> Result<i64> {
        let channel = mapping.pwm_path();

        let temp = self
            .store
            .read(mapping.temp_path())
            .map_err(|e| FancontrolError::sensor(channel, SensorOp::ReadTemperature, e))?;

        let current = self
            .store
            .read(channel)
            .map_err(|e| FancontrolError::sensor(channel, SensorOp::ReadPwm, e))?;

        // Without a tachometer the fan is assumed to be turning
        let fan = match mapping.fan_path() {
            Some(fan_path) => self
                .store
                .read(fan_path)
                .map_err(|e| FancontrolError::sensor(channel, SensorOp::ReadFan, e))?,
            None => 1,
        };

        let target = compute_target(mapping.curve(), temp);

        if target.band == Band::Ramp && (current == 0 || fan == 0) {
            let min_start = i64::from(mapping.curve().min_start);
            info!(
                channel = %channel,
                pwm = current,
                fan,
                min_start,
                "Fan stopped, starting it with MINSTART"
            );
            self.write_pwm(channel, min_start)?;
            thread::sleep(self.settle_delay);
        }

        self.write_pwm(channel, target.pwm)?;
        debug!(
            channel = %channel,
            temp,
            pwm = target.pwm,
            band = ?target.band,
            "Updated fan speed"
        );
        Ok(target.pwm)
    }

    fn write_pwm(&self, channel: &str, value: i64) -> Result<()> {
        self.store
            .write(channel, value)
            .map_err(|e| FancontrolError::sensor(channel, SensorOp::WritePwm, e))
    }
}
