//! Enable/disable state machine and the single fail-safe exit path
//!
//! Every fatal condition after the lock marker is created ends in
//! [`LifecycleManager::restore`], which hands the fans back to the hardware
//! (or forces them to full speed) before the process exits.

use tracing::{error, info, warn};

use crate::config::{Configuration, Mapping};
use crate::constants::pwm;
use crate::error::{FancontrolError, Result};
use crate::lock::PidLock;
use crate::sysfs::AttributeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Enabling,
    Running,
    Restoring,
}

/// Result of handing one channel back to automatic control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableOutcome {
    Restored,
    /// The enable attribute kept this value (`None` if it could not be read)
    Stuck(Option<i64>),
}

pub struct LifecycleManager<'a, S: AttributeStore + ?Sized> {
    configuration: &'a Configuration,
    store: &'a S,
    lock: PidLock,
    state: LifecycleState,
    restored: bool,
}

impl<'a, S: AttributeStore + ?Sized> LifecycleManager<'a, S> {
    /// `lock` is released by [`LifecycleManager::restore`]
    pub fn new(configuration: &'a Configuration, store: &'a S, lock: PidLock) -> Self {
        Self {
            configuration,
            store,
            lock,
            state: LifecycleState::Stopped,
            restored: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Put one channel under manual control at full speed
    pub fn enable(&self, mapping: &Mapping) -> Result<()> {
        let channel = mapping.pwm_path();
        let enable_path = mapping.enable_path();

        if self.store.exists(&enable_path) {
            self.store
                .write(&enable_path, pwm::enable::MANUAL)
                .map_err(|source| FancontrolError::Enable { channel: channel.to_string(), source })?;
        }
        self.store
            .write(channel, pwm::FULL_SPEED)
            .map_err(|source| FancontrolError::Enable { channel: channel.to_string(), source })
    }

    /// Enable every configured channel. On error the caller must still
    /// [`restore`](Self::restore), since earlier channels may be enabled.
    pub fn enable_all(&mut self) -> Result<()> {
        info!("Enabling PWM on fans...");
        self.state = LifecycleState::Enabling;
        for mapping in self.configuration.mappings() {
            self.enable(mapping)?;
        }
        self.state = LifecycleState::Running;
        info!("Starting automatic fan control...");
        Ok(())
    }

    /// Return one channel to automatic control, or at least to full speed.
    ///
    /// Individual write failures are not reported; only the read-back
    /// decides the outcome.
    pub fn disable(&self, mapping: &Mapping) -> DisableOutcome {
        let channel = mapping.pwm_path();
        let enable_path = mapping.enable_path();

        if !self.store.exists(&enable_path) {
            self.write_quietly(channel, pwm::FULL_SPEED);
            return DisableOutcome::Restored;
        }

        self.write_quietly(&enable_path, pwm::enable::DISABLED);
        if self.store.read(&enable_path).ok() == Some(pwm::enable::DISABLED) {
            return DisableOutcome::Restored;
        }

        // Some drivers do not support mode 0; fall back to manual full speed
        self.write_quietly(&enable_path, pwm::enable::MANUAL);
        self.write_quietly(channel, pwm::FULL_SPEED);
        let mode = self.store.read(&enable_path).ok();
        let duty = self.store.read(channel).ok();
        if mode == Some(pwm::enable::MANUAL) && duty.is_some_and(|d| d >= pwm::RESTORED_THRESHOLD) {
            return DisableOutcome::Restored;
        }

        match mode {
            Some(value) => error!("{} stuck to {}", enable_path, value),
            None => error!("{} stuck, value unreadable", enable_path),
        }
        DisableOutcome::Stuck(mode)
    }

    /// Disable every channel, drop the lock marker and hand back the exit
    /// code. Only the first call does anything.
    pub fn restore(&mut self, exit_code: i32) -> i32 {
        if self.restored {
            return exit_code;
        }
        self.restored = true;
        self.state = LifecycleState::Restoring;

        info!("Aborting, restoring fans...");
        let mut stuck = 0usize;
        for mapping in self.configuration.mappings() {
            if let DisableOutcome::Stuck(_) = self.disable(mapping) {
                stuck += 1;
            }
        }
        if stuck > 0 {
            warn!("{} channel(s) could not be restored", stuck);
        }

        self.lock.release();
        info!("Verify fans have returned to full speed");
        self.state = LifecycleState::Stopped;
        exit_code
    }

    fn write_quietly(&self, path: &str, value: i64) {
        if let Err(e) = self.store.write(path, value) {
            warn!("Failed to write {} to {}: {}", value, path, e);
        }
    }
}
