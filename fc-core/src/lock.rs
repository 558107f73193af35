//! Single-instance lock marker
//!
//! A pid file whose mere existence means another instance is running. It is
//! an advisory existence check, not a kernel lock.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::paths;
use crate::error::{FancontrolError, Result};

#[derive(Debug, Clone)]
pub struct PidLock {
    path: PathBuf,
}

impl Default for PidLock {
    fn default() -> Self {
        Self::new(paths::PID_FILE)
    }
}

impl PidLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail if the marker is already present
    pub fn ensure_absent(&self) -> Result<()> {
        if self.path.exists() {
            return Err(FancontrolError::AlreadyRunning(self.path.clone()));
        }
        Ok(())
    }

    /// Create the marker containing our pid
    pub fn acquire(&self) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(&self.path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => FancontrolError::AlreadyRunning(self.path.clone()),
                _ => FancontrolError::Lock { path: self.path.clone(), source },
            })?;

        writeln!(file, "{}", std::process::id()).map_err(|source| FancontrolError::Lock {
            path: self.path.clone(),
            source,
        })?;

        debug!("PID file written: {}", self.path.display());
        Ok(())
    }

    /// Remove the marker. A marker that is already gone is fine.
    pub fn release(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("PID file removed: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove PID file {}: {}", self.path.display(), e),
        }
    }
}
