//! Attribute file access
//!
//! The daemon only ever talks to hardware through small text pseudo-files
//! (sysfs attributes). [`AttributeStore`] is that key-value view: paths are
//! relative to the sensor root, values are integers.
//!
//! - [`SysfsStore`] is the real thing, rooted at a directory on disk.
//! - [`MemoryStore`] keeps nodes in memory and records every write, for
//!   tests and dry simulations.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::constants::limits;
use crate::error::SysfsError;

/// Integer-valued attribute files, addressed relative to a sensor root
#[cfg_attr(test, mockall::automock)]
pub trait AttributeStore {
    /// Read the leading integer of an attribute
    fn read(&self, path: &str) -> Result<i64, SysfsError>;

    /// Write a decimal value, creating the attribute if absent
    fn write(&self, path: &str, value: i64) -> Result<(), SysfsError>;

    /// Whether the attribute exists at all
    fn exists(&self, path: &str) -> bool;

    /// Whether the attribute exists and may be read
    fn is_readable(&self, path: &str) -> bool;

    /// Whether the attribute exists and may be written
    fn is_writable(&self, path: &str) -> bool;
}

/// Parse the leading integer of attribute content, like strtol.
///
/// Leading whitespace and a sign are accepted; anything after the digits is
/// ignored. Returns None when no digit follows.
pub fn parse_leading_integer(content: &str) -> Option<i64> {
    let s = content.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value: i64 = rest[..digits].parse().ok()?;
    Some(if negative { -value } else { value })
}

// ============================================================================
// Real sysfs
// ============================================================================

/// Attribute store backed by files under `root`
#[derive(Debug, Clone)]
pub struct SysfsStore {
    root: PathBuf,
}

impl SysfsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Full path of an attribute. Absolute attribute paths ignore the root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn access(&self, path: &str, mode: libc::c_int) -> bool {
        let full = self.resolve(path);
        let Ok(c_path) = CString::new(full.as_os_str().as_bytes()) else {
            return false;
        };
        // SAFETY: c_path is a valid NUL-terminated string that outlives the call,
        // and access(2) does not retain the pointer.
        unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
    }
}

impl AttributeStore for SysfsStore {
    fn read(&self, path: &str) -> Result<i64, SysfsError> {
        let full = self.resolve(path);
        let file = File::open(&full).map_err(|e| SysfsError::from_io(&full, e))?;

        let mut bytes = Vec::with_capacity(limits::ATTRIBUTE_READ_BYTES as usize);
        file.take(limits::ATTRIBUTE_READ_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| SysfsError::from_io(&full, e))?;

        let content = String::from_utf8_lossy(&bytes);
        parse_leading_integer(&content).ok_or_else(|| SysfsError::Parse {
            path: full.clone(),
            content: content.trim().to_string(),
        })
    }

    fn write(&self, path: &str, value: i64) -> Result<(), SysfsError> {
        let full = self.resolve(path);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&full)
            .map_err(|e| SysfsError::from_io(&full, e))?;

        file.write_all(value.to_string().as_bytes())
            .map_err(|e| SysfsError::from_io(&full, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.access(path, libc::F_OK)
    }

    fn is_readable(&self, path: &str) -> bool {
        self.access(path, libc::R_OK)
    }

    fn is_writable(&self, path: &str) -> bool {
        self.access(path, libc::W_OK)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    raw: String,
    read_only: bool,
    fail_reads: bool,
    fail_writes: bool,
    /// Writes are accepted but the content never changes
    pinned: bool,
}

impl Node {
    fn new(raw: String) -> Self {
        Self {
            raw,
            read_only: false,
            fail_reads: false,
            fail_writes: false,
            pinned: false,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    nodes: HashMap<String, Node>,
    writes: Vec<(String, i64)>,
}

/// In-memory attribute store with a write log and failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryStore::set`]
    pub fn with_value(self, path: &str, value: i64) -> Self {
        self.set(path, value);
        self
    }

    /// Create or overwrite a node without logging a write
    pub fn set(&self, path: &str, value: i64) {
        self.set_raw(path, &value.to_string());
    }

    /// Store arbitrary content, e.g. something that does not parse
    pub fn set_raw(&self, path: &str, raw: &str) {
        let mut inner = self.inner.lock();
        match inner.nodes.get_mut(path) {
            Some(node) => node.raw = raw.to_string(),
            None => {
                inner.nodes.insert(path.to_string(), Node::new(raw.to_string()));
            }
        }
    }

    pub fn remove(&self, path: &str) {
        self.inner.lock().nodes.remove(path);
    }

    pub fn set_read_only(&self, path: &str) {
        self.update(path, |n| n.read_only = true);
    }

    pub fn fail_reads(&self, path: &str) {
        self.update(path, |n| n.fail_reads = true);
    }

    pub fn fail_writes(&self, path: &str) {
        self.update(path, |n| n.fail_writes = true);
    }

    /// Accept writes to `path` without changing what it reads back
    pub fn pin(&self, path: &str) {
        self.update(path, |n| n.pinned = true);
    }

    fn update(&self, path: &str, f: impl FnOnce(&mut Node)) {
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .entry(path.to_string())
            .or_insert_with(|| Node::new(String::new()));
        f(node);
    }

    /// Current value of a node, if it holds an integer
    pub fn value(&self, path: &str) -> Option<i64> {
        let inner = self.inner.lock();
        inner.nodes.get(path).and_then(|n| parse_leading_integer(&n.raw))
    }

    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<(String, i64)> {
        self.inner.lock().writes.clone()
    }

    /// Accepted writes to one attribute, in order
    pub fn writes_to(&self, path: &str) -> Vec<i64> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().writes.clear();
    }
}

impl AttributeStore for MemoryStore {
    fn read(&self, path: &str) -> Result<i64, SysfsError> {
        let inner = self.inner.lock();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| SysfsError::NotFound(PathBuf::from(path)))?;
        if node.fail_reads {
            return Err(SysfsError::Io {
                path: PathBuf::from(path),
                source: io::Error::new(io::ErrorKind::Other, "injected read failure"),
            });
        }
        parse_leading_integer(&node.raw).ok_or_else(|| SysfsError::Parse {
            path: PathBuf::from(path),
            content: node.raw.clone(),
        })
    }

    fn write(&self, path: &str, value: i64) -> Result<(), SysfsError> {
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .entry(path.to_string())
            .or_insert_with(|| Node::new(String::new()));
        if node.read_only {
            return Err(SysfsError::Io {
                path: PathBuf::from(path),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only attribute"),
            });
        }
        if node.fail_writes {
            return Err(SysfsError::Io {
                path: PathBuf::from(path),
                source: io::Error::new(io::ErrorKind::Other, "injected write failure"),
            });
        }
        if !node.pinned {
            node.raw = value.to_string();
        }
        inner.writes.push((path.to_string(), value));
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.lock().nodes.contains_key(path)
    }

    fn is_readable(&self, path: &str) -> bool {
        self.exists(path)
    }

    fn is_writable(&self, path: &str) -> bool {
        self.inner
            .lock()
            .nodes
            .get(path)
            .map(|n| !n.read_only)
            .unwrap_or(false)
    }
}
