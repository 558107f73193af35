/*
 * Integration tests for fc-core
 *
 * These run the whole startup, control and restore sequence against a
 * fake sysfs tree in a temporary directory.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fc_core::error::{FancontrolError, PathError};
use fc_core::{
    fixup_legacy_paths, load_config, verify_attributes, AttributeStore, ControlLoop, LifecycleManager,
    LifecycleState, PathResolver, PidLock, RootKind, SysfsStore,
};
use tempfile::TempDir;

const CONFIG: &str = "\
# Configuration file generated by pwmconfig
INTERVAL=10
DEVPATH=hwmon0=devices/platform/it87.656
DEVNAME=hwmon0=it8728
FCTEMPS=hwmon0/pwm1=hwmon0/temp1_input hwmon0/pwm2=hwmon0/temp2_input
FCFANS=hwmon0/pwm1=hwmon0/fan1_input hwmon0/pwm2=
MINTEMP=hwmon0/pwm1=40 hwmon0/pwm2=30
MAXTEMP=hwmon0/pwm1=70 hwmon0/pwm2=60
MINSTART=hwmon0/pwm1=180 hwmon0/pwm2=150
MINSTOP=hwmon0/pwm1=100 hwmon0/pwm2=80
MAXPWM=hwmon0/pwm1=200
";

// Test utilities
struct FakeSystem {
    _temp_dir: TempDir,
    prefix: PathBuf,
    config_path: PathBuf,
    lock_path: PathBuf,
}

impl FakeSystem {
    fn new(config: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let prefix = temp_dir.path().join("root");
        let chip = prefix.join("sys/class/hwmon/hwmon0");
        fs::create_dir_all(&chip).unwrap();

        let config_path = temp_dir.path().join("fancontrol");
        fs::write(&config_path, config).unwrap();

        Self {
            lock_path: temp_dir.path().join("fancontrol.pid"),
            _temp_dir: temp_dir,
            prefix,
            config_path,
        }
    }

    fn chip(&self) -> PathBuf {
        self.prefix.join("sys/class/hwmon/hwmon0")
    }

    fn set(&self, attr: &str, content: &str) {
        fs::write(self.chip().join(attr), content).unwrap();
    }

    fn get(&self, attr: &str) -> String {
        fs::read_to_string(self.chip().join(attr)).unwrap()
    }

    fn populate(&self) {
        self.set("name", "it8728\n");
        self.set("pwm1", "0\n");
        self.set("pwm1_enable", "2\n");
        self.set("pwm2", "100\n");
        self.set("temp1_input", "55000\n");
        self.set("temp2_input", "20000\n");
        self.set("fan1_input", "0\n");
    }
}

fn list_files(dir: &Path) -> Vec<(String, String)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (
                e.file_name().to_string_lossy().to_string(),
                fs::read_to_string(e.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_full_control_cycle() {
    let system = FakeSystem::new(CONFIG);
    system.populate();

    let (config, hints) = load_config(&system.config_path).unwrap();
    let root = PathResolver::with_prefix(&system.prefix).resolve_root(&config).unwrap();
    assert_eq!(root.kind, RootKind::HwmonClass);

    let store = SysfsStore::new(&root.dir);
    let config = fixup_legacy_paths(&config, &hints, &store);
    verify_attributes(&config, &store).unwrap();

    let lock = PidLock::new(&system.lock_path);
    lock.ensure_absent().unwrap();
    lock.acquire().unwrap();

    let mut lifecycle = LifecycleManager::new(&config, &store, lock);
    lifecycle.enable_all().unwrap();
    assert_eq!(system.get("pwm1_enable"), "1");
    assert_eq!(system.get("pwm1"), "255");
    assert_eq!(system.get("pwm2"), "255");

    // pwm1 reads 255 now but the tachometer still reports a stopped fan
    let control = ControlLoop::new(&config, &store).with_settle_delay(Duration::ZERO);
    control.tick().unwrap();
    // (55000 - 40000) * (200 - 100) / 30000 + 100
    assert_eq!(system.get("pwm1"), "150");
    // 20 degrees is below MINTEMP; MINPWM defaults to 0
    assert_eq!(system.get("pwm2"), "0");

    system.set("temp2_input", "65000");
    control.tick().unwrap();
    assert_eq!(system.get("pwm2"), "255");

    assert_eq!(lifecycle.restore(0), 0);
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert_eq!(system.get("pwm1_enable"), "0");
    assert_eq!(system.get("pwm2"), "255");
    assert!(!system.lock_path.exists());
}

#[test]
fn test_legacy_device_paths_are_rewritten() {
    let legacy = CONFIG
        .replace("hwmon0/pwm", "hwmon0/device/pwm")
        .replace("hwmon0/temp", "hwmon0/device/temp")
        .replace("hwmon0/fan", "hwmon0/device/fan");
    let system = FakeSystem::new(&legacy);
    system.populate();

    let (config, hints) = load_config(&system.config_path).unwrap();
    let root = PathResolver::with_prefix(&system.prefix).resolve_root(&config).unwrap();
    let store = SysfsStore::new(&root.dir);

    // Nothing exists under device/
    assert!(verify_attributes(&config, &store).is_err());

    let fixed = fixup_legacy_paths(&config, &hints, &store);
    let first = &fixed.mappings()[0];
    assert_eq!(first.pwm_path(), "hwmon0/pwm1");
    assert_eq!(first.temp_path(), "hwmon0/temp1_input");
    assert_eq!(first.fan_path(), Some("hwmon0/fan1_input"));
    verify_attributes(&fixed, &store).unwrap();
}

#[test]
fn test_missing_attributes_are_all_reported() {
    let system = FakeSystem::new(CONFIG);
    system.set("pwm1", "0");
    system.set("temp1_input", "40000");

    let (config, _) = load_config(&system.config_path).unwrap();
    let root = PathResolver::with_prefix(&system.prefix).resolve_root(&config).unwrap();
    let store = SysfsStore::new(&root.dir);

    match verify_attributes(&config, &store) {
        Err(PathError::MissingSysfsNode(missing)) => {
            let paths: Vec<_> = missing.iter().map(|m| m.path.as_str()).collect();
            assert_eq!(paths, vec!["hwmon0/fan1_input", "hwmon0/pwm2", "hwmon0/temp2_input"]);
        }
        other => panic!("expected missing attributes, got {:?}", other),
    }
}

#[test]
fn test_missing_root_is_rejected() {
    let system = FakeSystem::new(&CONFIG.replace("hwmon0/", "3-0290/"));
    let (config, _) = load_config(&system.config_path).unwrap();

    let err = PathResolver::with_prefix(&system.prefix).resolve_root(&config).unwrap_err();
    assert!(matches!(err, PathError::RootNotFound(_)));
}

#[test]
fn test_second_instance_touches_nothing() {
    let system = FakeSystem::new(CONFIG);
    system.populate();
    fs::write(&system.lock_path, "4242\n").unwrap();
    let before = list_files(&system.chip());

    let (config, hints) = load_config(&system.config_path).unwrap();
    let root = PathResolver::with_prefix(&system.prefix).resolve_root(&config).unwrap();
    let store = SysfsStore::new(&root.dir);
    let config = fixup_legacy_paths(&config, &hints, &store);
    verify_attributes(&config, &store).unwrap();

    let lock = PidLock::new(&system.lock_path);
    let err = lock.ensure_absent().unwrap_err();
    assert!(matches!(err, FancontrolError::AlreadyRunning(_)));
    assert_eq!(err.exit_code(), 1);

    assert_eq!(list_files(&system.chip()), before);
    assert_eq!(fs::read_to_string(&system.lock_path).unwrap(), "4242\n");
}

#[test]
fn test_runtime_failure_then_restore() {
    let system = FakeSystem::new(CONFIG);
    system.populate();

    let (config, _) = load_config(&system.config_path).unwrap();
    let root = PathResolver::with_prefix(&system.prefix).resolve_root(&config).unwrap();
    let store = SysfsStore::new(&root.dir);

    let lock = PidLock::new(&system.lock_path);
    lock.acquire().unwrap();
    let mut lifecycle = LifecycleManager::new(&config, &store, lock);
    lifecycle.enable_all().unwrap();

    // Sensor disappears, e.g. the driver was unloaded
    fs::remove_file(system.chip().join("temp2_input")).unwrap();
    let control = ControlLoop::new(&config, &store).with_settle_delay(Duration::ZERO);
    let err = control.tick().unwrap_err();
    assert!(matches!(err, FancontrolError::Sensor { .. }));
    assert!(!store.exists("hwmon0/temp2_input"));

    assert_eq!(lifecycle.restore(err.exit_code()), 1);
    assert_eq!(system.get("pwm1_enable"), "0");
    assert_eq!(system.get("pwm2"), "255");
    assert!(!system.lock_path.exists());
}
