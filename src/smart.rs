//! The SMART store: durable per-command latency metrics plus the
//! remembered connection parameters.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Stored `[timeout_seconds, needs_calibration]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric(pub f64, pub bool);

impl Metric {
  pub fn timeout(&self) -> f64 {
    self.0
  }

  pub fn needs_calibration(&self) -> bool {
    self.1
  }
}

/// Connection parameters remembered for the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceParams {
  #[serde(default)]
  pub port: String,
  #[serde(default)]
  pub rate: u32,
  #[serde(rename = "type", default)]
  pub dev_type: String,
  #[serde(default)]
  pub check_width: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub device: Option<DeviceParams>,
  #[serde(default)]
  pub commands: BTreeMap<String, Metric>,
}

impl SmartData {
  fn is_empty(&self) -> bool {
    self.device.is_none() && self.commands.is_empty()
  }
}

/// File-backed cache of the SMART mapping.
///
/// Loaded lazily on first access; every write merges into the in-memory
/// cache under the mutex and replaces the file contents. A final flush
/// happens on drop. A missing or corrupt file reads as an empty mapping.
pub struct SmartStore {
  path: PathBuf,
  cache: Mutex<Option<SmartData>>,
}

impl SmartStore {
  pub fn new<P: AsRef<Path>>(path: P) -> SmartStore {
    SmartStore {
      path: path.as_ref().to_path_buf(),
      cache: Mutex::new(None),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn device(&self) -> Option<DeviceParams> {
    let mut guard = self.lock();
    let path = &self.path;
    guard.get_or_insert_with(|| load(path)).device.clone()
  }

  pub fn commands(&self) -> BTreeMap<String, Metric> {
    let mut guard = self.lock();
    let path = &self.path;
    guard.get_or_insert_with(|| load(path)).commands.clone()
  }

  /// Merges the device parameters in and flushes.
  pub fn set_device(&self, params: DeviceParams) {
    let mut guard = self.lock();
    let path = &self.path;
    let data = guard.get_or_insert_with(|| load(path));
    data.device = Some(params);
    write(path, data);
  }

  /// Merges command metrics in and flushes.
  pub fn update_commands(&self, commands: &BTreeMap<String, Metric>) {
    let mut guard = self.lock();
    let path = &self.path;
    let data = guard.get_or_insert_with(|| load(path));
    for (name, metric) in commands {
      data.commands.insert(name.clone(), *metric);
    }
    write(path, data);
  }

  /// Forces whatever is cached out to disk.
  pub fn flush(&self) {
    let guard = self.lock();
    if let Some(data) = guard.as_ref() {
      write(&self.path, data);
    }
  }

  fn lock(&self) -> MutexGuard<'_, Option<SmartData>> {
    match self.cache.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl Drop for SmartStore {
  fn drop(&mut self) {
    self.flush();
  }
}

fn load(path: &Path) -> SmartData {
  match fs::read(path) {
    Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
    Err(_) => SmartData::default(),
  }
}

fn write(path: &Path, data: &SmartData) {
  if data.is_empty() {
    return;
  }
  match serde_json::to_vec(data) {
    Ok(raw) => {
      if let Err(e) = fs::write(path, raw) {
        error!("could not persist metrics to {:?}: {}", path, e);
      }
    }
    Err(e) => error!("could not serialize metrics: {}", e),
  }
}
