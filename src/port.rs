//! Serial port ownership: opening, reconfiguration, discovery.

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::time::Duration;

use serialport::{
  open_with_settings, DataBits, FlowControl, Parity, SerialPort, SerialPortSettings, StopBits,
};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::wire::{self, LineState, Wire};

/// Exclusive owner of the serial handle.
///
/// Any change of port or rate closes and reopens the device, so the
/// handle never survives a reconfiguration. A failed open leaves the
/// manager with no port attached.
pub struct PortManager {
  port_name: Option<String>,
  baud_rate: Option<u32>,
  read_timeout: f64,
  handle: Option<Box<dyn SerialPort>>,
}

impl PortManager {
  /// Opens the port right away when both parameters are known; otherwise
  /// stays closed until a setter or discovery supplies them.
  pub fn new(port: Option<String>, rate: Option<u32>) -> Result<PortManager> {
    PortManager::with_timeout(port, rate, DEF_TIMEOUT)
  }

  pub fn with_timeout(port: Option<String>, rate: Option<u32>, read_timeout: f64) -> Result<PortManager> {
    let mut manager = PortManager {
      port_name: port,
      baud_rate: rate,
      read_timeout,
      handle: None,
    };
    if manager.port_name.is_some() && manager.baud_rate.is_some() {
      manager.open()?;
    }
    Ok(manager)
  }

  /// A manager with no port attached.
  pub fn closed() -> PortManager {
    PortManager {
      port_name: None,
      baud_rate: None,
      read_timeout: DEF_TIMEOUT,
      handle: None,
    }
  }

  pub fn is_opened(&self) -> bool {
    self.handle.is_some()
  }

  pub fn port(&self) -> Option<&str> {
    self.port_name.as_deref()
  }

  pub fn rate(&self) -> Option<u32> {
    self.baud_rate
  }

  fn open(&mut self) -> Result<()> {
    let (name, rate) = match (&self.port_name, self.baud_rate) {
      (Some(name), Some(rate)) => (name.clone(), rate),
      _ => return Ok(()),
    };

    // 8N1, no flow control; the serialport backend drives reads and
    // writes off a single timeout
    let settings = SerialPortSettings {
      baud_rate: rate,
      data_bits: DataBits::Eight,
      flow_control: FlowControl::None,
      parity: Parity::None,
      stop_bits: StopBits::One,
      timeout: Duration::from_secs_f64(self.read_timeout),
    };

    match open_with_settings(OsStr::new(&name), &settings) {
      Ok(handle) => {
        debug!("opened {} at {} baud", name, rate);
        self.handle = Some(handle);
        Ok(())
      }
      Err(e) => {
        debug!("could not open {}: {:?}", name, e);
        Err(Error::connection(ERR_OPENING_PORT))
      }
    }
  }

  /// Atomically re-targets the port: close, set, reopen.
  pub fn set_port(&mut self, port: &str) -> Result<()> {
    self.close();
    self.port_name = Some(port.to_string());
    self.open()
  }

  pub fn set_rate(&mut self, rate: u32) -> Result<()> {
    self.close();
    self.baud_rate = Some(rate);
    self.open()
  }

  fn handle(&mut self) -> Result<&mut Box<dyn SerialPort>> {
    self
      .handle
      .as_mut()
      .ok_or_else(|| Error::connection(ERR_LOST_DEVICE))
  }
}

impl Wire for PortManager {
  fn is_open(&self) -> bool {
    self.is_opened()
  }

  fn flush(&mut self) -> Result<()> {
    self
      .handle()?
      .flush()
      .map_err(|_| Error::connection(ERR_LOST_DEVICE))
  }

  fn write_all(&mut self, data: &[u8]) -> Result<()> {
    self
      .handle()?
      .write_all(data)
      .map_err(|_| Error::connection(ERR_LOST_DEVICE))
  }

  fn read_byte(&mut self) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match self.handle()?.read(&mut byte) {
      Ok(0) => Ok(None),
      Ok(_) => Ok(Some(byte[0])),
      Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
      Err(e) => {
        debug!("read failed: {:?}", e);
        Err(Error::connection(ERR_LOST_DEVICE))
      }
    }
  }

  fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
    self.read_timeout = timeout.as_secs_f64();
    self
      .handle()?
      .set_timeout(timeout)
      .map_err(|_| Error::connection(ERR_LOST_DEVICE))
  }

  fn reconnect(&mut self, port: &str, rate: u32) -> Result<()> {
    self.close();
    self.port_name = Some(port.to_string());
    self.baud_rate = Some(rate);
    self.open()
  }

  fn close(&mut self) {
    self.handle = None;
  }

  /// Walks candidate ports and baud rates, probing each pair with ENQ;
  /// the first one the device answers on wins.
  fn find_device(&mut self, port_group: Option<&str>, rate: Option<u32>) -> Result<(String, u32)> {
    let rates: Vec<u32> = match rate {
      Some(rate) if RATES.contains(&rate) => vec![rate],
      _ => RATES.to_vec(),
    };

    for port in candidate_ports(port_group) {
      if self.set_port(&port).is_err() {
        continue;
      }
      for &rate in &rates {
        if self.set_rate(rate).is_err() {
          continue;
        }
        if wire::check_state(self) != LineState::NoSignal {
          info!("device found at {} ({} baud)", port, rate);
          return Ok((port, rate));
        }
      }
    }

    Err(Error::connection(ERR_LOST_DEVICE))
  }
}

#[cfg(windows)]
fn candidate_ports(_port_group: Option<&str>) -> Vec<String> {
  (1..=256).map(|i| format!("COM{}", i)).collect()
}

#[cfg(unix)]
fn candidate_ports(port_group: Option<&str>) -> Vec<String> {
  let mut ports = Vec::new();
  if let Ok(paths) = glob::glob("/dev/tty[A-Za-z]*") {
    for path in paths.flatten() {
      let name = path.to_string_lossy().into_owned();
      if port_group.map(|group| name.contains(group)).unwrap_or(true) {
        ports.push(name);
      }
    }
  }
  ports
}
