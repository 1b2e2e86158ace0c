//! One command/one reply cycle against the device.

use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::command::CommandKind;
use crate::constants::*;
use crate::error::{Error, ErrorInfo, Result};
use crate::profile::DeviceProfile;
use crate::wire::{self, LineState, ReadOutcome, Wire};

/// Where the device sits within the receipt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintZone {
  NonCritical,
  /// A fiscal document is open; aborting here requires a cancellation.
  Critical,
  /// Document closed; trailing side effects (cut, beep) still expected.
  PostCritical,
}

/// Accumulated outcome of a single command cycle.
#[derive(Debug, Clone)]
pub struct SessionRecord {
  pub code: u8,
  pub command: CommandKind,
  pub error: Option<ErrorInfo>,
  pub data: Bytes,
  /// Correction to this command's expected timeout, in seconds.
  pub delta: f64,
  /// Correction attributed to the previous command, which was still
  /// driving the printer when this one went out.
  pub delta_for_last_command: f64,
}

pub struct Session<W> {
  wire: W,
  password: [u8; 4],
  profile: &'static DeviceProfile,
  print_zone: PrintZone,
  last_command_is_printing: bool,
  last_critical_command: Option<CommandKind>,
  record: Option<SessionRecord>,
}

impl<W: Wire> Session<W> {
  pub fn new(wire: W, profile: &'static DeviceProfile) -> Session<W> {
    Session {
      wire,
      password: PASSWORD,
      profile,
      print_zone: PrintZone::NonCritical,
      last_command_is_printing: false,
      last_critical_command: None,
      record: None,
    }
  }

  pub fn profile(&self) -> &'static DeviceProfile {
    self.profile
  }

  pub fn print_zone(&self) -> PrintZone {
    self.print_zone
  }

  /// The most recent command that opened a fiscal document; its rollback
  /// counterpart is what a critical-zone abort must run.
  pub fn last_critical_command(&self) -> Option<CommandKind> {
    self.last_critical_command
  }

  pub fn is_opened(&self) -> bool {
    self.wire.is_open()
  }

  /// Runs one full exchange: probe the line, send the command, read the
  /// reply, account the timing corrections.
  pub fn call(&mut self, command: CommandKind, parameters: &[u8], wait_time: Option<f64>) -> Result<()> {
    let mut record = SessionRecord {
      code: command.opcode(),
      command,
      error: None,
      data: Bytes::new(),
      delta: 0.0,
      delta_for_last_command: 0.0,
    };

    match wire::check_state(&mut self.wire) {
      LineState::Ready => (),
      LineState::ReplyPending => {
        // an unconsumed reply to the previous command is still queued;
        // drain it and move on
        let drained = wire::read_frame(&mut self.wire)?;
        debug!("drained a stale reply: {:?}", drained);
      }
      LineState::NoSignal => return Err(Error::connection(ERR_LOST_DEVICE)),
    }

    let password = if command.needs_password() {
      Some(&self.password)
    } else {
      None
    };
    let sent = wire::send_frame(
      &mut self.wire,
      command.opcode(),
      password,
      parameters,
      wait_time.unwrap_or(DEF_TIMEOUT),
    )?;
    if sent == LineState::NoSignal {
      return Err(Error::connection(ERR_LOST_DEVICE));
    }

    let mut tries = MAX_TRIES;
    let (err_code, data) = loop {
      if tries == 0 {
        return Err(Error::connection(ERR_LOST_DEVICE));
      }
      match wire::read_frame(&mut self.wire)? {
        ReadOutcome::Retry { .. } => {
          // noise on the line; charge the time to whichever command is
          // actually occupying the printer
          if self.last_command_is_printing {
            record.delta_for_last_command += TIME_DELTA_STEP;
          } else {
            record.delta += TIME_DELTA_STEP;
          }
          thread::sleep(Duration::from_secs_f64(TIME_DELTA_STEP));
          tries -= 1;
        }
        ReadOutcome::Frame { err_code, data, .. } => {
          if TIME_DELTA_ERRORS.contains(&err_code) {
            record.delta_for_last_command += TIME_DELTA_STEP;
            thread::sleep(Duration::from_secs_f64(TIME_DELTA_STEP));
          }
          break (err_code, data);
        }
      }
    };

    self.last_command_is_printing = false;
    record.data = data;

    if err_code != 0 {
      record.error = Some(ErrorInfo::from(&Error::device(err_code)));
      if TIME_DELTA_ERRORS.contains(&err_code) {
        // the printer is still busy with the previous command; retries
        // of the next exchange belong to it as well
        self.last_command_is_printing = true;
      }
    } else {
      if command.is_critical() {
        self.print_zone = PrintZone::Critical;
        self.last_critical_command = Some(command);
      } else if command.is_post_critical() {
        self.print_zone = PrintZone::PostCritical;
      }

      if tries == MAX_TRIES {
        // answered on the first try; reward with a downward correction
        record.delta -= TIME_DELTA_STEP;
      }

      if let Some(seconds) = command.final_time() {
        thread::sleep(Duration::from_secs_f64(seconds));
      }
    }

    self.record = Some(record);
    Ok(())
  }

  /// Hands over the accumulated record, leaving a clean slate for the
  /// next command.
  pub fn take_result(&mut self) -> Option<SessionRecord> {
    self.record.take()
  }

  /// Brings the session up on a fresh port configuration, resetting the
  /// receipt state. Failure leaves the session without a port; only
  /// another reconnect recovers it.
  pub fn reconnect(&mut self, port: &str, rate: u32) -> Result<()> {
    self.print_zone = PrintZone::NonCritical;
    self.last_command_is_printing = false;
    self.last_critical_command = None;
    self.record = None;
    self.wire.reconnect(port, rate)
  }

  pub fn find_device(&mut self, port_group: Option<&str>, rate: Option<u32>) -> Result<(String, u32)> {
    self.wire.find_device(port_group, rate)
  }

  #[cfg(test)]
  pub(crate) fn wire(&mut self) -> &mut W {
    &mut self.wire
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::profile::SHTRIH;
  use crate::testing::{MockDevice, ScriptedReply};

  fn session(device: MockDevice) -> Session<MockDevice> {
    Session::new(device, &SHTRIH)
  }

  #[test]
  fn test_successful_call_records_reply_and_reward() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::ok(&[0x1e]));
    let mut session = session(device);

    session.call(CommandKind::Beep, &[], None).unwrap();
    let record = session.take_result().unwrap();

    assert_eq!(record.command, CommandKind::Beep);
    assert!(record.error.is_none());
    assert_eq!(&record.data[..], &[0x1e]);
    // prompt reply earns the downward correction
    assert!((record.delta + TIME_DELTA_STEP).abs() < 1e-9);
    assert_eq!(record.delta_for_last_command, 0.0);

    // the slate is clean afterwards
    assert!(session.take_result().is_none());
  }

  #[test]
  fn test_crc_noise_is_retried_and_accounted() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::corrupted(&[0x1e]));
    let mut session = session(device);

    session.call(CommandKind::Beep, &[], None).unwrap();
    let record = session.take_result().unwrap();

    // one failed read charged to this command, then the retransmission
    // made it through, which cancels the first-try reward
    assert!(record.error.is_none());
    assert!((record.delta - TIME_DELTA_STEP).abs() < 1e-9);
  }

  #[test]
  fn test_device_error_is_recorded_not_raised() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::error(0x68));
    let mut session = session(device);

    session.call(CommandKind::Sale, &[], None).unwrap();
    let record = session.take_result().unwrap();

    let error = record.error.unwrap();
    assert_eq!(error.code, 0x68);
    // errors never advance the print zone
    assert_eq!(session.print_zone(), PrintZone::NonCritical);
  }

  #[test]
  fn test_print_zone_transitions() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::ok(&[0x1e]));
    device.push_reply(ScriptedReply::ok(&[0x1e]));
    let mut session = session(device);

    session.call(CommandKind::Sale, &[], None).unwrap();
    assert_eq!(session.print_zone(), PrintZone::Critical);
    assert_eq!(session.last_critical_command(), Some(CommandKind::Sale));

    session.call(CommandKind::CloseCheck, &[], None).unwrap();
    assert_eq!(session.print_zone(), PrintZone::PostCritical);
    // the rollback target survives the zone change
    assert_eq!(session.last_critical_command(), Some(CommandKind::Sale));
  }

  #[test]
  fn test_busy_printing_error_charges_the_last_command() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::error(0x50));
    let mut session = session(device);

    session.call(CommandKind::Sale, &[], None).unwrap();
    let record = session.take_result().unwrap();

    assert!((record.delta_for_last_command - TIME_DELTA_STEP).abs() < 1e-9);
    assert_eq!(record.error.unwrap().code, 0x50);
  }

  #[test]
  fn test_stale_reply_is_drained() {
    let mut device = MockDevice::new();
    device.set_stale_reply(ScriptedReply::ok(&[0x1e]));
    device.push_reply(ScriptedReply::ok(&[0x1e]));
    let mut session = session(device);

    session.call(CommandKind::Beep, &[], None).unwrap();
    let record = session.take_result().unwrap();
    assert!(record.error.is_none());
  }

  #[test]
  fn test_closed_wire_is_a_lost_device() {
    let mut device = MockDevice::new();
    device.close();
    let mut session = session(device);

    match session.call(CommandKind::Beep, &[], None) {
      Err(Error::Connection { code, .. }) => assert_eq!(code, ERR_LOST_DEVICE),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn test_password_exemption_on_the_wire() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::ok(&[0x00]));
    let mut session = session(device);

    session
      .call(CommandKind::ConfirmDate, &[0x0f, 0x07, 0x18], None)
      .unwrap();

    let frame = &session.wire().sent_frames[0];
    // length byte counts opcode + parameters only: no password prefix
    assert_eq!(frame[1], 4);
    assert_eq!(frame[2], 0x23);
  }

  #[test]
  fn test_reconnect_resets_the_receipt_state() {
    let mut device = MockDevice::new();
    device.push_reply(ScriptedReply::ok(&[0x1e]));
    let mut session = session(device);

    session.call(CommandKind::Sale, &[], None).unwrap();
    assert_eq!(session.print_zone(), PrintZone::Critical);

    session.reconnect("/dev/ttyMOCK0", 115200).unwrap();
    assert_eq!(session.print_zone(), PrintZone::NonCritical);
    assert_eq!(session.last_critical_command(), None);
  }
}
