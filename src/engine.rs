//! Command-level retry, outcome classification, and the response
//! envelope handed to the layers above.

use serde::Serialize;

use crate::command::{Command, CommandKind};
use crate::constants::*;
use crate::error::{Action, Error, ErrorInfo};
use crate::profile::DeviceProfile;
use crate::response::Reply;
use crate::session::{PrintZone, Session};
use crate::wire::Wire;

/// What every issued command comes back as.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
  /// Name of the command (or engine operation) that produced this.
  pub command: String,
  pub action: Action,
  pub exception: Option<ErrorInfo>,
  /// Whether the device sat in the critical print zone at completion.
  pub is_critical: bool,
  pub data: Reply,
  /// Correction to this command's expected timeout, in seconds.
  pub delta: f64,
  /// Correction attributed to the previous, still-printing command.
  pub delta_for_last_command: f64,
}

impl Response {
  pub(crate) fn prepare(command: &str) -> Response {
    Response {
      command: command.to_string(),
      action: Action::Continue,
      exception: None,
      is_critical: false,
      data: Reply::None,
      delta: 0.0,
      delta_for_last_command: 0.0,
    }
  }
}

pub struct Engine<W> {
  session: Session<W>,
}

impl<W: Wire> Engine<W> {
  pub fn new(session: Session<W>) -> Engine<W> {
    Engine { session }
  }

  pub fn profile(&self) -> &'static DeviceProfile {
    self.session.profile()
  }

  pub fn check_width(&self) -> usize {
    self.profile().check_width
  }

  pub fn is_opened(&self) -> bool {
    self.session.is_opened()
  }

  pub fn delta_step(&self) -> f64 {
    TIME_DELTA_STEP
  }

  /// Issues a command with bounded retries, classifying each outcome and
  /// accumulating the timing corrections across attempts.
  pub fn make_action(&mut self, command: &Command, timeout: Option<f64>) -> Response {
    let kind = command.kind();
    let parameters = command.encode(self.session.profile());

    let mut acc_delta = 0.0;
    let mut acc_last_delta = 0.0;

    for _ in 0..MAX_TRIES {
      if let Err(error) = self.session.call(kind, &parameters, timeout) {
        return self.analyse_result(kind, Some(error));
      }
      let mut response = self.analyse_result(kind, None);

      acc_delta += response.delta;
      acc_last_delta += response.delta_for_last_command;

      if response.action == Action::Retry {
        continue;
      }

      response.delta += acc_delta;
      response.delta_for_last_command += acc_last_delta;
      return response;
    }

    self.analyse_result(kind, Some(Error::command(ERR_COMMAND_TIMEOUT)))
  }

  /// Cancels whatever critical command hung, per the rollback table.
  pub fn rollback_action(&mut self) -> Option<Response> {
    let rollback = self.session.last_critical_command()?.rollback()?;
    let command = Command::parameterless(rollback)?;
    Some(self.make_action(&command, None))
  }

  /// Readiness probe in envelope shape.
  pub fn check_dev_for_ready(&mut self) -> Response {
    let mut response = Response::prepare("check_dev_for_ready");
    response.data = Reply::Ready {
      ready: self.check_for_ready(),
    };
    response
  }

  pub fn find_device(&mut self, port_group: Option<&str>, rate: Option<u32>) -> Response {
    let mut response = Response::prepare("find_device");
    match self.session.find_device(port_group, rate) {
      Ok((port, rate)) => response.data = Reply::FoundDevice { port, rate },
      Err(error) => {
        response.exception = Some(ErrorInfo::from(&error));
        response.action = Action::Break;
      }
    }
    response
  }

  /// Brings the register up on the given connection parameters and
  /// verifies it actually answers.
  pub fn init_cash_register(&mut self, port: &str, rate: u32) -> Response {
    let mut response = match self.session.reconnect(port, rate) {
      Ok(()) => self.check_dev_for_ready(),
      Err(error) => {
        let mut response = Response::prepare("init_cash_register");
        response.exception = Some(ErrorInfo::from(&error));
        response.action = Action::Break;
        response
      }
    };
    response.command = "init_cash_register".to_string();
    response
  }

  fn analyse_result(&mut self, kind: CommandKind, exception: Option<Error>) -> Response {
    let mut response = Response::prepare(kind.name());
    response.is_critical = self.session.print_zone() == PrintZone::Critical;

    if let Some(error) = exception {
      response.action = Action::Break;
      response.exception = Some(ErrorInfo::from(&error));
      return response;
    }

    let result = match self.session.take_result() {
      Some(result) => result,
      None => {
        response.action = Action::Break;
        response.exception = Some(ErrorInfo::from(&Error::command(ERR_COMMAND_TIMEOUT)));
        return response;
      }
    };

    if let Some(error) = result.error {
      if is_member(&TIME_DELTA_ERRORS, error.code) {
        // the previous command is still printing; poll until the ribbon
        // quiets down, charging the wait to that command
        let mut last_delta = result.delta_for_last_command;
        loop {
          match self.check_for_ready() {
            Some(true) => {
              response.action = Action::Retry;
              response.delta_for_last_command = last_delta;
              break;
            }
            Some(false) => last_delta += TIME_DELTA_STEP,
            None => {
              // the probe itself failed; give up with the original error
              response.action = Action::Break;
              break;
            }
          }
        }
        response.exception = Some(error);
      } else if is_member(&WAITING_ERRORS, error.code) {
        response.action = Action::Wait;
        response.exception = Some(error);
      } else {
        response.action = if error.action == Action::Break {
          Action::Break
        } else {
          Action::Retry
        };
        response.exception = Some(error);
      }
    } else {
      match Reply::parse(kind, &result.data) {
        Ok(reply) => {
          response.data = reply;
          response.delta = result.delta;
          response.delta_for_last_command = result.delta_for_last_command;
        }
        Err(error) => {
          response.action = Action::Break;
          response.exception = Some(ErrorInfo::from(&error));
        }
      }
    }

    response
  }

  /// Issues `get_short_status` and checks whether printing has finished
  /// (submode 0). `None` means the probe itself failed.
  fn check_for_ready(&mut self) -> Option<bool> {
    if self
      .session
      .call(CommandKind::GetShortStatus, &[], None)
      .is_err()
    {
      return None;
    }
    let result = self.session.take_result()?;
    if result.error.is_some() || result.data.is_empty() {
      return None;
    }
    match Reply::parse(CommandKind::GetShortStatus, &result.data) {
      Ok(Reply::ShortStatus(status)) => Some(status.submode == 0),
      _ => None,
    }
  }

  #[cfg(test)]
  pub(crate) fn session(&mut self) -> &mut Session<W> {
    &mut self.session
  }
}

fn is_member(set: &[u8], code: i16) -> bool {
  code >= 0 && code <= 0xff && set.contains(&(code as u8))
}
