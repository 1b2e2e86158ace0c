//! Operator-mediated execution: every command becomes a short dialog
//! with the host, which answers reaction requests until the command
//! either completes or is abandoned.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::command::{Command, CommandKind};
use crate::constants::*;
use crate::engine::{Engine, Response};
use crate::error::{Action, Error, ErrorInfo};
use crate::smart::{DeviceParams, Metric, SmartStore};
use crate::wire::Wire;

/// A decision the operator (or host) can take on a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
  Continue,
  Retry,
  Break,
  Skip,
  Wait,
}

impl Reaction {
  fn from_action(action: Action) -> Reaction {
    match action {
      Action::Continue => Reaction::Continue,
      Action::Retry => Reaction::Retry,
      Action::Break => Reaction::Break,
      Action::Wait => Reaction::Wait,
    }
  }
}

/// A reaction request: the failure plus the menu of allowed reactions,
/// in presentation order.
#[derive(Debug, Clone, Serialize)]
pub struct UserCase {
  pub exception: Option<ErrorInfo>,
  pub cases: Vec<(Reaction, &'static str)>,
}

impl UserCase {
  fn new(exception: Option<ErrorInfo>, action: Action, is_critical: bool) -> UserCase {
    let mut cases = Vec::new();
    match action {
      Action::Break => {
        cases.push((Reaction::Break, "Abort"));
        if !is_critical {
          cases.push((Reaction::Retry, "Retry"));
        }
      }
      Action::Retry => cases.push((Reaction::Retry, "Retry")),
      Action::Wait => {
        cases.push((Reaction::Skip, "Skip"));
        cases.push((Reaction::Retry, "Retry"));
        cases.push((Reaction::Break, "Abort"));
      }
      Action::Continue => cases.push((Reaction::Continue, "Continue")),
    }
    UserCase { exception, cases }
  }
}

/// Supplies reactions when execution cannot proceed on its own. The
/// host decides; this layer only frames the question.
pub trait Console {
  fn choose(&mut self, case: &UserCase) -> Reaction;
}

impl<F: FnMut(&UserCase) -> Reaction> Console for F {
  fn choose(&mut self, case: &UserCase) -> Reaction {
    self(case)
  }
}

/// One recordable engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  Device {
    command: Command,
    timeout: Option<f64>,
  },
  FindDevice {
    port_group: Option<String>,
    rate: Option<u32>,
  },
  InitCashRegister {
    port: String,
    rate: u32,
  },
  CheckReady,
}

impl Call {
  pub fn name(&self) -> &'static str {
    match self {
      Call::Device { command, .. } => command.kind().name(),
      Call::FindDevice { .. } => "find_device",
      Call::InitCashRegister { .. } => "init_cash_register",
      Call::CheckReady => "check_dev_for_ready",
    }
  }

  /// Shorthand for a device command with no preset timeout.
  pub fn device(command: Command) -> Call {
    Call::Device {
      command,
      timeout: None,
    }
  }
}

/// Attempts per command before the device is declared gone.
const EXEC_TRIES: usize = 10;

pub struct Executor<W: Wire> {
  engine: Engine<W>,
  smart: SmartStore,
  metric: BTreeMap<String, Metric>,
  last_command: String,
  delta_step: f64,
}

impl<W: Wire> Executor<W> {
  pub fn new(engine: Engine<W>, smart: SmartStore) -> Executor<W> {
    let metric = smart.commands();
    let delta_step = engine.delta_step();
    Executor {
      engine,
      smart,
      metric,
      last_command: String::new(),
      delta_step,
    }
  }

  pub fn engine(&mut self) -> &mut Engine<W> {
    &mut self.engine
  }

  pub fn smart(&self) -> &SmartStore {
    &self.smart
  }

  /// Persists the connection parameters into the device mapping.
  pub fn set_connection_parameters(&self, port: &str, rate: u32) {
    let profile = self.engine.profile();
    self.smart.set_device(DeviceParams {
      port: port.to_string(),
      rate,
      dev_type: profile.dev_type.to_string(),
      check_width: profile.check_width,
    });
  }

  /// Replays remembered connection parameters through device init, when
  /// there are any.
  pub fn init_connection_parameters(&mut self, console: &mut dyn Console) -> Option<Response> {
    let params = self.smart.device()?;
    if params.port.is_empty() || params.rate == 0 {
      return None;
    }
    let call = Call::InitCashRegister {
      port: params.port,
      rate: params.rate,
    };
    Some(self.run(&call, console))
  }

  /// Runs one call to completion: up to ten attempts, consulting the
  /// console whenever the outcome carries an error, rolling back when
  /// the operator aborts inside the critical zone, and feeding the final
  /// outcome into calibration.
  pub fn run(&mut self, call: &Call, console: &mut dyn Console) -> Response {
    let mut response = Response::prepare(call.name());
    let mut finished = false;

    for attempt in 0..EXEC_TRIES {
      info!("make {} (attempt {})", call.name(), attempt + 1);
      trace!("call: {:?}", call);

      let mut current = self.dispatch(call);
      trace!("response: {:?}", current);

      if let Some(exception) = &current.exception {
        error!("{}: {}", exception.code, exception.description);
      }

      let mut call_again = false;
      if current.action != Action::Continue {
        let reaction = if current.exception.is_some() {
          let case = UserCase::new(
            current.exception.clone(),
            current.action,
            current.is_critical,
          );
          console.choose(&case)
        } else {
          Reaction::from_action(current.action)
        };
        info!("reaction: {:?}", reaction);

        match reaction {
          Reaction::Break => {
            if current.is_critical {
              warn!("aborting inside the critical zone, cancelling the check");
              let _ = self.engine.rollback_action();
            }
          }
          Reaction::Retry => {
            if current.action == Action::Wait {
              let wait = current.delta.max(1.0);
              thread::sleep(Duration::from_secs_f64(wait));
              current.delta += wait;
            }
            call_again = true;
          }
          Reaction::Wait => {
            // self-resolving wait: sleep it off and move on
            let wait = current.delta.max(1.0);
            thread::sleep(Duration::from_secs_f64(wait));
            current.delta += wait;
          }
          Reaction::Skip | Reaction::Continue => (),
        }
      }

      response = current;
      if !call_again {
        finished = true;
        break;
      }
    }

    if !finished {
      error!("'{}': the command never completed", call.name());
      response.exception = Some(ErrorInfo::from(&Error::connection(ERR_LOST_DEVICE)));
      response.action = Action::Break;
    }

    self.fix_in_smart(&response);
    response
  }

  fn dispatch(&mut self, call: &Call) -> Response {
    match call {
      Call::Device { command, timeout } => self.engine.make_action(command, *timeout),
      Call::FindDevice { port_group, rate } => {
        self.engine.find_device(port_group.as_deref(), *rate)
      }
      Call::InitCashRegister { port, rate } => self.engine.init_cash_register(port, *rate),
      Call::CheckReady => self.engine.check_dev_for_ready(),
    }
  }

  /// Automatic cancellation of an unclosed check.
  pub fn make_cancel_check(&mut self) -> Response {
    self.engine.make_action(&Command::CancelCheck, None)
  }

  /// Calibration: folds the observed deltas into the stored timeouts.
  ///
  /// A positive delta for the previous command extends that command's
  /// timeout. The current command's timeout shrinks on a negative delta
  /// (bottoming out at one delta step) and grows on a positive one,
  /// except for operator-paced commands.
  pub fn fix_in_smart(&mut self, result: &Response) {
    let name = result.command.clone();

    let (mut timeout, mut needs_calibration) = match self.metric.get(&name) {
      Some(metric) => (metric.timeout(), metric.needs_calibration()),
      None => (0.0, true),
    };

    let mut cmd_timeout_changed = false;
    let mut last_cmd_timeout_changed = false;

    if result.delta_for_last_command > 0.0 {
      if let Some(last_metric) = self.metric.get(&self.last_command).copied() {
        let extended = (last_metric.timeout() + result.delta_for_last_command).abs();
        self
          .metric
          .insert(self.last_command.clone(), Metric(extended, false));
        last_cmd_timeout_changed = true;
      }
    }

    let delta = result.delta;
    if delta < 0.0 {
      timeout += delta;
      if timeout < 0.0 {
        timeout = self.delta_step;
        needs_calibration = false;
      }
      cmd_timeout_changed = true;
    } else if delta > 0.0 && !is_waiting_command(&name) {
      timeout += delta;
      needs_calibration = false;
      cmd_timeout_changed = true;
    }

    if cmd_timeout_changed || last_cmd_timeout_changed {
      self
        .metric
        .insert(name.clone(), Metric(timeout.abs(), needs_calibration));
      self.smart.update_commands(&self.metric);
    }
    self.last_command = name;
  }
}

fn is_waiting_command(name: &str) -> bool {
  CommandKind::from_name(name)
    .map(|kind| kind.is_waiting())
    .unwrap_or(false)
}
