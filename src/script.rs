//! Deferred execution: the template layer records calls against a
//! script instead of a live engine; the script is later replayed with
//! timeouts adapted from the SMART metrics.

use std::collections::BTreeMap;

use crate::engine::Response;
use crate::executor::{Call, Console, Executor};
use crate::smart::Metric;
use crate::wire::Wire;

/// An ordered recording of engine calls.
#[derive(Debug, Default)]
pub struct Script {
  calls: Vec<Call>,
}

impl Script {
  pub fn new() -> Script {
    Script::default()
  }

  /// Appends one call to the script.
  pub fn record(&mut self, call: Call) {
    self.calls.push(call);
  }

  pub fn len(&self) -> usize {
    self.calls.len()
  }

  pub fn is_empty(&self) -> bool {
    self.calls.is_empty()
  }

  /// Consumes the script, yielding one response per recorded call, in
  /// order. Device-command timeouts are patched from the stored metrics
  /// before each call goes out.
  pub fn replay<'a, W: Wire>(
    self,
    executor: &'a mut Executor<W>,
    console: &'a mut dyn Console,
  ) -> Replay<'a, W> {
    let metric = executor.smart().commands();
    Replay {
      calls: self.calls.into_iter(),
      executor,
      console,
      metric,
      last_command: String::new(),
    }
  }
}

pub struct Replay<'a, W: Wire> {
  calls: std::vec::IntoIter<Call>,
  executor: &'a mut Executor<W>,
  console: &'a mut dyn Console,
  metric: BTreeMap<String, Metric>,
  last_command: String,
}

impl<'a, W: Wire> Replay<'a, W> {
  /// The adapted timeout for `name`: the command's own stored timeout,
  /// plus the previous command's when the previous one is expected to
  /// outlast it (it may still be printing when this command goes out).
  fn adapt_timeout(&self, name: &str) -> Option<f64> {
    let metric = self.metric.get(name)?;
    let mut timeout = metric.timeout().abs();

    if self.last_command != name {
      if let Some(last) = self.metric.get(&self.last_command) {
        if last.timeout() > metric.timeout() {
          timeout += last.timeout().abs();
        }
      }
    }

    Some(timeout)
  }
}

impl<'a, W: Wire> Iterator for Replay<'a, W> {
  type Item = Response;

  fn next(&mut self) -> Option<Response> {
    let mut call = self.calls.next()?;

    if let Call::Device { command, timeout } = &mut call {
      let name = command.kind().name();
      if let Some(adapted) = self.adapt_timeout(name) {
        *timeout = Some(adapted);
      }
      self.last_command = name.to_string();
    }

    Some(self.executor.run(&call, self.console))
  }
}
