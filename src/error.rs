use err_derive::Error;
use serde::Serialize;

use crate::constants;

/// Recommended follow-up after a command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  Continue,
  Retry,
  Break,
  Wait,
}

#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  /// An error code reported by the device inside a reply frame.
  #[error(display = "device error {:#04x}: {}", code, description)]
  Device {
    code: u8,
    description: &'static str,
    action: Action,
  },

  /// The port could not be opened, or the device stopped answering.
  #[error(display = "connection error {}: {}", code, description)]
  Connection { code: i16, description: &'static str },

  /// A command could not be formed or never completed.
  #[error(display = "command error {}: {}", code, description)]
  Command { code: i16, description: &'static str },

  #[error(display = "error parsing reply: {}", _0)]
  Packet(String),
}

impl Error {
  pub fn device(code: u8) -> Error {
    let (description, action) = constants::device_error(code);
    Error::Device {
      code,
      description,
      action,
    }
  }

  pub fn connection(code: i16) -> Error {
    Error::Connection {
      code,
      description: constants::custom_error_description(code),
    }
  }

  pub fn command(code: i16) -> Error {
    Error::Command {
      code,
      description: constants::custom_error_description(code),
    }
  }

  pub fn code(&self) -> i16 {
    match self {
      Error::Device { code, .. } => i16::from(*code),
      Error::Connection { code, .. } => *code,
      Error::Command { code, .. } => *code,
      Error::Packet(_) => constants::ERR_UNKNOWN_COMMAND,
    }
  }

  pub fn action(&self) -> Action {
    match self {
      Error::Device { action, .. } => *action,
      _ => Action::Break,
    }
  }

  /// Error class name, as presented to the host.
  pub fn class(&self) -> &'static str {
    match self {
      Error::Device { .. } => "Runtime",
      Error::Connection { .. } => "Connection",
      Error::Command { .. } => "Command",
      Error::Packet(_) => "Packet",
    }
  }

  fn description(&self) -> String {
    match self {
      Error::Device { description, .. } => (*description).to_string(),
      Error::Connection { description, .. } => (*description).to_string(),
      Error::Command { description, .. } => (*description).to_string(),
      Error::Packet(message) => message.clone(),
    }
  }
}

/// Serialized error descriptor handed to the host along with a reaction
/// request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
  pub error: String,
  pub message: String,
  pub args: Vec<String>,
  pub code: i16,
  pub description: String,
  pub action: Action,
}

impl From<&Error> for ErrorInfo {
  fn from(error: &Error) -> ErrorInfo {
    ErrorInfo {
      error: error.class().to_string(),
      message: error.to_string(),
      args: Vec::new(),
      code: error.code(),
      description: error.description(),
      action: error.action(),
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
