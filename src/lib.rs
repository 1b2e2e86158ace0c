//! Driver for "Shtrih" and "RR" family fiscal cash registers over a
//! serial line.
//!
//! The stack, bottom to top:
//!
//! - [`wire`]: ENQ/ACK/NAK line discipline and STX-framed, XOR-checked
//!   frames
//! - [`port`]: exclusive ownership of the serial handle, port discovery
//! - [`command`] / [`response`]: bit-exact request and reply codecs
//! - [`session`]: one command/one reply cycle, print-zone tracking
//! - [`engine`]: bounded retries and outcome classification
//! - [`executor`]: the operator dialog loop plus SMART timeout
//!   calibration, persisted through [`smart`]
//! - [`script`]: record now, replay later with adapted timeouts
//!
//! Timing is the heart of it: these printers answer slowly and unevenly,
//! so every command's expected timeout is continuously re-learned from
//! observed behavior and persisted across runs.

#[macro_use]
extern crate log;

pub mod command;
pub mod constants;
pub mod engine;
pub mod error;
pub mod executor;
pub mod port;
pub mod profile;
pub mod response;
pub mod script;
pub mod session;
pub mod smart;
pub mod util;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{Command, CommandKind, Date, Time};
pub use engine::{Engine, Response};
pub use error::{Action, Error, ErrorInfo, Result};
pub use executor::{Call, Console, Executor, Reaction, UserCase};
pub use port::PortManager;
pub use profile::{DeviceProfile, RR, SHTRIH};
pub use response::{DeviceFlags, DeviceMetrics, Reply, ShortStatus, Status};
pub use script::{Replay, Script};
pub use session::{PrintZone, Session, SessionRecord};
pub use smart::{DeviceParams, Metric, SmartData, SmartStore};
pub use util::Align;
pub use wire::{LineState, Wire};
