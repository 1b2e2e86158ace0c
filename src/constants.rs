//! Protocol constants shared by the Shtrih and RR families.

use crate::error::Action;

/// Frame start marker.
pub const STX: u8 = 0x02;
/// Line probe byte; the device answers NAK (ready) or ACK (stale reply).
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

/// Retry bound applied at every layer: framer, session, engine.
pub const MAX_TRIES: usize = 10;

/// Smallest timing correction, in seconds.
pub const TIME_DELTA_STEP: f64 = 0.3;

/// Fallback read timeout, in seconds, when a command has no adapted one.
pub const DEF_TIMEOUT: f64 = 1.5;

/// Baud rates the devices ship with, in probe order.
pub const RATES: [u32; 7] = [2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Default operator password (operator 30), little-endian.
pub const PASSWORD: [u8; 4] = [0x1e, 0x00, 0x00, 0x00];

// driver-side error codes (never reported by the device)
pub const ERR_OPENING_PORT: i16 = -1;
pub const ERR_LOST_DEVICE: i16 = -2;
pub const ERR_UNKNOWN_COMMAND: i16 = -3;
pub const ERR_COMMAND_TIMEOUT: i16 = -4;

pub fn custom_error_description(code: i16) -> &'static str {
  match code {
    ERR_OPENING_PORT => "could not open the serial port",
    ERR_LOST_DEVICE => "the device is not responding",
    ERR_UNKNOWN_COMMAND => "unknown command",
    ERR_COMMAND_TIMEOUT => "the command never completed",
    _ => "error",
  }
}

/// Device errors meaning "the previous command is still printing".
/// The engine answers these by polling readiness, not by surfacing them.
pub const TIME_DELTA_ERRORS: [u8; 1] = [0x50];

/// Device errors meaning the device needs time or operator attention
/// (paper loaded, print resumed) before the command can succeed.
pub const WAITING_ERRORS: [u8; 1] = [0x58];

/// The vendor error table: description plus the recommended follow-up.
pub fn device_error(code: u8) -> (&'static str, Action) {
  match code {
    0x01 => ("fiscal storage: unknown command or invalid format", Action::Break),
    0x02 => ("fiscal storage: invalid state", Action::Break),
    0x03 => ("fiscal storage failure", Action::Break),
    0x04 => ("fiscal storage: clock battery low", Action::Break),
    0x05 => ("fiscal storage: shift number mismatch", Action::Break),
    0x06 => ("fiscal storage: invalid date or time", Action::Break),
    0x07 => ("fiscal storage: no data for the request", Action::Break),
    0x08 => ("invalid command parameters", Action::Break),
    0x0b => ("invalid password", Action::Break),
    0x0e => ("invalid quantity", Action::Break),
    0x13 => ("invalid amount", Action::Break),
    0x16 => ("shift is open, operation impossible", Action::Break),
    0x20 => ("document overflow", Action::Break),
    0x21 => ("clock is not set", Action::Break),
    0x2b => ("cancellation impossible", Action::Break),
    0x33 => ("invalid parameter value", Action::Break),
    0x45 => ("payment total is below the receipt total", Action::Break),
    0x46 => ("not enough cash for the payout", Action::Break),
    0x47 => ("shift is over 24 hours", Action::Break),
    0x4a => ("a receipt is open, operation impossible", Action::Break),
    0x4b => ("receipt buffer overflow", Action::Break),
    0x4e => ("shift is closed, operation impossible", Action::Break),
    0x50 => ("the previous command is still printing", Action::Retry),
    0x58 => ("waiting for the continue-print command", Action::Wait),
    0x66 => ("the command does not print on this ribbon", Action::Break),
    0x67 => ("invalid table or field coordinates", Action::Break),
    0x68 => ("out of check ribbon", Action::Break),
    0x69 => ("out of journal ribbon", Action::Break),
    0x6a => ("document cancelled on paper feed", Action::Retry),
    0x72 => ("command not supported in this submode", Action::Break),
    0x73 => ("command not supported in this mode", Action::Break),
    0x74 => ("device memory failure", Action::Break),
    0x75 => ("power failure", Action::Break),
    0x76 => ("printer failure: no tachogenerator pulses", Action::Break),
    0x77 => ("printer failure: paper sensor", Action::Break),
    0x78 => ("the cover is open", Action::Break),
    0x79 => ("the cutter has failed", Action::Break),
    0x9c => ("shift is already open", Action::Break),
    _ => ("unrecognized device error", Action::Break),
  }
}

/// Operating mode, as reported in status replies.
pub fn mode_description(mode: u8) -> &'static str {
  match mode {
    1 => "issuing data",
    2 => "open shift, 24 hours not expired",
    3 => "open shift, 24 hours expired",
    4 => "closed shift",
    5 => "blocked after a wrong tax officer password",
    6 => "waiting for date confirmation",
    7 => "decimal point change allowed",
    8 => "open document",
    9 => "technological reset allowed",
    10 => "test run",
    11 => "printing a full fiscal report",
    12 => "printing a long fiscal-memory report",
    13 => "slip document in progress",
    14 => "slip document printing",
    15 => "slip document formed",
    _ => "?",
  }
}

/// Operating submode; only the print-capable modes define them.
/// Submode 0 is the readiness signal: printing has finished.
pub fn submode_description(mode: u8, submode: u8) -> &'static str {
  match mode {
    2 | 3 | 8 | 11 | 13 | 14 | 15 => match submode {
      0 => "paper present, printing finished",
      1 => "passive paper out",
      2 => "active paper out",
      3 => "resuming after active paper out",
      4 => "printing a full fiscal report",
      5 => "printing an operation",
      _ => "?",
    },
    _ => "?",
  }
}
