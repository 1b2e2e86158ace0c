use bytes::{BufMut, BytesMut};

use crate::constants::ERR_UNKNOWN_COMMAND;
use crate::error::{Error, Result};
use crate::profile::DeviceProfile;
use crate::util::*;

/// Calendar date as the device understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
  pub day: u8,
  pub month: u8,
  pub year: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
}

/// The command catalog: every operation the device families accept,
/// independent of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
  Beep,
  CancelCheck,
  CashIncome,
  CashOutcome,
  CloseCheck,
  ConfirmDate,
  ContinuePrint,
  CutCheck,
  FeedDocument,
  GetAutocutParam,
  GetCashReg,
  GetDeviceMetrics,
  GetExchangeParam,
  GetShortStatus,
  GetStatus,
  InterruptTest,
  OpenSession,
  PrintBarcode,
  PrintImage,
  PrintReportWithCleaning,
  PrintReportWithoutCleaning,
  PrintString,
  PrintWideString,
  ReturnSale,
  Sale,
  SetDate,
  SetExchangeParam,
  SetTime,
}

pub const COMMANDS: [CommandKind; 28] = [
  CommandKind::Beep,
  CommandKind::CancelCheck,
  CommandKind::CashIncome,
  CommandKind::CashOutcome,
  CommandKind::CloseCheck,
  CommandKind::ConfirmDate,
  CommandKind::ContinuePrint,
  CommandKind::CutCheck,
  CommandKind::FeedDocument,
  CommandKind::GetAutocutParam,
  CommandKind::GetCashReg,
  CommandKind::GetDeviceMetrics,
  CommandKind::GetExchangeParam,
  CommandKind::GetShortStatus,
  CommandKind::GetStatus,
  CommandKind::InterruptTest,
  CommandKind::OpenSession,
  CommandKind::PrintBarcode,
  CommandKind::PrintImage,
  CommandKind::PrintReportWithCleaning,
  CommandKind::PrintReportWithoutCleaning,
  CommandKind::PrintString,
  CommandKind::PrintWideString,
  CommandKind::ReturnSale,
  CommandKind::Sale,
  CommandKind::SetDate,
  CommandKind::SetExchangeParam,
  CommandKind::SetTime,
];

impl CommandKind {
  pub fn opcode(self) -> u8 {
    match self {
      CommandKind::GetShortStatus => 0x10,
      CommandKind::GetStatus => 0x11,
      CommandKind::PrintWideString => 0x12,
      CommandKind::Beep => 0x13,
      CommandKind::SetExchangeParam => 0x14,
      CommandKind::GetExchangeParam => 0x15,
      CommandKind::PrintString => 0x17,
      CommandKind::GetCashReg => 0x1a,
      CommandKind::GetAutocutParam => 0x1f,
      CommandKind::SetTime => 0x21,
      CommandKind::SetDate => 0x22,
      CommandKind::ConfirmDate => 0x23,
      CommandKind::CutCheck => 0x25,
      CommandKind::InterruptTest => 0x27,
      CommandKind::FeedDocument => 0x29,
      CommandKind::PrintReportWithoutCleaning => 0x40,
      CommandKind::PrintReportWithCleaning => 0x41,
      CommandKind::CashIncome => 0x50,
      CommandKind::CashOutcome => 0x51,
      CommandKind::Sale => 0x80,
      CommandKind::ReturnSale => 0x82,
      CommandKind::CloseCheck => 0x85,
      CommandKind::CancelCheck => 0x88,
      CommandKind::ContinuePrint => 0xb0,
      CommandKind::PrintImage => 0xc1,
      CommandKind::PrintBarcode => 0xc2,
      CommandKind::OpenSession => 0xe0,
      CommandKind::GetDeviceMetrics => 0xfc,
    }
  }

  /// Stable snake_case name; SMART metrics and the host surface key
  /// commands by it.
  pub fn name(self) -> &'static str {
    match self {
      CommandKind::Beep => "beep",
      CommandKind::CancelCheck => "cancel_check",
      CommandKind::CashIncome => "cash_income",
      CommandKind::CashOutcome => "cash_outcome",
      CommandKind::CloseCheck => "close_check",
      CommandKind::ConfirmDate => "confirm_date",
      CommandKind::ContinuePrint => "continue_print",
      CommandKind::CutCheck => "cut_check",
      CommandKind::FeedDocument => "feed_document",
      CommandKind::GetAutocutParam => "get_autocut_param",
      CommandKind::GetCashReg => "get_cash_reg",
      CommandKind::GetDeviceMetrics => "get_device_metrics",
      CommandKind::GetExchangeParam => "get_exchange_param",
      CommandKind::GetShortStatus => "get_short_status",
      CommandKind::GetStatus => "get_status",
      CommandKind::InterruptTest => "interrupt_test",
      CommandKind::OpenSession => "open_session",
      CommandKind::PrintBarcode => "print_barcode",
      CommandKind::PrintImage => "print_image",
      CommandKind::PrintReportWithCleaning => "print_report_with_cleaning",
      CommandKind::PrintReportWithoutCleaning => "print_report_without_cleaning",
      CommandKind::PrintString => "print_string",
      CommandKind::PrintWideString => "print_wide_string",
      CommandKind::ReturnSale => "return_sale",
      CommandKind::Sale => "sale",
      CommandKind::SetDate => "set_date",
      CommandKind::SetExchangeParam => "set_exchange_param",
      CommandKind::SetTime => "set_time",
    }
  }

  pub fn description(self) -> &'static str {
    match self {
      CommandKind::Beep => "sound the buzzer",
      CommandKind::CancelCheck => "cancel the open check",
      CommandKind::CashIncome => "cash deposit",
      CommandKind::CashOutcome => "cash payout",
      CommandKind::CloseCheck => "close the check",
      CommandKind::ConfirmDate => "confirm the programmed date",
      CommandKind::ContinuePrint => "resume printing",
      CommandKind::CutCheck => "cut the check",
      CommandKind::FeedDocument => "feed the ribbon",
      CommandKind::GetAutocutParam => "read the autocut setting",
      CommandKind::GetCashReg => "read a cash register",
      CommandKind::GetDeviceMetrics => "read device identification",
      CommandKind::GetExchangeParam => "read exchange parameters",
      CommandKind::GetShortStatus => "short status request",
      CommandKind::GetStatus => "status request",
      CommandKind::InterruptTest => "interrupt the test run",
      CommandKind::OpenSession => "open a shift",
      CommandKind::PrintBarcode => "print an EAN-13 barcode",
      CommandKind::PrintImage => "print the loaded image",
      CommandKind::PrintReportWithCleaning => "daily report with cleaning",
      CommandKind::PrintReportWithoutCleaning => "daily report without cleaning",
      CommandKind::PrintString => "print a line",
      CommandKind::PrintWideString => "print a bold line",
      CommandKind::ReturnSale => "return of a sale",
      CommandKind::Sale => "sale",
      CommandKind::SetDate => "set the date",
      CommandKind::SetExchangeParam => "set exchange parameters",
      CommandKind::SetTime => "set the time",
    }
  }

  /// Looks a command up by its snake_case name.
  pub fn from_name(name: &str) -> Result<CommandKind> {
    COMMANDS
      .iter()
      .copied()
      .find(|kind| kind.name() == name)
      .ok_or_else(|| Error::command(ERR_UNKNOWN_COMMAND))
  }

  /// Commands sent without the password prefix.
  pub fn needs_password(self) -> bool {
    !matches!(self, CommandKind::ConfirmDate)
  }

  /// Commands that open a fiscal document; from here until close, the
  /// device sits in the critical print zone.
  pub fn is_critical(self) -> bool {
    matches!(
      self,
      CommandKind::Sale
        | CommandKind::ReturnSale
        | CommandKind::CashIncome
        | CommandKind::CashOutcome
    )
  }

  /// Commands that close the document; trailing side effects (cut, beep)
  /// are still expected after them.
  pub fn is_post_critical(self) -> bool {
    matches!(self, CommandKind::CloseCheck | CommandKind::CancelCheck)
  }

  /// The cancellation counterpart run when a critical command hangs.
  pub fn rollback(self) -> Option<CommandKind> {
    if self.is_critical() {
      Some(CommandKind::CancelCheck)
    } else {
      None
    }
  }

  /// Mandatory quiet period after the command completes, in seconds.
  pub fn final_time(self) -> Option<f64> {
    match self {
      CommandKind::CutCheck | CommandKind::OpenSession => Some(1.0),
      CommandKind::PrintReportWithCleaning | CommandKind::PrintReportWithoutCleaning => Some(3.0),
      _ => None,
    }
  }

  /// Commands whose duration depends on the operator rather than the
  /// device; their positive deltas are excluded from calibration.
  pub fn is_waiting(self) -> bool {
    matches!(self, CommandKind::ContinuePrint)
  }
}

/// A command together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Beep,
  CancelCheck,
  CashIncome {
    cash: f64,
  },
  CashOutcome {
    cash: f64,
  },
  CloseCheck {
    sums: [f64; 4],
    discount: f64,
    taxes: [u8; 4],
    text: String,
  },
  ConfirmDate {
    date: Date,
  },
  ContinuePrint,
  CutCheck {
    full_cut: bool,
  },
  FeedDocument {
    rows: u8,
    check: bool,
    journal: bool,
    slip: bool,
  },
  GetAutocutParam,
  GetCashReg {
    register: u8,
  },
  GetDeviceMetrics,
  GetExchangeParam {
    port: u8,
  },
  GetShortStatus,
  GetStatus,
  InterruptTest,
  OpenSession,
  PrintBarcode {
    number: u64,
  },
  PrintImage {
    start_row: u8,
    end_row: u8,
  },
  PrintReportWithCleaning,
  PrintReportWithoutCleaning,
  PrintString {
    text: String,
    on_check: bool,
    on_journal: bool,
    align: Align,
    fill: char,
  },
  PrintWideString {
    text: String,
    on_check: bool,
    on_journal: bool,
    align: Align,
    fill: char,
  },
  ReturnSale {
    price: f64,
    count: u32,
    department: u8,
    taxes: [u8; 4],
    text: String,
  },
  Sale {
    price: f64,
    count: u32,
    department: u8,
    taxes: [u8; 4],
    text: String,
  },
  SetDate {
    date: Date,
  },
  SetExchangeParam {
    port: u8,
    rate: u8,
  },
  SetTime {
    time: Time,
  },
}

impl Command {
  pub fn kind(&self) -> CommandKind {
    match self {
      Command::Beep => CommandKind::Beep,
      Command::CancelCheck => CommandKind::CancelCheck,
      Command::CashIncome { .. } => CommandKind::CashIncome,
      Command::CashOutcome { .. } => CommandKind::CashOutcome,
      Command::CloseCheck { .. } => CommandKind::CloseCheck,
      Command::ConfirmDate { .. } => CommandKind::ConfirmDate,
      Command::ContinuePrint => CommandKind::ContinuePrint,
      Command::CutCheck { .. } => CommandKind::CutCheck,
      Command::FeedDocument { .. } => CommandKind::FeedDocument,
      Command::GetAutocutParam => CommandKind::GetAutocutParam,
      Command::GetCashReg { .. } => CommandKind::GetCashReg,
      Command::GetDeviceMetrics => CommandKind::GetDeviceMetrics,
      Command::GetExchangeParam { .. } => CommandKind::GetExchangeParam,
      Command::GetShortStatus => CommandKind::GetShortStatus,
      Command::GetStatus => CommandKind::GetStatus,
      Command::InterruptTest => CommandKind::InterruptTest,
      Command::OpenSession => CommandKind::OpenSession,
      Command::PrintBarcode { .. } => CommandKind::PrintBarcode,
      Command::PrintImage { .. } => CommandKind::PrintImage,
      Command::PrintReportWithCleaning => CommandKind::PrintReportWithCleaning,
      Command::PrintReportWithoutCleaning => CommandKind::PrintReportWithoutCleaning,
      Command::PrintString { .. } => CommandKind::PrintString,
      Command::PrintWideString { .. } => CommandKind::PrintWideString,
      Command::ReturnSale { .. } => CommandKind::ReturnSale,
      Command::Sale { .. } => CommandKind::Sale,
      Command::SetDate { .. } => CommandKind::SetDate,
      Command::SetExchangeParam { .. } => CommandKind::SetExchangeParam,
      Command::SetTime { .. } => CommandKind::SetTime,
    }
  }

  /// Builds the commands that take no parameters; `None` for the rest.
  pub fn parameterless(kind: CommandKind) -> Option<Command> {
    match kind {
      CommandKind::Beep => Some(Command::Beep),
      CommandKind::CancelCheck => Some(Command::CancelCheck),
      CommandKind::ContinuePrint => Some(Command::ContinuePrint),
      CommandKind::GetAutocutParam => Some(Command::GetAutocutParam),
      CommandKind::GetDeviceMetrics => Some(Command::GetDeviceMetrics),
      CommandKind::GetShortStatus => Some(Command::GetShortStatus),
      CommandKind::GetStatus => Some(Command::GetStatus),
      CommandKind::InterruptTest => Some(Command::InterruptTest),
      CommandKind::OpenSession => Some(Command::OpenSession),
      CommandKind::PrintReportWithCleaning => Some(Command::PrintReportWithCleaning),
      CommandKind::PrintReportWithoutCleaning => Some(Command::PrintReportWithoutCleaning),
      _ => None,
    }
  }

  /// Sale line with the usual defaults: one unit, department 1, no
  /// taxes, a single space as the accompanying text.
  pub fn sale(price: f64) -> Command {
    Command::Sale {
      price,
      count: 1,
      department: 1,
      taxes: [0; 4],
      text: " ".to_string(),
    }
  }

  /// Encodes the parameter block (the request codec). Little-endian
  /// throughout; the profile supplies the family-specific coordinates.
  pub fn encode(&self, profile: &DeviceProfile) -> BytesMut {
    let mut buf = BytesMut::new();

    match self {
      Command::Beep
      | Command::CancelCheck
      | Command::ContinuePrint
      | Command::GetDeviceMetrics
      | Command::GetShortStatus
      | Command::GetStatus
      | Command::InterruptTest
      | Command::OpenSession
      | Command::PrintReportWithCleaning
      | Command::PrintReportWithoutCleaning => (),

      Command::CashIncome { cash } | Command::CashOutcome { cash } => {
        put_money(&mut buf, *cash);
      }

      Command::CloseCheck {
        sums,
        discount,
        taxes,
        text,
      } => {
        for sum in sums.iter() {
          put_money(&mut buf, *sum);
        }
        put_percent(&mut buf, *discount);
        buf.put_slice(taxes);
        put_text(&mut buf, text, TEXT_FIELD);
      }

      Command::ConfirmDate { date } | Command::SetDate { date } => {
        buf.put_u8(date.day);
        buf.put_u8(date.month);
        buf.put_u8((date.year % 1000) as u8);
      }

      Command::SetTime { time } => {
        buf.put_u8(time.hour);
        buf.put_u8(time.minute);
        buf.put_u8(time.second);
      }

      Command::CutCheck { full_cut } => {
        buf.put_u8(*full_cut as u8);
      }

      Command::FeedDocument {
        rows,
        check,
        journal,
        slip,
      } => {
        buf.put_u8(ribbon_flags(*check, *journal, *slip));
        buf.put_u8(*rows);
      }

      Command::GetAutocutParam => {
        // table 1, row 1 (two bytes), family-specific field
        buf.put_u8(0x01);
        buf.put_u16_le(0x0001);
        buf.put_u8(profile.autocut_field);
      }

      Command::GetCashReg { register } => {
        buf.put_u8(*register);
      }

      Command::GetExchangeParam { port } => {
        buf.put_u8(*port);
      }

      Command::PrintBarcode { number } => {
        buf.put_slice(&prepare_barcode(*number));
      }

      Command::PrintImage { start_row, end_row } => {
        buf.put_u8(*start_row);
        buf.put_u8(*end_row);
      }

      Command::PrintString {
        text,
        on_check,
        on_journal,
        align,
        fill,
      } => {
        buf.put_u8(ribbon_flags(*on_check, *on_journal, false));
        let line = format_string(text, profile.check_width, *align, *fill, false);
        buf.put_slice(&encode_text(&line));
      }

      Command::PrintWideString {
        text,
        on_check,
        on_journal,
        align,
        fill,
      } => {
        buf.put_u8(ribbon_flags(*on_check, *on_journal, false));
        let line = format_string(text, profile.check_width, *align, *fill, true);
        buf.put_slice(&encode_text(&line));
      }

      Command::Sale {
        price,
        count,
        department,
        taxes,
        text,
      }
      | Command::ReturnSale {
        price,
        count,
        department,
        taxes,
        text,
      } => {
        put_quantity(&mut buf, *count);
        put_money(&mut buf, *price);
        buf.put_u8(*department);
        buf.put_slice(taxes);
        put_text(&mut buf, text, TEXT_FIELD);
      }

      Command::SetExchangeParam { port, rate } => {
        buf.put_u8(*port);
        buf.put_u8(*rate);
      }
    }

    buf
  }
}

/// Ribbon selector: bit 0 check, bit 1 journal, bit 2 slip.
fn ribbon_flags(check: bool, journal: bool, slip: bool) -> u8 {
  let mut flag = 0;
  if check {
    flag |= 1;
  }
  if journal {
    flag |= 2;
  }
  if slip {
    flag |= 4;
  }
  flag
}
