use serde::Serialize;

use crate::command::CommandKind;
use crate::constants::{mode_description, submode_description};
use crate::error::{Error, Result};
use crate::util::{bits, decode_text};

/// Decoded reply payloads, one variant per reply shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Reply {
  /// No payload: discovery, readiness probes, failed exchanges.
  None,
  /// The common single-byte acknowledgement.
  Operator { operator: u8 },
  /// Document-producing operations also echo the document number.
  Document { operator: u8, document: u8 },
  /// Date/time programming echoes a result byte.
  Confirmation { error: u8 },
  Autocut { auto_cut: bool },
  CashReg { operator: u8, value: f64 },
  ExchangeParam { operator: u8, rate: u8 },
  DeviceMetrics(DeviceMetrics),
  ShortStatus(ShortStatus),
  Status(Status),
  FoundDevice { port: String, rate: u32 },
  Ready { ready: Option<bool> },
}

/// The 16-bit device flag vector, decomposed bit 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceFlags {
  pub check_ribbon: bool,
  pub journal_ribbon: bool,
  pub slip_ribbon: bool,
  pub slip_control: bool,
  pub dec_point_position: bool,
  pub eklz_present: bool,
  pub journal_optic_control: bool,
  pub check_optic_control: bool,
  pub journal_lever: bool,
  pub check_lever: bool,
  pub cover_is_opened: bool,
  pub print_left_control: bool,
  pub print_right_control: bool,
  pub drawer_state: bool,
  pub eklz_is_over: bool,
  pub quantity_dec_point: bool,
}

impl DeviceFlags {
  fn decode(low: u8, high: u8) -> DeviceFlags {
    let lo = bits(low);
    let hi = bits(high);
    DeviceFlags {
      check_ribbon: lo[0],
      journal_ribbon: lo[1],
      slip_ribbon: lo[2],
      slip_control: lo[3],
      dec_point_position: lo[4],
      eklz_present: lo[5],
      journal_optic_control: lo[6],
      check_optic_control: lo[7],
      journal_lever: hi[0],
      check_lever: hi[1],
      cover_is_opened: hi[2],
      print_left_control: hi[3],
      print_right_control: hi[4],
      drawer_state: hi[5],
      eklz_is_over: hi[6],
      quantity_dec_point: hi[7],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortStatus {
  pub operator: u8,
  pub flags: DeviceFlags,
  pub mode: u8,
  pub submode: u8,
  pub mode_description: &'static str,
  pub submode_description: &'static str,
  pub registrations_count: u8,
  pub reserve_battery_voltage: u8,
  pub main_battery_voltage: u8,
  pub fp_error: u8,
  pub eklz_error: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
  pub operator: u8,
  pub soft_version: String,
  pub soft_build_number: u16,
  /// Firmware build date, `dd.mm.yy`.
  pub soft_build_date: String,
  pub logical_cash_number: u8,
  pub last_document_number: u8,
  pub flags: DeviceFlags,
  pub mode: u8,
  pub submode: u8,
  pub mode_description: &'static str,
  pub submode_description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMetrics {
  pub major_prot_version: u8,
  pub minor_prot_version: u8,
  pub device_type: u8,
  pub device_subtype: u8,
  pub device_model: u8,
  pub device_codepage: u8,
  pub description: String,
}

impl Reply {
  /// Decodes a reply payload for the command that produced it (the
  /// response codec).
  pub fn parse(kind: CommandKind, data: &[u8]) -> Result<Reply> {
    match kind {
      CommandKind::Beep
      | CommandKind::CancelCheck
      | CommandKind::CloseCheck
      | CommandKind::ContinuePrint
      | CommandKind::CutCheck
      | CommandKind::FeedDocument
      | CommandKind::InterruptTest
      | CommandKind::OpenSession
      | CommandKind::PrintBarcode
      | CommandKind::PrintImage
      | CommandKind::PrintReportWithCleaning
      | CommandKind::PrintReportWithoutCleaning
      | CommandKind::PrintString
      | CommandKind::PrintWideString
      | CommandKind::ReturnSale
      | CommandKind::Sale => Ok(Reply::Operator {
        operator: byte(data, 0)?,
      }),

      CommandKind::CashIncome | CommandKind::CashOutcome => Ok(Reply::Document {
        operator: byte(data, 0)?,
        document: byte(data, 1)?,
      }),

      CommandKind::ConfirmDate | CommandKind::SetDate | CommandKind::SetTime => {
        Ok(Reply::Confirmation {
          error: byte(data, 0)?,
        })
      }

      CommandKind::GetAutocutParam => Ok(Reply::Autocut {
        auto_cut: byte(data, 0)? != 0,
      }),

      CommandKind::GetCashReg => parse_cash_reg(data),

      CommandKind::GetDeviceMetrics => parse_device_metrics(data),

      CommandKind::GetExchangeParam => Ok(Reply::ExchangeParam {
        operator: byte(data, 0)?,
        rate: byte(data, 1)?,
      }),

      CommandKind::GetShortStatus => parse_short_status(data),

      CommandKind::GetStatus => parse_status(data),

      CommandKind::SetExchangeParam => Ok(Reply::Operator {
        operator: byte(data, 0)?,
      }),
    }
  }
}

fn byte(data: &[u8], index: usize) -> Result<u8> {
  data
    .get(index)
    .copied()
    .ok_or_else(|| Error::Packet(format!("reply too short: {:x?}", data)))
}

/// Register value: little-endian integer hundredths after the operator
/// byte; trailing NULs carry no information.
fn parse_cash_reg(data: &[u8]) -> Result<Reply> {
  let operator = byte(data, 0)?;
  let mut value: u64 = 0;
  for (i, item) in data[1..].iter().take(8).enumerate() {
    value |= u64::from(*item) << (8 * i);
  }
  Ok(Reply::CashReg {
    operator,
    value: value as f64 / 100.0,
  })
}

fn parse_device_metrics(data: &[u8]) -> Result<Reply> {
  byte(data, 5)?;
  Ok(Reply::DeviceMetrics(DeviceMetrics {
    major_prot_version: data[0],
    minor_prot_version: data[1],
    device_type: data[2],
    device_subtype: data[3],
    device_model: data[4],
    device_codepage: data[5],
    description: decode_text(&data[6..]),
  }))
}

fn parse_short_status(data: &[u8]) -> Result<Reply> {
  byte(data, 9)?;
  let mode = data[3];
  let submode = data[4];
  Ok(Reply::ShortStatus(ShortStatus {
    operator: data[0],
    flags: DeviceFlags::decode(data[2], data[1]),
    mode,
    submode,
    mode_description: mode_description(mode),
    submode_description: submode_description(mode, submode),
    registrations_count: data[5],
    reserve_battery_voltage: data[6],
    main_battery_voltage: data[7],
    fp_error: data[8],
    eklz_error: data[9],
  }))
}

fn parse_status(data: &[u8]) -> Result<Reply> {
  byte(data, 14)?;
  let mode = data[13];
  let submode = data[14];
  Ok(Reply::Status(Status {
    operator: data[0],
    soft_version: format!("{}.{}", data[1] as char, data[2] as char),
    soft_build_number: u16::from_le_bytes([data[3], data[4]]),
    soft_build_date: format!("{:02}.{:02}.{:02}", data[5], data[6], data[7]),
    logical_cash_number: data[8],
    last_document_number: data[9],
    flags: DeviceFlags::decode(data[11], data[10]),
    mode,
    submode,
    mode_description: mode_description(mode),
    submode_description: submode_description(mode, submode),
  }))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_operator_replies() {
    let reply = Reply::parse(CommandKind::Sale, &[0x1e]).unwrap();
    assert_eq!(reply, Reply::Operator { operator: 0x1e });

    let reply = Reply::parse(CommandKind::CashIncome, &[0x1e, 0x07]).unwrap();
    assert_eq!(
      reply,
      Reply::Document {
        operator: 0x1e,
        document: 0x07
      }
    );

    let reply = Reply::parse(CommandKind::SetDate, &[0x00]).unwrap();
    assert_eq!(reply, Reply::Confirmation { error: 0x00 });
  }

  #[test]
  fn test_short_reply_is_a_packet_error() {
    assert!(Reply::parse(CommandKind::Sale, &[]).is_err());
    assert!(Reply::parse(CommandKind::GetShortStatus, &[0x1e, 0x00]).is_err());
  }

  #[test]
  fn test_cash_reg_value() {
    // 123456 hundredths = 1234.56, little-endian, NUL-padded
    let reply = Reply::parse(
      CommandKind::GetCashReg,
      &[0x1e, 0x40, 0xe2, 0x01, 0x00, 0x00, 0x00],
    )
    .unwrap();
    assert_eq!(
      reply,
      Reply::CashReg {
        operator: 0x1e,
        value: 1234.56
      }
    );
  }

  #[test]
  fn test_short_status_decoding() {
    let data = [
      0x1e, // operator
      0b0000_0011, // flags high byte: journal_lever, check_lever
      0b0000_0101, // flags low byte: check_ribbon, slip_ribbon
      8,    // mode: open document
      0,    // submode: printing finished
      2,    // registrations in the check
      70,   // reserve battery
      57,   // main battery
      0,    // fp error
      0,    // fiscal memory module error
    ];
    let reply = Reply::parse(CommandKind::GetShortStatus, &data).unwrap();
    let status = match reply {
      Reply::ShortStatus(status) => status,
      other => panic!("unexpected reply: {:?}", other),
    };

    assert!(status.flags.check_ribbon);
    assert!(!status.flags.journal_ribbon);
    assert!(status.flags.slip_ribbon);
    assert!(status.flags.journal_lever);
    assert!(status.flags.check_lever);
    assert!(!status.flags.cover_is_opened);
    assert_eq!(status.mode, 8);
    assert_eq!(status.submode, 0);
    assert_eq!(status.mode_description, "open document");
    assert_eq!(status.submode_description, "paper present, printing finished");
    assert_eq!(status.registrations_count, 2);
  }

  #[test]
  fn test_status_decoding() {
    let data = [
      0x1e, // operator
      b'A', b'4', // software version
      0x22, 0x01, // build number 290
      21, 3, 17, // build date
      1,    // logical cash number
      42,   // last document number
      0b0000_0000, // flags high
      0b0000_0001, // flags low: check_ribbon
      0x01, // port
      4,    // mode: closed shift
      0,    // submode
    ];
    let reply = Reply::parse(CommandKind::GetStatus, &data).unwrap();
    let status = match reply {
      Reply::Status(status) => status,
      other => panic!("unexpected reply: {:?}", other),
    };

    assert_eq!(status.soft_version, "A.4");
    assert_eq!(status.soft_build_number, 290);
    assert_eq!(status.soft_build_date, "21.03.17");
    assert_eq!(status.last_document_number, 42);
    assert!(status.flags.check_ribbon);
    assert_eq!(status.mode, 4);
    assert_eq!(status.mode_description, "closed shift");
  }

  #[test]
  fn test_device_metrics_decoding() {
    let mut data = vec![1, 5, 0x0a, 0x01, 0x02, 0xc5];
    data.extend_from_slice(&crate::util::encode_text("ШТРИХ-ФР-К"));

    let reply = Reply::parse(CommandKind::GetDeviceMetrics, &data).unwrap();
    let metrics = match reply {
      Reply::DeviceMetrics(metrics) => metrics,
      other => panic!("unexpected reply: {:?}", other),
    };
    assert_eq!(metrics.major_prot_version, 1);
    assert_eq!(metrics.minor_prot_version, 5);
    assert_eq!(metrics.description, "ШТРИХ-ФР-К");
  }
}
