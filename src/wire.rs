//! Byte-level framing: the ENQ/ACK/NAK line discipline and the
//! STX-delimited, XOR-checksummed frames both families speak.

use std::time::Duration;

use bytes::{Bytes, BytesMut, BufMut};

use crate::constants::*;
use crate::error::Result;
use crate::util::crc;

/// Answer to the ENQ line probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
  /// NAK received: the device is ready for a command.
  Ready,
  /// ACK received: a stale reply is pending and must be drained first.
  ReplyPending,
  /// Nothing intelligible on the line.
  NoSignal,
}

/// One frame read attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
  /// Frame missing, damaged, or incomplete; a NAK was sent where a
  /// checksum failed.
  Retry { err_code: u8 },
  /// A verified frame.
  Frame {
    opcode: u8,
    err_code: u8,
    data: Bytes,
  },
}

/// The byte channel the framer runs over.
///
/// `PortManager` is the production implementation; tests substitute a
/// scripted device. The channel owns its reconfiguration, so everything
/// above the framer stays generic.
pub trait Wire {
  fn is_open(&self) -> bool;
  fn flush(&mut self) -> Result<()>;
  fn write_all(&mut self, data: &[u8]) -> Result<()>;

  /// Reads one byte; `None` on timeout.
  fn read_byte(&mut self) -> Result<Option<u8>>;

  fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;

  /// Closes and reopens the channel on a new port and rate. Failure must
  /// leave the channel closed.
  fn reconnect(&mut self, port: &str, rate: u32) -> Result<()>;

  fn close(&mut self);

  /// Scans for a device, returning the first (port, rate) pair that
  /// answers the ENQ probe.
  fn find_device(&mut self, port_group: Option<&str>, rate: Option<u32>) -> Result<(String, u32)>;
}

fn read_bytes<W: Wire>(wire: &mut W, count: usize) -> Result<Option<BytesMut>> {
  let mut buf = BytesMut::with_capacity(count);
  for _ in 0..count {
    match wire.read_byte()? {
      Some(byte) => buf.put_u8(byte),
      None => return Ok(None),
    }
  }
  Ok(Some(buf))
}

/// Probes the line with ENQ. Any channel failure reads as silence.
pub fn check_state<W: Wire>(wire: &mut W) -> LineState {
  if !wire.is_open() {
    return LineState::NoSignal;
  }
  if wire.flush().is_err() || wire.write_all(&[ENQ]).is_err() {
    return LineState::NoSignal;
  }
  match wire.read_byte() {
    Ok(Some(byte)) if byte == NAK => LineState::Ready,
    Ok(Some(byte)) if byte == ACK => LineState::ReplyPending,
    _ => LineState::NoSignal,
  }
}

/// Assembles `STX | length | opcode | [password] | parameters | CRC`,
/// where the CRC is the XOR of everything between STX and itself.
pub fn build_frame(opcode: u8, password: Option<&[u8; 4]>, parameters: &[u8]) -> BytesMut {
  let mut body = BytesMut::with_capacity(parameters.len() + 6);
  let length = 1 + password.map(|p| p.len()).unwrap_or(0) + parameters.len();
  body.put_u8(length as u8);
  body.put_u8(opcode);
  if let Some(password) = password {
    body.put_slice(password);
  }
  body.put_slice(parameters);

  let sum = crc(&body);
  let mut frame = BytesMut::with_capacity(body.len() + 2);
  frame.put_u8(STX);
  frame.put(body);
  frame.put_u8(sum);
  frame
}

/// Sends one command frame, waiting for the device's ACK after each
/// attempt. `wait_time` (seconds) becomes the read timeout for the
/// exchange. No ACK within `MAX_TRIES` attempts means the channel is
/// gone.
pub fn send_frame<W: Wire>(
  wire: &mut W,
  opcode: u8,
  password: Option<&[u8; 4]>,
  parameters: &[u8],
  wait_time: f64,
) -> Result<LineState> {
  let frame = build_frame(opcode, password, parameters);

  for _ in 0..MAX_TRIES {
    wire.write_all(&frame)?;
    wire.set_read_timeout(Duration::from_secs_f64(wait_time))?;
    if let Some(ACK) = wire.read_byte()? {
      return Ok(LineState::Ready);
    }
    trace!("no ACK for opcode {:#04x}, resending", opcode);
  }

  Ok(LineState::NoSignal)
}

/// Reads one reply frame: `STX | length | opcode | err_code | data | CRC`.
/// A checksum mismatch is answered with NAK so the device retransmits; a
/// verified frame is acknowledged, including the trailing handshake byte
/// the device closes the exchange with.
pub fn read_frame<W: Wire>(wire: &mut W) -> Result<ReadOutcome> {
  match wire.read_byte()? {
    Some(byte) if byte == STX => (),
    _ => return Ok(ReadOutcome::Retry { err_code: 0 }),
  }

  let length = match wire.read_byte()? {
    Some(length) => length,
    None => return Ok(ReadOutcome::Retry { err_code: 0 }),
  };
  let opcode = match wire.read_byte()? {
    Some(opcode) => opcode,
    None => return Ok(ReadOutcome::Retry { err_code: 0 }),
  };
  let err_code = match wire.read_byte()? {
    Some(err_code) => err_code,
    None => return Ok(ReadOutcome::Retry { err_code: 0 }),
  };

  let data = match read_bytes(wire, usize::from(length.saturating_sub(2)))? {
    Some(data) => data,
    None => return Ok(ReadOutcome::Retry { err_code }),
  };
  let device_crc = match wire.read_byte()? {
    Some(device_crc) => device_crc,
    None => return Ok(ReadOutcome::Retry { err_code }),
  };

  let mut body = BytesMut::with_capacity(data.len() + 3);
  body.put_u8(length);
  body.put_u8(opcode);
  body.put_u8(err_code);
  body.put_slice(&data);

  if device_crc != crc(&body) {
    debug!(
      "checksum mismatch: expected {:#04x}, received {:#04x}",
      crc(&body),
      device_crc
    );
    wire.write_all(&[NAK])?;
    return Ok(ReadOutcome::Retry { err_code });
  }

  wire.write_all(&[ACK])?;
  // the device closes the exchange with one more handshake byte
  let _ = wire.read_byte()?;

  Ok(ReadOutcome::Frame {
    opcode,
    err_code,
    data: data.freeze(),
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::testing::QueueWire;

  /// Device-form frame: `STX | length | opcode | err_code | data | CRC`.
  fn device_frame(opcode: u8, err_code: u8, data: &[u8]) -> Vec<u8> {
    let mut body = vec![(data.len() + 2) as u8, opcode, err_code];
    body.extend_from_slice(data);
    let sum = crc(&body);
    let mut frame = vec![STX];
    frame.extend_from_slice(&body);
    frame.push(sum);
    frame
  }

  #[test]
  fn test_build_frame_layout() {
    let frame = build_frame(0x13, Some(&PASSWORD), &[]);
    // STX, length (opcode + password), opcode, password, CRC
    assert_eq!(frame[0], STX);
    assert_eq!(frame[1], 5);
    assert_eq!(frame[2], 0x13);
    assert_eq!(&frame[3..7], &PASSWORD[..]);
    assert_eq!(frame[7], crc(&frame[1..7]));
  }

  #[test]
  fn test_build_frame_without_password() {
    let frame = build_frame(0x23, None, &[0x0f, 0x07, 0x18]);
    assert_eq!(frame[1], 4);
    assert_eq!(frame[2], 0x23);
    assert_eq!(&frame[3..6], &[0x0f, 0x07, 0x18]);
    assert_eq!(frame[6], crc(&frame[1..6]));
  }

  #[test]
  fn test_read_frame_round_trip() {
    let mut wire = QueueWire::new();
    wire.feed(&device_frame(0x80, 0x00, &[0x1e]));

    let outcome = read_frame(&mut wire).unwrap();
    assert_eq!(
      outcome,
      ReadOutcome::Frame {
        opcode: 0x80,
        err_code: 0x00,
        data: Bytes::from_static(&[0x1e]),
      }
    );
    // the good frame was acknowledged
    assert_eq!(wire.written, vec![ACK]);
  }

  #[test]
  fn test_single_bit_corruption_is_rejected() {
    let frame = device_frame(0x10, 0x00, &[0x1e, 0x00, 0x01]);

    // flip every bit of every byte after the STX, checksum included
    for index in 1..frame.len() {
      for bit in 0..8 {
        let mut corrupted = frame.clone();
        corrupted[index] ^= 1 << bit;
        if corrupted[1] != frame[1] {
          // a corrupted length byte desynchronizes the read instead
          continue;
        }

        let mut wire = QueueWire::new();
        wire.feed(&corrupted);

        match read_frame(&mut wire).unwrap() {
          ReadOutcome::Retry { .. } => (),
          other => panic!("corrupted frame was accepted: {:?}", other),
        }
        assert_eq!(wire.written, vec![NAK]);
      }
    }
  }

  #[test]
  fn test_missing_stx_is_a_retry() {
    let mut wire = QueueWire::new();
    wire.feed(&[0xff, 0x00]);
    assert_eq!(
      read_frame(&mut wire).unwrap(),
      ReadOutcome::Retry { err_code: 0 }
    );
    // garbage is not NAKed, only checksum failures are
    assert!(wire.written.is_empty());
  }

  #[test]
  fn test_truncated_frame_is_a_retry() {
    let frame = device_frame(0x10, 0x00, &[0x1e, 0x00, 0x01]);
    let mut wire = QueueWire::new();
    wire.feed(&frame[..4]);
    assert_eq!(
      read_frame(&mut wire).unwrap(),
      ReadOutcome::Retry { err_code: 0x00 }
    );
  }

  #[test]
  fn test_send_frame_gives_up_without_ack() {
    let mut wire = QueueWire::new();
    let state = send_frame(&mut wire, 0x13, Some(&PASSWORD), &[], DEF_TIMEOUT).unwrap();
    assert_eq!(state, LineState::NoSignal);
    // one frame per attempt
    let frame = build_frame(0x13, Some(&PASSWORD), &[]);
    assert_eq!(wire.written.len(), frame.len() * MAX_TRIES);
  }

  #[test]
  fn test_check_state_maps_probe_answers() {
    let mut wire = QueueWire::new();
    wire.feed(&[NAK]);
    assert_eq!(check_state(&mut wire), LineState::Ready);
    assert_eq!(wire.written, vec![ENQ]);

    let mut wire = QueueWire::new();
    wire.feed(&[ACK]);
    assert_eq!(check_state(&mut wire), LineState::ReplyPending);

    let mut wire = QueueWire::new();
    assert_eq!(check_state(&mut wire), LineState::NoSignal);
  }
}
