//! Scripted device doubles for exercising the framer, session, engine,
//! and executor without a serial port.

use std::collections::VecDeque;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::util::crc;
use crate::wire::Wire;

/// A bare byte queue: reads pop pre-fed bytes, writes are recorded.
/// Used for framer-level tests.
pub struct QueueWire {
  incoming: VecDeque<u8>,
  pub written: Vec<u8>,
}

impl QueueWire {
  pub fn new() -> QueueWire {
    QueueWire {
      incoming: VecDeque::new(),
      written: Vec::new(),
    }
  }

  pub fn feed(&mut self, bytes: &[u8]) {
    self.incoming.extend(bytes.iter().copied());
  }
}

impl Wire for QueueWire {
  fn is_open(&self) -> bool {
    true
  }

  fn flush(&mut self) -> Result<()> {
    Ok(())
  }

  fn write_all(&mut self, data: &[u8]) -> Result<()> {
    self.written.extend_from_slice(data);
    Ok(())
  }

  fn read_byte(&mut self) -> Result<Option<u8>> {
    Ok(self.incoming.pop_front())
  }

  fn set_read_timeout(&mut self, _timeout: Duration) -> Result<()> {
    Ok(())
  }

  fn reconnect(&mut self, _port: &str, _rate: u32) -> Result<()> {
    Ok(())
  }

  fn close(&mut self) {}

  fn find_device(&mut self, _port_group: Option<&str>, _rate: Option<u32>) -> Result<(String, u32)> {
    Err(Error::connection(ERR_LOST_DEVICE))
  }
}

/// A reply the fake device will produce for the next accepted command.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
  pub err_code: u8,
  pub data: Vec<u8>,
  /// Corrupt the checksum of the first transmission; the retransmission
  /// after the host's NAK goes out clean.
  pub corrupt_crc: bool,
}

impl ScriptedReply {
  pub fn ok(data: &[u8]) -> ScriptedReply {
    ScriptedReply {
      err_code: 0,
      data: data.to_vec(),
      corrupt_crc: false,
    }
  }

  pub fn error(err_code: u8) -> ScriptedReply {
    ScriptedReply {
      err_code,
      data: Vec::new(),
      corrupt_crc: false,
    }
  }

  pub fn corrupted(data: &[u8]) -> ScriptedReply {
    ScriptedReply {
      err_code: 0,
      data: data.to_vec(),
      corrupt_crc: true,
    }
  }
}

/// A device double that speaks the line discipline: answers ENQ probes,
/// acknowledges command frames, and replays queued replies.
pub struct MockDevice {
  outgoing: VecDeque<u8>,
  replies: VecDeque<ScriptedReply>,
  stale: Option<ScriptedReply>,
  last_reply: Option<Vec<u8>>,
  open: bool,
  /// Raw command frames the host sent, in order.
  pub sent_frames: Vec<Vec<u8>>,
  /// Opcodes of accepted command frames, in order.
  pub opcodes: Vec<u8>,
}

impl MockDevice {
  pub fn new() -> MockDevice {
    MockDevice {
      outgoing: VecDeque::new(),
      replies: VecDeque::new(),
      stale: None,
      last_reply: None,
      open: true,
      sent_frames: Vec::new(),
      opcodes: Vec::new(),
    }
  }

  pub fn push_reply(&mut self, reply: ScriptedReply) {
    self.replies.push_back(reply);
  }

  /// The next ENQ probe will report a pending reply, which the host is
  /// expected to drain.
  pub fn set_stale_reply(&mut self, reply: ScriptedReply) {
    self.stale = Some(reply);
  }

  fn reply_frame(opcode: u8, reply: &ScriptedReply) -> (Vec<u8>, Vec<u8>) {
    let mut body = vec![(reply.data.len() + 2) as u8, opcode, reply.err_code];
    body.extend_from_slice(&reply.data);
    let sum = crc(&body);

    let mut clean = vec![STX];
    clean.extend_from_slice(&body);
    clean.push(sum);

    let mut first = clean.clone();
    if reply.corrupt_crc {
      if let Some(last) = first.last_mut() {
        *last ^= 0xff;
      }
    }
    (first, clean)
  }

  fn emit_reply(&mut self, opcode: u8) {
    let reply = self
      .replies
      .pop_front()
      .unwrap_or_else(|| ScriptedReply::ok(&[0x01]));
    let (first, clean) = MockDevice::reply_frame(opcode, &reply);
    self.last_reply = Some(clean);
    self.outgoing.extend(first);
  }
}

impl Wire for MockDevice {
  fn is_open(&self) -> bool {
    self.open
  }

  fn flush(&mut self) -> Result<()> {
    if self.open {
      Ok(())
    } else {
      Err(Error::connection(ERR_LOST_DEVICE))
    }
  }

  fn write_all(&mut self, data: &[u8]) -> Result<()> {
    if !self.open {
      return Err(Error::connection(ERR_LOST_DEVICE));
    }

    match data {
      [byte] if *byte == ENQ => {
        if let Some(stale) = self.stale.take() {
          self.outgoing.push_back(ACK);
          let (first, _) = MockDevice::reply_frame(0x10, &stale);
          self.outgoing.extend(first);
        } else {
          self.outgoing.push_back(NAK);
        }
      }
      [byte] if *byte == NAK => {
        // the host rejected the frame; retransmit it clean
        if let Some(frame) = self.last_reply.clone() {
          self.outgoing.extend(frame);
        }
      }
      [byte] if *byte == ACK => (),
      frame if frame.first() == Some(&STX) && frame.len() > 2 => {
        self.sent_frames.push(frame.to_vec());
        let opcode = frame[2];
        self.opcodes.push(opcode);
        self.outgoing.push_back(ACK);
        self.emit_reply(opcode);
      }
      other => {
        self.sent_frames.push(other.to_vec());
      }
    }

    Ok(())
  }

  fn read_byte(&mut self) -> Result<Option<u8>> {
    if !self.open {
      return Err(Error::connection(ERR_LOST_DEVICE));
    }
    Ok(self.outgoing.pop_front())
  }

  fn set_read_timeout(&mut self, _timeout: Duration) -> Result<()> {
    Ok(())
  }

  fn reconnect(&mut self, _port: &str, _rate: u32) -> Result<()> {
    self.open = true;
    Ok(())
  }

  fn close(&mut self) {
    self.open = false;
  }

  fn find_device(&mut self, _port_group: Option<&str>, _rate: Option<u32>) -> Result<(String, u32)> {
    Ok(("/dev/ttyMOCK0".to_string(), 115200))
  }
}

/// A plausible `get_short_status` payload with the given mode and
/// submode.
pub fn short_status_data(mode: u8, submode: u8) -> Vec<u8> {
  vec![0x1e, 0x00, 0x00, mode, submode, 0, 70, 57, 0, 0]
}
