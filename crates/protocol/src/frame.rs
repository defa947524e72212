//! WebSocket frame codec.
//!
//! # Wire format (RFC 6455 §5.2, subset)
//!
//! ```text
//! [1 byte: FIN(1) RSV(3) OPCODE(4)]
//! [1 byte: MASK(1) LEN(7)]
//!   LEN == 126 -> [2 bytes BE: payload length]
//!   LEN == 127 -> [8 bytes BE: payload length]
//! [4 bytes: mask key]            (only when MASK is set)
//! [payload length bytes: payload, XORed with the mask key]
//! ```
//!
//! Client frames are masked; server frames never are. Only text (1) and
//! close (8) carry meaning for the relay.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

/// FIN bit of the first header byte.
const FIN: u8 = 0x80;

/// MASK bit of the second header byte.
const MASK: u8 = 0x80;

/// WebSocket frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// UTF-8 text message (1).
    Text,
    /// Connection close (8).
    Close,
    /// Any other opcode; carried through but never interpreted.
    Other(u8),
}

impl Opcode {
    pub fn from_u8(value: u8) -> Self {
        match value & 0x0F {
            0x1 => Self::Text,
            0x8 => Self::Close,
            other => Self::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Text => 0x1,
            Self::Close => 0x8,
            Self::Other(v) => v & 0x0F,
        }
    }
}

/// A single decoded WebSocket frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    /// Mask key the payload arrived with (client-to-server frames only).
    pub mask_key: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn is_masked(&self) -> bool {
        self.mask_key.is_some()
    }

    /// Close frames signal connection termination.
    pub fn is_close(&self) -> bool {
        self.opcode == Opcode::Close
    }

    pub fn is_text(&self) -> bool {
        self.opcode == Opcode::Text
    }

    /// Consumes the frame and returns its payload as text.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn into_text(self) -> String {
        match String::from_utf8(self.payload) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Outcome of [`decode`] on a partially filled buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame occupying the first `consumed` bytes of the buffer.
    Frame { frame: Frame, consumed: usize },
    /// At least `needed` more bytes are required before decoding can proceed.
    ///
    /// The count never extends past the end of the current frame, so a
    /// reader that fetches exactly `needed` bytes never over-reads.
    Incomplete { needed: usize },
}

/// Applies (or removes) the 4-byte XOR mask on a payload.
///
/// The operation is symmetric: applying the mask twice restores the input.
pub fn apply_mask(payload: &mut [u8], mask_key: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}

/// Decodes one frame from the start of `buf`.
///
/// Pure function: performs no I/O. Returns [`Decoded::Incomplete`] while the
/// header, extended length, mask key, or payload are still short.
pub fn decode(buf: &[u8], max_payload: usize) -> Result<Decoded, FrameError> {
    if buf.len() < 2 {
        return Ok(Decoded::Incomplete {
            needed: 2 - buf.len(),
        });
    }

    let fin = buf[0] & FIN != 0;
    let opcode = Opcode::from_u8(buf[0]);
    let masked = buf[1] & MASK != 0;
    let len7 = buf[1] & 0x7F;

    let ext_len = match len7 {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    let header_len = 2 + ext_len + if masked { 4 } else { 0 };
    if buf.len() < header_len {
        return Ok(Decoded::Incomplete {
            needed: header_len - buf.len(),
        });
    }

    let payload_len = match len7 {
        126 => u16::from_be_bytes([buf[2], buf[3]]) as u64,
        127 => {
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            u64::from_be_bytes(len)
        }
        n => n as u64,
    };
    if payload_len > max_payload as u64 {
        return Err(FrameError::TooLarge {
            len: payload_len,
            max: max_payload,
        });
    }

    let mask_key = masked.then(|| {
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[2 + ext_len..header_len]);
        key
    });

    let total = header_len + payload_len as usize;
    if buf.len() < total {
        return Ok(Decoded::Incomplete {
            needed: total - buf.len(),
        });
    }

    let mut payload = buf[header_len..total].to_vec();
    if let Some(key) = &mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Decoded::Frame {
        frame: Frame {
            fin,
            opcode,
            mask_key,
            payload,
        },
        consumed: total,
    })
}

/// Reads exactly one frame from the stream.
///
/// Short reads are accumulated until [`decode`] completes; EOF in the middle
/// of a frame surfaces as [`FrameError::Io`].
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Frame, FrameError> {
    let mut buf = Vec::with_capacity(14);
    loop {
        match decode(&buf, max_payload)? {
            Decoded::Frame { frame, .. } => return Ok(frame),
            Decoded::Incomplete { needed } => {
                let start = buf.len();
                buf.resize(start + needed, 0);
                reader.read_exact(&mut buf[start..]).await?;
            }
        }
    }
}

/// Encodes a server-to-client text frame (FIN set, unmasked).
///
/// Payloads above 65535 bytes use the 8-byte length form with the top four
/// bytes always zero, so lengths beyond `u32::MAX` are not representable.
/// That limit is inherited from the tools on the other end of the link and
/// is far above any command or scene dump.
pub fn encode_text(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    write_header(&mut out, Opcode::Text, payload.len(), false);
    out.extend_from_slice(payload);
    out
}

/// Encodes a client-to-server text frame masked with `mask_key`.
pub fn encode_masked_text(payload: &[u8], mask_key: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    write_header(&mut out, Opcode::Text, payload.len(), true);
    out.extend_from_slice(&mask_key);
    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], &mask_key);
    out
}

fn write_header(out: &mut Vec<u8>, opcode: Opcode, len: usize, masked: bool) {
    out.push(FIN | opcode.to_u8());
    let mask_bit = if masked { MASK } else { 0 };
    if len <= 125 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}
