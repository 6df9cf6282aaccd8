// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The DMAP tagged-data codec.
//!
//! Every DAAP response body is one DMAP atom: a four-byte content code, a
//! big-endian `u32` payload length, and `length` bytes of payload. Container
//! atoms nest further atoms in their payload; every other type is a fixed
//! big-endian scalar, a string, or a two-halves version number. What a code
//! *means* is not on the wire — the decoder asks the
//! [`ContentCodes`](crate::codes::ContentCodes) registry, and codes the
//! registry has not learned are carried through as raw bytes rather than
//! aborting the parse.

use std::fmt;

use bytes::Bytes;
use tracing::debug;

use crate::client::DaapError;
use crate::codes::{ContentCodes, DataType};

/// A four-byte DMAP content code, e.g. `*b"minm"`.
pub type Code = [u8; 4];

/// Render a code for error messages and logs (lossy outside ASCII).
pub(crate) fn code_str(code: Code) -> String {
    String::from_utf8_lossy(&code).into_owned()
}

/// One decoded DMAP atom: a content code plus its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The four-byte content code.
    pub code: Code,
    /// The decoded payload.
    pub value: Value,
}

/// A decoded DMAP payload.
///
/// Variants mirror the wire type table: eight integer widths, strings,
/// 32-bit timestamps, `major.minor` versions, and containers. [`Value::Raw`]
/// holds the payload of a code the registry does not know; it is a slice of
/// the response buffer, not a copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Str(String),
    /// Seconds, as the server sent them.
    Timestamp(u32),
    Version { major: u16, minor: u16 },
    Container(Vec<Atom>),
    /// Payload of an unregistered code, carried through undecoded.
    Raw(Bytes),
}

impl Atom {
    /// Build a container atom.
    #[must_use]
    pub fn container(code: Code, children: Vec<Atom>) -> Self {
        Self {
            code,
            value: Value::Container(children),
        }
    }

    /// Build a scalar atom.
    #[must_use]
    pub fn new(code: Code, value: Value) -> Self {
        Self { code, value }
    }

    /// Find the first descendant with the given code, pre-order, self
    /// included.
    ///
    /// This is the one accessor the session façades use: `mlid` out of a
    /// login response, `mlcl` out of a listing, `minm`/`asar`/… out of an
    /// item row.
    #[must_use]
    pub fn find(&self, code: Code) -> Option<&Atom> {
        if self.code == code {
            return Some(self);
        }
        if let Value::Container(children) = &self.value {
            for child in children {
                if let Some(hit) = child.find(code) {
                    return Some(hit);
                }
            }
        }
        None
    }

    /// Child atoms — empty for non-containers.
    #[must_use]
    pub fn children(&self) -> &[Atom] {
        match &self.value {
            Value::Container(children) => children,
            _ => &[],
        }
    }

    /// Shorthand: first descendant with `code`, as an unsigned integer.
    #[must_use]
    pub fn u32_of(&self, code: Code) -> Option<u32> {
        self.find(code).and_then(|a| a.value.as_u32())
    }

    /// Shorthand: first descendant with `code`, as a string slice.
    #[must_use]
    pub fn str_of(&self, code: Code) -> Option<&str> {
        self.find(code).and_then(|a| a.value.as_str())
    }
}

impl Value {
    /// The value as a `u32`, if it is an integer that fits.
    ///
    /// Signed and narrower unsigned types widen; negative values and
    /// out-of-range 64-bit values are `None`. Timestamps count — they are
    /// 32-bit seconds on the wire.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::I8(v) => u32::try_from(v).ok(),
            Value::U8(v) => Some(u32::from(v)),
            Value::I16(v) => u32::try_from(v).ok(),
            Value::U16(v) => Some(u32::from(v)),
            Value::I32(v) => u32::try_from(v).ok(),
            Value::U32(v) | Value::Timestamp(v) => Some(v),
            Value::I64(v) => u32::try_from(v).ok(),
            Value::U64(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// The value as a `u64`, if it is a non-negative integer.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::I64(v) => u64::try_from(v).ok(),
            Value::U64(v) => Some(v),
            _ => self.as_u32().map(u64::from),
        }
    }

    /// The value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The two halves of a version value.
    #[must_use]
    pub fn as_version(&self) -> Option<(u16, u16)> {
        match *self {
            Value::Version { major, minor } => Some((major, minor)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) | Value::Timestamp(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Version { major, minor } => write!(f, "{major}.{minor}"),
            Value::Container(children) => write!(f, "<container, {} children>", children.len()),
            Value::Raw(bytes) => write!(f, "<{} raw bytes>", bytes.len()),
        }
    }
}

/// Decode one atom (and everything nested in it) from a response body.
///
/// Trailing bytes after the root atom are ignored, matching server behavior.
///
/// # Errors
///
/// [`DaapError::Protocol`] on truncated framing, container payloads whose
/// children overrun them, or scalar payloads of the wrong width.
pub fn decode(codes: &ContentCodes, buf: &Bytes) -> Result<Atom, DaapError> {
    let mut pos = 0;
    decode_at(codes, buf, &mut pos)
}

fn decode_at(codes: &ContentCodes, buf: &Bytes, pos: &mut usize) -> Result<Atom, DaapError> {
    if buf.len() - *pos < 8 {
        return Err(DaapError::Protocol(format!(
            "truncated atom header at offset {}",
            *pos
        )));
    }
    let code: Code = buf[*pos..*pos + 4].try_into().expect("4 bytes");
    let length = u32::from_be_bytes(buf[*pos + 4..*pos + 8].try_into().expect("4 bytes")) as usize;
    *pos += 8;

    let end = *pos + length;
    if end > buf.len() {
        return Err(DaapError::Protocol(format!(
            "atom {} claims {} payload bytes but only {} remain",
            code_str(code),
            length,
            buf.len() - *pos
        )));
    }

    let Some(kind) = codes.kind_of(code) else {
        // Unknown tags never abort decoding; keep the bytes for the caller.
        debug!(code = %code_str(code), length, "unknown content code, keeping raw payload");
        let raw = buf.slice(*pos..end);
        *pos = end;
        return Ok(Atom::new(code, Value::Raw(raw)));
    };

    if kind == DataType::Container {
        let mut children = Vec::new();
        while *pos < end {
            children.push(decode_at(codes, buf, pos)?);
        }
        if *pos != end {
            return Err(DaapError::Protocol(format!(
                "children of {} overrun its payload by {} bytes",
                code_str(code),
                *pos - end
            )));
        }
        return Ok(Atom::container(code, children));
    }

    let payload = &buf[*pos..end];
    *pos = end;
    let value = decode_scalar(code, kind, payload)?;
    Ok(Atom::new(code, value))
}

fn decode_scalar(code: Code, kind: DataType, payload: &[u8]) -> Result<Value, DaapError> {
    fn width_err(code: Code, kind: DataType, got: usize) -> DaapError {
        DaapError::Protocol(format!(
            "atom {} has {got}-byte payload for {kind:?}",
            code_str(code)
        ))
    }

    macro_rules! fixed {
        ($ty:ty, $variant:ident) => {{
            let bytes: [u8; std::mem::size_of::<$ty>()] = payload
                .try_into()
                .map_err(|_| width_err(code, kind, payload.len()))?;
            Value::$variant(<$ty>::from_be_bytes(bytes))
        }};
    }

    Ok(match kind {
        DataType::I8 => fixed!(i8, I8),
        DataType::U8 => fixed!(u8, U8),
        DataType::I16 => fixed!(i16, I16),
        DataType::U16 => fixed!(u16, U16),
        DataType::I32 => fixed!(i32, I32),
        DataType::U32 => fixed!(u32, U32),
        DataType::I64 => fixed!(i64, I64),
        DataType::U64 => fixed!(u64, U64),
        DataType::Timestamp => {
            let bytes: [u8; 4] = payload
                .try_into()
                .map_err(|_| width_err(code, kind, payload.len()))?;
            Value::Timestamp(u32::from_be_bytes(bytes))
        }
        DataType::Version => {
            let bytes: [u8; 4] = payload
                .try_into()
                .map_err(|_| width_err(code, kind, payload.len()))?;
            Value::Version {
                major: u16::from_be_bytes([bytes[0], bytes[1]]),
                minor: u16::from_be_bytes([bytes[2], bytes[3]]),
            }
        }
        DataType::Str => Value::Str(decode_string(payload)),
        // The caller recurses for containers before reaching here.
        DataType::Container => return Err(width_err(code, kind, payload.len())),
    })
}

/// Strings are UTF-8 with a Latin-1 fallback; the length is the atom length,
/// never NUL-delimited.
fn decode_string(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(s) => s.to_owned(),
        Err(_) => payload.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Encode an atom tree back to DMAP bytes.
///
/// # Errors
///
/// [`DaapError::Protocol`] if any code in the tree is not in the registry.
pub fn encode(codes: &ContentCodes, atom: &Atom) -> Result<Vec<u8>, DaapError> {
    let mut out = Vec::new();
    encode_into(codes, atom, &mut out)?;
    Ok(out)
}

fn encode_into(codes: &ContentCodes, atom: &Atom, out: &mut Vec<u8>) -> Result<(), DaapError> {
    if codes.kind_of(atom.code).is_none() {
        return Err(DaapError::Protocol(format!(
            "cannot encode unregistered code {}",
            code_str(atom.code)
        )));
    }

    out.extend_from_slice(&atom.code);
    let len_at = out.len();
    out.extend_from_slice(&[0u8; 4]);

    match &atom.value {
        Value::I8(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::U8(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::I16(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::I32(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::U32(v) | Value::Timestamp(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::I64(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::U64(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Str(s) => out.extend_from_slice(s.as_bytes()),
        Value::Version { major, minor } => {
            out.extend_from_slice(&major.to_be_bytes());
            out.extend_from_slice(&minor.to_be_bytes());
        }
        Value::Raw(bytes) => out.extend_from_slice(bytes),
        Value::Container(children) => {
            for child in children {
                encode_into(codes, child, out)?;
            }
        }
    }

    let length = u32::try_from(out.len() - len_at - 4)
        .map_err(|_| DaapError::Protocol("atom payload exceeds u32 length".into()))?;
    out[len_at..len_at + 4].copy_from_slice(&length.to_be_bytes());
    Ok(())
}
