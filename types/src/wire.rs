use thiserror::Error;

/// - Every integer on the wire is little-endian.
/// - A frame is a 4 byte length header followed by that many payload bytes;
///   the header does not count itself.
///
/// Shared by the request and response codecs.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Upper bound on a single frame's payload, requests and responses alike.
pub const MAX_MESSAGE_SIZE: usize = 32 << 20;

/// Upper bound on the argument count of a single request.
pub const MAX_ARGS: usize = 200_000;

/// Type tag of a response value.
pub mod tag {
    pub const NIL: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const STRING: u8 = 2;
    pub const INTEGER: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const ARRAY: u8 = 5;
}

/// Numeric code carried by an ERROR response. The code is the programmatic
/// contract, the accompanying message is advisory.
pub mod error_code {
    pub const UNKNOWN: u32 = 1;
    pub const TOO_BIG: u32 = 2;
    pub const BAD_TYPE: u32 = 3;
    pub const BAD_ARGUMENT: u32 = 4;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message of {0} bytes exceeds the {1} byte limit")]
    MessageTooBig(usize, usize),
    #[error("request declares {0} arguments, limit is {1}")]
    TooManyArgs(usize, usize),
    #[error("truncated message")]
    Truncated,
    #[error("{0} trailing bytes after the last argument")]
    TrailingBytes(usize),
    #[error("unknown value tag {0}")]
    UnknownTag(u8),
}

/// Reads a little-endian `u32`, advancing `data` past it.
pub(crate) fn read_u32(data: &mut &[u8]) -> Result<u32, ProtocolError> {
    let (head, rest) = data
        .split_first_chunk::<4>()
        .ok_or(ProtocolError::Truncated)?;
    *data = rest;
    Ok(u32::from_le_bytes(*head))
}

pub(crate) fn read_bytes<'a>(
    data: &mut &'a [u8],
    len: usize,
) -> Result<&'a [u8], ProtocolError> {
    if data.len() < len {
        return Err(ProtocolError::Truncated);
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Ok(head)
}

pub(crate) fn read_u8(data: &mut &[u8]) -> Result<u8, ProtocolError> {
    let (&head, rest) = data.split_first().ok_or(ProtocolError::Truncated)?;
    *data = rest;
    Ok(head)
}

pub(crate) fn read_i64(data: &mut &[u8]) -> Result<i64, ProtocolError> {
    let (head, rest) = data
        .split_first_chunk::<8>()
        .ok_or(ProtocolError::Truncated)?;
    *data = rest;
    Ok(i64::from_le_bytes(*head))
}

pub(crate) fn read_f64(data: &mut &[u8]) -> Result<f64, ProtocolError> {
    let (head, rest) = data
        .split_first_chunk::<8>()
        .ok_or(ProtocolError::Truncated)?;
    *data = rest;
    Ok(f64::from_le_bytes(*head))
}
