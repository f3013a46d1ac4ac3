use crate::wire::{read_bytes, read_u32, ProtocolError, LENGTH_HEADER_SIZE, MAX_ARGS};

/// Parses a request payload (the bytes after the frame header) into its
/// argument vector: a `u32` count followed by that many length-prefixed
/// strings. The payload must be consumed exactly.
pub fn parse(payload: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let mut data = payload;
    let argc = read_u32(&mut data)? as usize;
    if argc > MAX_ARGS {
        return Err(ProtocolError::TooManyArgs(argc, MAX_ARGS));
    }

    let mut args = Vec::with_capacity(argc.min(64));
    while args.len() < argc {
        let len = read_u32(&mut data)? as usize;
        args.push(read_bytes(&mut data, len)?.to_vec());
    }

    if !data.is_empty() {
        return Err(ProtocolError::TrailingBytes(data.len()));
    }
    Ok(args)
}

/// Encodes a full request frame, header included. This is the client half
/// of the contract, used by client implementations and the test suite.
pub fn encode(args: &[&[u8]]) -> Vec<u8> {
    let payload_len: usize = 4 + args.iter().map(|a| 4 + a.len()).sum::<usize>();
    let mut frame = Vec::with_capacity(LENGTH_HEADER_SIZE + payload_len);
    frame.extend_from_slice(&(payload_len as u32).to_le_bytes());
    frame.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        frame.extend_from_slice(&(arg.len() as u32).to_le_bytes());
        frame.extend_from_slice(arg);
    }
    frame
}
