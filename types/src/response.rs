//! Incremental response writer. Handlers append tagged values directly to
//! the connection's outgoing buffer; array counts and the frame header are
//! patched in place once the handler is done, so a response never has to
//! be assembled in a side buffer.

use bytes::BytesMut;

use crate::wire::{error_code, tag, LENGTH_HEADER_SIZE};

/// Reserves the frame header and returns its position for [`end`].
pub fn begin(out: &mut BytesMut) -> usize {
    let header = out.len();
    out.extend_from_slice(&0u32.to_le_bytes());
    header
}

/// Patches the frame header with the final body size. A body that exceeds
/// `max_message_size` is thrown away and replaced with ERROR(TOO_BIG).
pub fn end(out: &mut BytesMut, header: usize, max_message_size: usize) {
    let mut body_len = out.len() - header - LENGTH_HEADER_SIZE;
    if body_len > max_message_size {
        out.truncate(header + LENGTH_HEADER_SIZE);
        error(out, error_code::TOO_BIG, "message too big");
        body_len = out.len() - header - LENGTH_HEADER_SIZE;
    }
    out[header..header + LENGTH_HEADER_SIZE].copy_from_slice(&(body_len as u32).to_le_bytes());
}

pub fn nil(out: &mut BytesMut) {
    out.extend_from_slice(&[tag::NIL]);
}

pub fn string(out: &mut BytesMut, data: &[u8]) {
    out.extend_from_slice(&[tag::STRING]);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

pub fn integer(out: &mut BytesMut, val: i64) {
    out.extend_from_slice(&[tag::INTEGER]);
    out.extend_from_slice(&val.to_le_bytes());
}

pub fn double(out: &mut BytesMut, val: f64) {
    out.extend_from_slice(&[tag::DOUBLE]);
    out.extend_from_slice(&val.to_le_bytes());
}

pub fn error(out: &mut BytesMut, code: u32, message: &str) {
    out.extend_from_slice(&[tag::ERROR]);
    out.extend_from_slice(&code.to_le_bytes());
    out.extend_from_slice(&(message.len() as u32).to_le_bytes());
    out.extend_from_slice(message.as_bytes());
}

/// Emits an array header with a known element count.
pub fn array(out: &mut BytesMut, n: u32) {
    out.extend_from_slice(&[tag::ARRAY]);
    out.extend_from_slice(&n.to_le_bytes());
}

/// Emits an array header with a placeholder count and returns the position
/// to hand to [`end_array`] once the element count is known.
pub fn begin_array(out: &mut BytesMut) -> usize {
    array(out, 0);
    out.len() - 4
}

pub fn end_array(out: &mut BytesMut, ctx: usize, n: u32) {
    debug_assert_eq!(out[ctx - 1], tag::ARRAY);
    out[ctx..ctx + 4].copy_from_slice(&n.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn decode_frame(buf: &[u8]) -> Value {
        let body_len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(body_len, buf.len() - LENGTH_HEADER_SIZE);
        Value::decode(&buf[LENGTH_HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn scalar_values_are_framed() {
        let mut out = BytesMut::new();
        let header = begin(&mut out);
        integer(&mut out, -42);
        end(&mut out, header, 1024);
        assert_eq!(decode_frame(&out), Value::Integer(-42));
    }

    #[test]
    fn array_count_is_patched_in_place() {
        let mut out = BytesMut::new();
        let header = begin(&mut out);
        let ctx = begin_array(&mut out);
        string(&mut out, b"alice");
        double(&mut out, 1.5);
        end_array(&mut out, ctx, 2);
        end(&mut out, header, 1024);
        assert_eq!(
            decode_frame(&out),
            Value::Array(vec![Value::Str(b"alice".to_vec()), Value::Double(1.5)])
        );
    }

    #[test]
    fn oversized_body_is_rewritten_as_too_big() {
        let mut out = BytesMut::new();
        let header = begin(&mut out);
        string(&mut out, &[0u8; 64]);
        end(&mut out, header, 16);
        match decode_frame(&out) {
            Value::Error { code, .. } => assert_eq!(code, error_code::TOO_BIG),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn responses_append_to_earlier_frames() {
        let mut out = BytesMut::new();
        let first = begin(&mut out);
        nil(&mut out);
        end(&mut out, first, 1024);
        let first_len = out.len();

        let second = begin(&mut out);
        integer(&mut out, 7);
        end(&mut out, second, 1024);

        assert_eq!(decode_frame(&out[..first_len]), Value::Nil);
        assert_eq!(decode_frame(&out[first_len..]), Value::Integer(7));
    }
}
