use crate::wire::{
    read_bytes, read_f64, read_i64, read_u32, read_u8, tag, ProtocolError,
};

/// An owned response value, the client-facing shape of the tagged wire
/// encoding. Servers stream responses with [`crate::response`] instead of
/// building these, so decode/encode mainly serves clients and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Error { code: u32, message: Vec<u8> },
    Str(Vec<u8>),
    Integer(i64),
    Double(f64),
    Array(Vec<Value>),
}

impl Value {
    /// Decodes one tagged value, which must consume the input exactly.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut data = body;
        let value = Self::read(&mut data)?;
        if !data.is_empty() {
            return Err(ProtocolError::TrailingBytes(data.len()));
        }
        Ok(value)
    }

    fn read(data: &mut &[u8]) -> Result<Self, ProtocolError> {
        match read_u8(data)? {
            tag::NIL => Ok(Value::Nil),
            tag::ERROR => {
                let code = read_u32(data)?;
                let len = read_u32(data)? as usize;
                let message = read_bytes(data, len)?.to_vec();
                Ok(Value::Error { code, message })
            }
            tag::STRING => {
                let len = read_u32(data)? as usize;
                Ok(Value::Str(read_bytes(data, len)?.to_vec()))
            }
            tag::INTEGER => Ok(Value::Integer(read_i64(data)?)),
            tag::DOUBLE => Ok(Value::Double(read_f64(data)?)),
            tag::ARRAY => {
                let n = read_u32(data)? as usize;
                let mut elements = Vec::with_capacity(n.min(64));
                for _ in 0..n {
                    elements.push(Self::read(data)?);
                }
                Ok(Value::Array(elements))
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    /// Serializes the value back to its tagged encoding.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Nil => out.push(tag::NIL),
            Value::Error { code, message } => {
                out.push(tag::ERROR);
                out.extend_from_slice(&code.to_le_bytes());
                out.extend_from_slice(&(message.len() as u32).to_le_bytes());
                out.extend_from_slice(message);
            }
            Value::Str(data) => {
                out.push(tag::STRING);
                out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                out.extend_from_slice(data);
            }
            Value::Integer(val) => {
                out.push(tag::INTEGER);
                out.extend_from_slice(&val.to_le_bytes());
            }
            Value::Double(val) => {
                out.push(tag::DOUBLE);
                out.extend_from_slice(&val.to_le_bytes());
            }
            Value::Array(elements) => {
                out.push(tag::ARRAY);
                out.extend_from_slice(&(elements.len() as u32).to_le_bytes());
                for element in elements {
                    element.encode(out);
                }
            }
        }
    }
}
