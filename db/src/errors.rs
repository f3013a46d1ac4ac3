use kestrel_types::wire::error_code;
use thiserror::Error;

/// A command-level failure. These are encoded as ERROR replies and never
/// tear down the connection; framing violations are handled separately by
/// the connection state machine.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServerError {
    #[error("unknown command")]
    UnknownCommand,
    #[error("{0}")]
    BadType(&'static str),
    #[error("{0}")]
    BadArgument(&'static str),
}

impl ServerError {
    /// The numeric code carried on the wire next to the message.
    pub fn code(&self) -> u32 {
        match self {
            ServerError::UnknownCommand => error_code::UNKNOWN,
            ServerError::BadType(_) => error_code::BAD_TYPE,
            ServerError::BadArgument(_) => error_code::BAD_ARGUMENT,
        }
    }
}
