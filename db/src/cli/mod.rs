mod server;

pub use server::{Cli, Commands, ServerConfig};
