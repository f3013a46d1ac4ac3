use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Starts the kestrel database server
    Run(ServerConfig),
}

#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Host
    #[arg(long, default_value_t = String::from("127.0.0.1"))]
    pub host: String,

    #[arg(long, default_value_t = 1234)]
    pub port: u16,

    /// limits the size of request frames and response bodies,
    /// defaults to the protocol maximum of 32MiB
    #[arg(long, default_value_t = kestrel_types::wire::MAX_MESSAGE_SIZE)]
    pub message_size: usize,

    /// closes connections after this much inactivity, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub idle_timeout_ms: u64,

    /// worker threads reserved for destroying large sorted sets
    #[arg(long, default_value_t = 4)]
    pub threadpool_size: usize,

    ///  Log level
    #[arg(long, default_value_t = String::from("info"))]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 1234,
            message_size: kestrel_types::wire::MAX_MESSAGE_SIZE,
            idle_timeout_ms: 5_000,
            threadpool_size: 4,
            log_level: String::from("info"),
        }
    }
}

impl ServerConfig {
    pub fn os_select_port(mut self) -> Self {
        // allow OS to pick a port
        self.port = 0;
        self
    }

    pub fn message_size(mut self, message_size: usize) -> Self {
        self.message_size = message_size;
        self
    }

    pub fn idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    pub fn threadpool_size(mut self, threadpool_size: usize) -> Self {
        self.threadpool_size = threadpool_size;
        self
    }
}
