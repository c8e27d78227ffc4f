//! Channel abstraction for message I/O.

pub mod channel;
pub mod cli;
pub mod discord;

pub use channel::*;
pub use cli::CliChannel;
pub use discord::DiscordChannel;
