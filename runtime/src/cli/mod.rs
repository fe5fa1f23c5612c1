//! CLI subcommand implementations for the Creatorfeed binary.

pub mod channel_cmd;
pub mod output;
pub mod posts_cmd;
pub mod serve;
pub mod videos_cmd;
