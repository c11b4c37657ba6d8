// allotment/src/commands/mod.rs

pub mod ack;
pub mod ingest;
pub mod init;
pub mod inspect;
pub mod migrate;
pub mod monitor;
pub mod project;
pub mod quality;
pub mod status;
