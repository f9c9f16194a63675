// Library exports for the logrelay output relay

pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod tracing_init;
