pub mod config;
pub mod dumper;
pub mod log;
pub mod version;
