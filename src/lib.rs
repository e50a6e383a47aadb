pub mod arg_parser;
pub mod command;
pub mod config;
pub mod correlate;
pub mod errors;
pub mod frame;
pub mod host;
pub mod logger;
pub mod monitor;
pub mod render;
pub mod session;
pub mod smi;
