pub mod commands;

pub use commands::{build_file_engine, execute, FileEngine};
