// Command compilation: SQL generation and executable commands

pub mod command;
pub mod generator;

pub use self::command::{Command, CommandParameter};
pub use self::generator::{CommandCompiler, CommandCompilerFactory, SqlGenerator, SqlGeneratorFactory, SqlGeneratorOptions};
