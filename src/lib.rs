pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod jit;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod sema;

pub use error::CompileError;
pub use pipeline::{compile, parse_source};
