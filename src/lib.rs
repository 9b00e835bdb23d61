#![doc = include_str!("../README.md")]

pub mod analyzer;
pub mod ast;
pub mod bytecode;
pub mod context;
pub mod error;
pub mod heap;
pub mod lexer;
pub mod parser;
pub mod value;
mod vm;

pub use crate::{
    context::Context,
    error::{AnalysisError, CompileError, LexError, ParseError, RuntimeError},
    value::{NativeFn, Tag, Value},
};
