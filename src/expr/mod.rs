// Copyright (c) 2025 Andrew Kroh
// SPDX-License-Identifier: MIT

// Expression language module
//
// REXL: calculations, skip logic, and validation rules over form answers

pub mod ast;
pub mod checker;
pub mod coerce;
pub mod compiler;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{BinOp, Expr, KeyPath, UnaryOp};
pub use checker::{check, names, Schema, TypeError};
pub use compiler::Program;
pub use eval::{evaluate, Evaluator, Resolver};
pub use lexer::{tokenize, LexError};
pub use parser::{parse, SyntaxError};
pub use value::{Type, Value};

/// Any error raised while lexing, parsing, or checking an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Type(#[from] TypeError),
}
