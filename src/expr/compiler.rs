// Copyright (c) 2025 Andrew Kroh
// SPDX-License-Identifier: MIT

// Compiled programs: parse, optional type check, and regex precompilation

use super::ast::{Expr, KeyPath};
use super::checker::{self, Schema};
use super::functions::PatternCache;
use super::parser;
use super::value::Type;
use super::Error;
use std::collections::BTreeSet;

/// Compiled program ready for evaluation. Immutable once built, so it can
/// be shared across threads and evaluated any number of times.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    root: Expr,
    patterns: PatternCache,
    result_type: Option<Type>,
}

impl Program {
    /// Parse an expression without type checking it
    pub fn parse(input: &str) -> Result<Self, Error> {
        let root = parser::parse(input)?;
        let patterns = PatternCache::collect(&root);

        Ok(Program {
            source: input.to_string(),
            root,
            patterns,
            result_type: None,
        })
    }

    /// Parse and type check an expression against a schema
    pub fn compile(input: &str, schema: &dyn Schema) -> Result<Self, Error> {
        let mut program = Self::parse(input)?;
        program.check(schema)?;

        tracing::debug!(
            source = input,
            result_type = %program.result_type.unwrap_or(Type::Untyped),
            names = ?program.names(),
            patterns = program.patterns.len(),
            "compiled expression"
        );

        Ok(program)
    }

    /// Type check against `schema`, recording the result type
    pub fn check(&mut self, schema: &dyn Schema) -> Result<Type, Error> {
        let result_type = checker::check(&self.root, schema)?;
        self.result_type = Some(result_type);
        Ok(result_type)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub(crate) fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Result type from the last successful check
    pub fn result_type(&self) -> Option<Type> {
        self.result_type
    }

    /// Identifiers the program reads
    pub fn names(&self) -> BTreeSet<KeyPath> {
        checker::names(&self.root)
    }
}
