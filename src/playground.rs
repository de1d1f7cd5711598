// Copyright (c) 2025 Andrew Kroh
// SPDX-License-Identifier: MIT

// Browser playground bridge via wasm-bindgen
//
// Exposes expression checking and evaluation to JavaScript using the same
// code path as rule loading.

use crate::config::{FieldDef, FormSchema};
use crate::context::AnswerContext;
use crate::expr::{Program, Type};
use serde_json::json;
use std::collections::HashMap;
use wasm_bindgen::prelude::*;

/// Check an expression against a schema.
/// Schema JSON: {"fields": [...], "parameters": [...]}
/// Returns {"ok": true, "type": "...", "names": [...]} or {"error": "..."}.
#[wasm_bindgen]
pub fn playground_check(expression: &str, schema_json: &str) -> String {
    let input: SchemaInput = match serde_json::from_str(schema_json) {
        Ok(v) => v,
        Err(e) => return error(format!("Invalid schema JSON: {}", e)),
    };

    match compile(expression, &input.fields, &input.parameters) {
        Ok((program, _)) => {
            let names: Vec<String> = program.names().iter().map(|n| n.to_string()).collect();
            json!({
                "ok": true,
                "type": program.result_type().unwrap_or(Type::Untyped).to_string(),
                "names": names,
            })
            .to_string()
        }
        Err(e) => error(e),
    }
}

/// Evaluate an expression against answers.
/// Input JSON: {"expression": "...", "fields": [...], "parameters": [...],
/// "answers": {...}, "parameterValues": {...}}
/// Returns {"result": <value>, "type": "..."} or {"error": "..."}.
#[wasm_bindgen]
pub fn playground_eval(input_json: &str) -> String {
    let input: EvalInput = match serde_json::from_str(input_json) {
        Ok(v) => v,
        Err(e) => return error(format!("Invalid input JSON: {}", e)),
    };

    let (program, schema) = match compile(&input.expression, &input.fields, &input.parameters) {
        Ok(compiled) => compiled,
        Err(e) => return error(e),
    };

    let ctx = AnswerContext::new(input.answers, input.parameter_values).with_schema(schema);
    let result = program.eval(&ctx);

    json!({
        "result": result.to_json(),
        "type": result.ty().to_string(),
    })
    .to_string()
}

fn compile(
    expression: &str,
    fields: &[FieldDef],
    parameters: &[FieldDef],
) -> Result<(Program, FormSchema), String> {
    let schema = FormSchema::from_fields(fields, parameters).map_err(|e| e.to_string())?;
    let program = Program::compile(expression, &schema).map_err(|e| e.to_string())?;
    Ok((program, schema))
}

fn error(message: impl Into<String>) -> String {
    json!({ "error": message.into() }).to_string()
}

#[derive(serde::Deserialize)]
struct SchemaInput {
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    parameters: Vec<FieldDef>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvalInput {
    expression: String,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    parameters: Vec<FieldDef>,
    #[serde(default)]
    answers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    parameter_values: HashMap<String, serde_json::Value>,
}
