// Answer context for expression evaluation

use crate::config::FormSchema;
use crate::expr::{KeyPath, Resolver, Schema, Type, Value};
use serde_json::Value as Json;
use std::collections::HashMap;

/// Snapshot of a form's answers and parameters, resolved lazily per
/// identifier
#[derive(Debug, Clone, Default)]
pub struct AnswerContext {
    /// Answers by field id
    answers: HashMap<String, Json>,

    /// Synthetic values passed alongside the answers
    parameters: HashMap<String, Json>,

    /// Declared types, for typed nulls and reading temporal answers
    schema: Option<FormSchema>,

    /// Locator identities: table -> key -> identity
    locators: HashMap<String, HashMap<String, String>>,
}

impl AnswerContext {
    pub fn new(answers: HashMap<String, Json>, parameters: HashMap<String, Json>) -> Self {
        AnswerContext {
            answers,
            parameters,
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: FormSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Register the identity `@table[key]` refers to
    pub fn with_locator(
        mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        self.locators
            .entry(table.into())
            .or_default()
            .insert(key.into(), identity.into());
        self
    }

    /// Record a changed answer
    pub fn set_answer(&mut self, id: impl Into<String>, value: Json) {
        self.answers.insert(id.into(), value);
    }

    /// Answer first, then parameter
    fn lookup(&self, id: &str) -> Option<&Json> {
        self.answers.get(id).or_else(|| self.parameters.get(id))
    }

    fn declared(&self, path: &KeyPath) -> Option<Type> {
        self.schema.as_ref().and_then(|schema| schema.type_of(path))
    }

    fn resolve_locator(&self, table: &str, path: &KeyPath) -> Value {
        path.segments()
            .get(1)
            .and_then(|key| self.locators.get(table)?.get(key))
            .map(|identity| Value::string(identity.as_str()))
            .unwrap_or_else(Value::null)
    }

    /// `group.sub` across the records of a record list
    fn project(&self, group: &str, sub: &str, records: &[Json]) -> Value {
        let element_type = self
            .schema
            .as_ref()
            .and_then(|schema| schema.record_field_type(group, sub));

        Value::List(
            records
                .iter()
                .map(|record| match record.get(sub) {
                    Some(json) => Value::from_json(json, element_type),
                    None => Value::Null(element_type.unwrap_or(Type::Untyped)),
                })
                .collect(),
        )
    }
}

impl Resolver for AnswerContext {
    fn resolve(&self, path: &KeyPath) -> Value {
        if let Some(table) = path.locator_table() {
            return self.resolve_locator(table, path);
        }

        let declared = self.declared(path);
        let Some((first, rest)) = path.segments().split_first() else {
            return Value::null();
        };
        let Some(json) = self.lookup(first) else {
            return Value::Null(declared.unwrap_or(Type::Untyped));
        };

        match (json, rest) {
            // A record list reads as one marker per record
            (Json::Array(records), []) if records.iter().any(Json::is_object) => {
                Value::List(records.iter().map(|_| Value::Boolean(true)).collect())
            }
            (_, []) => Value::from_json(json, declared),
            (Json::Array(records), [sub]) => self.project(first, sub, records),
            _ => rest
                .iter()
                .try_fold(json, |node, segment| node.get(segment.as_str()))
                .map(|node| Value::from_json(node, declared))
                .unwrap_or(Value::Null(declared.unwrap_or(Type::Untyped))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldDef;
    use chrono::NaiveDate;
    use serde_json::json;

    fn answers(value: Json) -> HashMap<String, Json> {
        serde_json::from_value(value).unwrap()
    }

    fn schema() -> FormSchema {
        let fields: Vec<FieldDef> = serde_json::from_value(json!([
            {"id": "age", "type": "integer"},
            {"id": "dob", "type": "date"},
            {"id": "colors", "type": "enumerationSet"},
            {"id": "household", "type": "recordList",
             "record": [{"id": "age", "type": "integer"}, {"id": "dob", "type": "date"}]}
        ]))
        .unwrap();
        let parameters: Vec<FieldDef> =
            serde_json::from_value(json!([{"id": "mode", "type": "text"}])).unwrap();
        FormSchema::from_fields(&fields, &parameters).unwrap()
    }

    fn resolve(ctx: &AnswerContext, path: &str) -> Value {
        ctx.resolve(&KeyPath::from(path))
    }

    #[test]
    fn test_resolve_answers_and_parameters() {
        let ctx = AnswerContext::new(
            answers(json!({"age": 30, "mode": "answer wins"})),
            answers(json!({"mode": "param", "extra": true})),
        );

        assert_eq!(resolve(&ctx, "age"), Value::Number(30.0));
        assert_eq!(resolve(&ctx, "mode"), Value::string("answer wins"));
        assert_eq!(resolve(&ctx, "extra"), Value::Boolean(true));
        assert_eq!(resolve(&ctx, "missing"), Value::null());
    }

    #[test]
    fn test_resolve_typed_nulls() {
        let ctx = AnswerContext::new(answers(json!({"dob": null})), HashMap::new())
            .with_schema(schema());

        assert_eq!(resolve(&ctx, "age"), Value::Null(Type::Number));
        assert_eq!(resolve(&ctx, "dob"), Value::Null(Type::Date));
        assert_eq!(resolve(&ctx, "household.age"), Value::Null(Type::List));
        assert_eq!(resolve(&ctx, "undeclared"), Value::null());
    }

    #[test]
    fn test_resolve_temporal_answer() {
        let ctx = AnswerContext::new(answers(json!({"dob": "2015-06-01"})), HashMap::new())
            .with_schema(schema());

        assert_eq!(
            resolve(&ctx, "dob"),
            Value::Date(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())
        );
    }

    #[test]
    fn test_resolve_enumeration_set() {
        let ctx = AnswerContext::new(answers(json!({"colors": ["red", "blue"]})), HashMap::new());
        assert_eq!(
            resolve(&ctx, "colors"),
            Value::list(vec![Value::string("red"), Value::string("blue")])
        );
    }

    #[test]
    fn test_resolve_record_list_projection() {
        let ctx = AnswerContext::new(
            answers(json!({
                "household": [
                    {"age": 40, "dob": "1980-01-01"},
                    {"age": null},
                    {"dob": "2010-05-05"}
                ]
            })),
            HashMap::new(),
        )
        .with_schema(schema());

        assert_eq!(
            resolve(&ctx, "household.age"),
            Value::list(vec![
                Value::Number(40.0),
                Value::Null(Type::Number),
                Value::Null(Type::Number)
            ])
        );
        assert_eq!(
            resolve(&ctx, "household.dob"),
            Value::list(vec![
                Value::Date(NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()),
                Value::Null(Type::Date),
                Value::Date(NaiveDate::from_ymd_opt(2010, 5, 5).unwrap())
            ])
        );
        assert_eq!(
            resolve(&ctx, "household"),
            Value::list(vec![Value::Boolean(true); 3])
        );
    }

    #[test]
    fn test_resolve_nested_object() {
        let ctx = AnswerContext::new(
            HashMap::new(),
            answers(json!({"site": {"region": {"code": "EU"}}})),
        );

        assert_eq!(resolve(&ctx, "site.region.code"), Value::string("EU"));
        assert_eq!(resolve(&ctx, "site.region.missing"), Value::null());
        assert_eq!(resolve(&ctx, "site"), Value::null());
    }

    #[test]
    fn test_resolve_locator() {
        let ctx = AnswerContext::default()
            .with_locator("people", "1", "person-a")
            .with_locator("people", "alias", "person-a");

        assert_eq!(
            ctx.resolve(&KeyPath::locator("people", "1")),
            Value::string("person-a")
        );
        assert_eq!(
            ctx.resolve(&KeyPath::locator("people", "alias")),
            Value::string("person-a")
        );
        assert_eq!(ctx.resolve(&KeyPath::locator("people", "2")), Value::null());
        assert_eq!(ctx.resolve(&KeyPath::locator("places", "1")), Value::null());
    }

    #[test]
    fn test_set_answer() {
        let mut ctx = AnswerContext::default();
        assert_eq!(resolve(&ctx, "age"), Value::null());

        ctx.set_answer("age", json!(5));
        assert_eq!(resolve(&ctx, "age"), Value::Number(5.0));
    }
}
