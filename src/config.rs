// Rule definitions
//
// A rule is an expression plus the declared fields it may reference, as
// persisted in a form definition. Rules carry their own test cases, which
// run when the rule is loaded.

use crate::context::AnswerContext;
use crate::expr::{self, KeyPath, Program, Resolver, Schema, Type, Value};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Rule definition
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Expression source
    pub expression: String,

    /// How the result is used
    #[serde(default)]
    pub kind: RuleKind,

    /// Form fields the expression may reference
    #[serde(default)]
    pub fields: Vec<FieldDef>,

    /// Synthetic values passed alongside the answers
    #[serde(default)]
    pub parameters: Vec<FieldDef>,

    /// Test cases to validate when the rule is loaded
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    /// Computes a value
    #[default]
    Calculation,
    /// Decides whether a field is shown
    SkipLogic,
    /// Fails only when the result is `false`
    Validation,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Calculation => write!(f, "calculation"),
            RuleKind::SkipLogic => write!(f, "skipLogic"),
            RuleKind::Validation => write!(f, "validation"),
        }
    }
}

/// Declared form field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldDef {
    pub id: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Sub-fields of a record list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record: Vec<FieldDef>,
}

/// Base type of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Integer,
    Text,
    Enumeration,
    Boolean,
    Date,
    Time,
    DateTime,
    EnumerationSet,
    RecordList,
}

impl FieldType {
    /// Expression type of the field's answers
    pub fn value_type(self) -> Type {
        match self {
            FieldType::Float | FieldType::Integer => Type::Number,
            FieldType::Text | FieldType::Enumeration => Type::String,
            FieldType::Boolean => Type::Boolean,
            FieldType::Date => Type::Date,
            FieldType::Time => Type::Time,
            FieldType::DateTime => Type::DateTime,
            FieldType::EnumerationSet | FieldType::RecordList => Type::List,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Float => "float",
            FieldType::Integer => "integer",
            FieldType::Text => "text",
            FieldType::Enumeration => "enumeration",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "dateTime",
            FieldType::EnumerationSet => "enumerationSet",
            FieldType::RecordList => "recordList",
        }
    }
}

/// Type names are matched case-insensitively ("datetime" is "dateTime").
impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldTypeVisitor;

        impl<'de> Visitor<'de> for FieldTypeVisitor {
            type Value = FieldType;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a field type name")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldType, E> {
                let field_type = match v.to_ascii_lowercase().as_str() {
                    "float" => FieldType::Float,
                    "integer" => FieldType::Integer,
                    "text" => FieldType::Text,
                    "enumeration" => FieldType::Enumeration,
                    "boolean" => FieldType::Boolean,
                    "date" => FieldType::Date,
                    "time" => FieldType::Time,
                    "datetime" => FieldType::DateTime,
                    "enumerationset" => FieldType::EnumerationSet,
                    "recordlist" => FieldType::RecordList,
                    _ => return Err(E::custom(format!("unknown field type: {:?}", v))),
                };
                Ok(field_type)
            }
        }

        deserializer.deserialize_str(FieldTypeVisitor)
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Test case for validating a rule at load time
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestCase {
    /// Descriptive name for the test
    pub name: String,

    /// Answers by field id
    #[serde(default)]
    pub answers: HashMap<String, serde_json::Value>,

    /// Parameter values by id
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,

    /// Expected result; `null` expects a null result
    #[serde(default)]
    pub expect: serde_json::Value,
}

/// Rule loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid rule definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Expression(#[from] expr::Error),

    #[error("A {kind} rule must evaluate to a boolean, got {found}")]
    NotBoolean { kind: RuleKind, found: Type },

    #[error("Duplicate field id '{0}'")]
    DuplicateField(String),

    #[error("Test '{name}' failed: expected {expected}, got {actual}")]
    TestFailed {
        name: String,
        expected: String,
        actual: String,
    },
}

/// Field types of a form, used to check expressions and to read answers
#[derive(Debug, Clone, Default)]
pub struct FormSchema {
    types: HashMap<String, Type>,
    records: HashMap<String, HashMap<String, Type>>,
}

impl FormSchema {
    /// Build from field and parameter declarations. Ids share one namespace.
    pub fn from_fields(fields: &[FieldDef], parameters: &[FieldDef]) -> Result<Self, ConfigError> {
        let mut schema = FormSchema::default();

        for field in fields.iter().chain(parameters) {
            if schema
                .types
                .insert(field.id.clone(), field.field_type.value_type())
                .is_some()
            {
                return Err(ConfigError::DuplicateField(field.id.clone()));
            }

            if field.field_type == FieldType::RecordList {
                let mut record = HashMap::new();
                for sub in &field.record {
                    if record.insert(sub.id.clone(), sub.field_type.value_type()).is_some() {
                        return Err(ConfigError::DuplicateField(format!("{}.{}", field.id, sub.id)));
                    }
                }
                schema.records.insert(field.id.clone(), record);
            }
        }

        Ok(schema)
    }

    /// Declared type of a top-level field or parameter
    pub fn field_type(&self, id: &str) -> Option<Type> {
        self.types.get(id).copied()
    }

    /// Declared type of a sub-field within one record
    pub fn record_field_type(&self, group: &str, sub: &str) -> Option<Type> {
        self.records.get(group)?.get(sub).copied()
    }
}

impl Schema for FormSchema {
    fn type_of(&self, path: &KeyPath) -> Option<Type> {
        match path.segments() {
            [id] => self.field_type(id),
            // Projection across the records of a group
            [group, sub] => self.record_field_type(group, sub).map(|_| Type::List),
            _ => None,
        }
    }
}

/// Loaded, checked, and self-tested rule
#[derive(Debug, Clone)]
pub struct Rule {
    kind: RuleKind,
    program: Program,
    schema: FormSchema,
}

impl Rule {
    /// Compile a rule and run its test cases
    #[tracing::instrument(skip(config), fields(kind = %config.kind))]
    pub fn load(config: &Config) -> Result<Self, ConfigError> {
        let schema = FormSchema::from_fields(&config.fields, &config.parameters)?;
        let program = Program::compile(&config.expression, &schema)?;

        let result_type = program.result_type().unwrap_or(Type::Untyped);
        if config.kind != RuleKind::Calculation
            && !matches!(result_type, Type::Boolean | Type::Untyped | Type::List)
        {
            return Err(ConfigError::NotBoolean {
                kind: config.kind,
                found: result_type,
            });
        }

        let rule = Rule {
            kind: config.kind,
            program,
            schema,
        };

        for test in &config.tests {
            rule.run_test(test)?;
        }

        tracing::info!(
            expression = %config.expression,
            result_type = %result_type,
            tests = config.tests.len(),
            "loaded rule"
        );

        Ok(rule)
    }

    /// Parse a JSON rule definition and load it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        Self::load(&config)
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    /// Answer context typed by this rule's schema
    pub fn context(
        &self,
        answers: HashMap<String, serde_json::Value>,
        parameters: HashMap<String, serde_json::Value>,
    ) -> AnswerContext {
        AnswerContext::new(answers, parameters).with_schema(self.schema.clone())
    }

    /// Evaluate against a resolver. Skip-logic and validation rules reduce
    /// a list result to a single boolean.
    pub fn evaluate(&self, resolver: &dyn Resolver) -> Value {
        match self.kind {
            RuleKind::Calculation => self.program.eval(resolver),
            RuleKind::SkipLogic | RuleKind::Validation => self.program.eval_condition(resolver),
        }
    }

    /// Validation semantic: only `false` fails
    pub fn passes(&self, resolver: &dyn Resolver) -> bool {
        self.program.validate(resolver)
    }

    fn run_test(&self, test: &TestCase) -> Result<(), ConfigError> {
        let ctx = self.context(test.answers.clone(), test.parameters.clone());
        let actual = self.evaluate(&ctx);
        let expected = Value::from_json(&test.expect, Some(actual.ty()));

        tracing::debug!(
            test = %test.name,
            expected = %expected,
            actual = %actual,
            "rule self-test"
        );

        if !actual.same_as(&expected) {
            return Err(ConfigError::TestFailed {
                name: test.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_deserialization_minimal() {
        let json = r#"{"expression": "1 + 1"}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.expression, "1 + 1");
        assert_eq!(config.kind, RuleKind::Calculation);
        assert!(config.fields.is_empty());
        assert!(config.tests.is_empty());
    }

    #[test]
    fn test_config_deserialization_full() {
        let json = r#"{
            "expression": "age >= 18",
            "kind": "skipLogic",
            "fields": [
                {"id": "age", "type": "integer"},
                {"id": "household", "type": "recordList",
                 "record": [{"id": "dob", "type": "date"}]}
            ],
            "parameters": [{"id": "mode", "type": "text"}],
            "tests": [
                {"name": "adult", "answers": {"age": 30}, "expect": true}
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.kind, RuleKind::SkipLogic);
        assert_eq!(config.fields.len(), 2);
        assert_eq!(config.fields[1].field_type, FieldType::RecordList);
        assert_eq!(config.fields[1].record[0].field_type, FieldType::Date);
        assert_eq!(config.parameters[0].id, "mode");
        assert_eq!(config.tests[0].answers.get("age"), Some(&json!(30)));
        assert_eq!(config.tests[0].expect, json!(true));
        assert!(config.tests[0].parameters.is_empty());
    }

    #[test]
    fn test_field_type_case_insensitive() {
        for (name, expected) in [
            ("\"datetime\"", FieldType::DateTime),
            ("\"dateTime\"", FieldType::DateTime),
            ("\"EnumerationSet\"", FieldType::EnumerationSet),
            ("\"recordlist\"", FieldType::RecordList),
        ] {
            let parsed: FieldType = serde_json::from_str(name).unwrap();
            assert_eq!(parsed, expected);
        }
        assert!(serde_json::from_str::<FieldType>("\"blob\"").is_err());
    }

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(FieldType::Float.value_type(), Type::Number);
        assert_eq!(FieldType::Enumeration.value_type(), Type::String);
        assert_eq!(FieldType::EnumerationSet.value_type(), Type::List);
        assert_eq!(serde_json::to_string(&FieldType::DateTime).unwrap(), "\"dateTime\"");
    }

    #[test]
    fn test_form_schema() {
        let config: Config = serde_json::from_value(json!({
            "expression": "",
            "fields": [
                {"id": "age", "type": "float"},
                {"id": "household", "type": "recordList",
                 "record": [{"id": "age", "type": "integer"}]}
            ],
            "parameters": [{"id": "today", "type": "date"}]
        }))
        .unwrap();
        let schema = FormSchema::from_fields(&config.fields, &config.parameters).unwrap();

        assert_eq!(schema.type_of(&KeyPath::from("age")), Some(Type::Number));
        assert_eq!(schema.type_of(&KeyPath::from("household")), Some(Type::List));
        assert_eq!(schema.type_of(&KeyPath::from("household.age")), Some(Type::List));
        assert_eq!(schema.type_of(&KeyPath::from("household.name")), None);
        assert_eq!(schema.type_of(&KeyPath::from("today")), Some(Type::Date));
        assert_eq!(schema.record_field_type("household", "age"), Some(Type::Number));
    }

    #[test]
    fn test_form_schema_duplicate_field() {
        let fields: Vec<FieldDef> = serde_json::from_value(json!([
            {"id": "age", "type": "float"}
        ]))
        .unwrap();
        let err = FormSchema::from_fields(&fields, &fields).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField(ref id) if id == "age"));
    }

    #[test]
    fn test_rule_load_runs_tests() {
        let rule = Rule::from_json(
            r#"{
                "expression": "age >= 18",
                "kind": "validation",
                "fields": [{"id": "age", "type": "integer"}],
                "tests": [
                    {"name": "adult", "answers": {"age": 30}, "expect": true},
                    {"name": "minor", "answers": {"age": 3}, "expect": false},
                    {"name": "unanswered", "answers": {}, "expect": null}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(rule.kind(), RuleKind::Validation);
        let ctx = rule.context(HashMap::new(), HashMap::new());
        assert!(rule.passes(&ctx));
    }

    #[test]
    fn test_validation_rule_reduces_list_result() {
        let rule = Rule::from_json(
            r#"{
                "expression": "colors == 'red'",
                "kind": "validation",
                "fields": [{"id": "colors", "type": "enumerationSet"}],
                "tests": [
                    {"name": "no red", "answers": {"colors": ["blue"]}, "expect": false},
                    {"name": "red", "answers": {"colors": ["blue", "red"]}, "expect": true}
                ]
            }"#,
        )
        .unwrap();

        let ctx = rule.context(
            HashMap::from([("colors".to_string(), json!(["blue", "green"]))]),
            HashMap::new(),
        );
        assert_eq!(rule.evaluate(&ctx), Value::Boolean(false));
        assert!(!rule.passes(&ctx));
    }

    #[test]
    fn test_calculation_rule_keeps_list_result() {
        let rule = Rule::from_json(
            r#"{
                "expression": "colors == 'red'",
                "fields": [{"id": "colors", "type": "enumerationSet"}]
            }"#,
        )
        .unwrap();

        let ctx = rule.context(
            HashMap::from([("colors".to_string(), json!(["blue", "red"]))]),
            HashMap::new(),
        );
        assert_eq!(
            rule.evaluate(&ctx),
            Value::list(vec![Value::Boolean(false), Value::Boolean(true)])
        );
    }

    #[test]
    fn test_rule_load_failed_test() {
        let err = Rule::from_json(
            r#"{
                "expression": "age >= 18",
                "fields": [{"id": "age", "type": "integer"}],
                "tests": [{"name": "wrong", "answers": {"age": 3}, "expect": true}]
            }"#,
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Test 'wrong' failed: expected true(), got false()"
        );
    }

    #[test]
    fn test_rule_load_requires_boolean() {
        let err = Rule::from_json(
            r#"{
                "expression": "age + 1",
                "kind": "skipLogic",
                "fields": [{"id": "age", "type": "integer"}]
            }"#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::NotBoolean {
                kind: RuleKind::SkipLogic,
                found: Type::Number
            }
        ));
    }

    #[test]
    fn test_rule_load_expression_error() {
        let err = Rule::from_json(r#"{"expression": "age >= 18"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Expression(expr::Error::Type(_))));
        assert_eq!(err.to_string(), "Type error: unknown identifier 'age'");
    }

    #[test]
    fn test_rule_load_invalid_json() {
        let err = Rule::from_json(r#"{"kind": "validation"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
