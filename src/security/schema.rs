//! Declarative validation of JSON request bodies.
//!
//! A [`Schema`] is an ordered list of [`Field`]s; each field carries a kind
//! and an ordered list of constraints. Validation reports every violated
//! constraint, grouped by field, in the order the constraints were declared.
//! Successful validation returns an object holding only the declared fields.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Key used for errors that do not belong to a single field.
pub const FORM_ERRORS: &str = "_form";

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
        .expect("static regex")
});

/// Field name → messages, in declaration order per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Outcome of validating a body: the cleaned object or the field errors.
pub type ValidationResult = Result<Value, FieldErrors>;

/// JSON kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Integer => "integer",
            Kind::Boolean => "boolean",
            Kind::Array => "array",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Kind::String, Value::String(_)) => true,
            (Kind::Number, Value::Number(_)) => true,
            (Kind::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (Kind::Boolean, Value::Bool(_)) => true,
            (Kind::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

/// Message for whole numbers outside the 64-bit signed range.
pub const INTEGER_OUT_OF_RANGE: &str = "Integer out of range";

/// A whole JSON number as `i64`, if it fits.
fn integer_value(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone)]
enum Rule {
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Email,
    Url,
    Min(f64),
    Max(f64),
    Positive,
    MinItems(usize),
    MaxItems(usize),
}

impl Rule {
    fn holds(&self, value: &Value) -> bool {
        match (self, value) {
            (Rule::MinLength(n), Value::String(s)) => s.chars().count() >= *n,
            (Rule::MaxLength(n), Value::String(s)) => s.chars().count() <= *n,
            (Rule::Pattern(re), Value::String(s)) => re.is_match(s),
            (Rule::Email, Value::String(s)) => {
                !s.starts_with('.') && !s.contains("..") && EMAIL_SHAPE.is_match(s)
            }
            (Rule::Url, Value::String(s)) => url::Url::parse(s).is_ok(),
            (Rule::Min(min), Value::Number(n)) => n.as_f64().is_some_and(|v| v >= *min),
            (Rule::Max(max), Value::Number(n)) => n.as_f64().is_some_and(|v| v <= *max),
            (Rule::Positive, Value::Number(n)) => n.as_f64().is_some_and(|v| v > 0.0),
            (Rule::MinItems(n), Value::Array(items)) => items.len() >= *n,
            (Rule::MaxItems(n), Value::Array(items)) => items.len() <= *n,
            // Kind mismatches are reported before rules run
            _ => true,
        }
    }
}

/// One declared field: kind, presence and ordered constraints.
#[derive(Debug, Clone)]
pub struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
    rules: Vec<(Rule, String)>,
    items: Option<Box<Schema>>,
}

impl Field {
    fn of(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            required: true,
            rules: Vec::new(),
            items: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::of(name, Kind::String)
    }

    pub fn number(name: &'static str) -> Self {
        Self::of(name, Kind::Number)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::of(name, Kind::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::of(name, Kind::Boolean)
    }

    /// An array whose elements are objects checked against `items`.
    pub fn array_of(name: &'static str, items: Schema) -> Self {
        let mut field = Self::of(name, Kind::Array);
        field.items = Some(Box::new(items));
        field
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn rule(mut self, rule: Rule, message: impl Into<String>) -> Self {
        self.rules.push((rule, message.into()));
        self
    }

    pub fn min_length(self, n: usize, message: impl Into<String>) -> Self {
        self.rule(Rule::MinLength(n), message)
    }

    pub fn max_length(self, n: usize, message: impl Into<String>) -> Self {
        self.rule(Rule::MaxLength(n), message)
    }

    pub fn pattern(self, regex: &Regex, message: impl Into<String>) -> Self {
        self.rule(Rule::Pattern(regex.clone()), message)
    }

    pub fn email(self, message: impl Into<String>) -> Self {
        self.rule(Rule::Email, message)
    }

    pub fn url(self, message: impl Into<String>) -> Self {
        self.rule(Rule::Url, message)
    }

    pub fn min(self, min: f64, message: impl Into<String>) -> Self {
        self.rule(Rule::Min(min), message)
    }

    pub fn max(self, max: f64, message: impl Into<String>) -> Self {
        self.rule(Rule::Max(max), message)
    }

    pub fn positive(self, message: impl Into<String>) -> Self {
        self.rule(Rule::Positive, message)
    }

    pub fn min_items(self, n: usize, message: impl Into<String>) -> Self {
        self.rule(Rule::MinItems(n), message)
    }

    pub fn max_items(self, n: usize, message: impl Into<String>) -> Self {
        self.rule(Rule::MaxItems(n), message)
    }

    /// Check a single value against this field's kind and constraints.
    ///
    /// Returns the violated messages in declaration order; empty means valid.
    pub fn check(&self, value: &Value) -> Vec<String> {
        if !self.kind.accepts(value) {
            return vec![format!(
                "Expected {}, received {}",
                self.kind.name(),
                describe(value)
            )];
        }
        if let (Kind::Integer, Value::Number(n)) = (self.kind, value) {
            if integer_value(n).is_none() {
                return vec![INTEGER_OUT_OF_RANGE.to_string()];
            }
        }
        self.rules
            .iter()
            .filter(|(rule, _)| !rule.holds(value))
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn validate_into(&self, path: &str, value: Option<&Value>, errors: &mut FieldErrors) -> Option<Value> {
        let value = match value {
            Some(v) => v,
            None if self.required => {
                errors.add(path, "Required");
                return None;
            }
            None => return None,
        };

        let messages = self.check(value);
        if !messages.is_empty() {
            for message in messages {
                errors.add(path, message);
            }
            return None;
        }

        match (&self.items, value) {
            (Some(schema), Value::Array(elements)) => {
                let mut cleaned = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    let element_path = format!("{path}.{index}");
                    if let Some(v) = schema.validate_at(&element_path, element, errors) {
                        cleaned.push(v);
                    }
                }
                Some(Value::Array(cleaned))
            }
            // 3.0 is an integer; hand it on as 3
            (None, Value::Number(n)) if self.kind == Kind::Integer => integer_value(n).map(Value::from),
            _ => Some(value.clone()),
        }
    }
}

/// An object schema: ordered fields, unknown keys dropped.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Names of the declared fields, in order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(Field::name).collect()
    }

    /// Validate a (sanitized) JSON body.
    pub fn validate(&self, input: &Value) -> ValidationResult {
        let mut errors = FieldErrors::new();
        match self.validate_at("", input, &mut errors) {
            Some(value) if errors.is_empty() => Ok(value),
            _ => Err(errors),
        }
    }

    fn validate_at(&self, prefix: &str, input: &Value, errors: &mut FieldErrors) -> Option<Value> {
        let object = match input {
            Value::Object(map) => map,
            other => {
                let key = if prefix.is_empty() { FORM_ERRORS } else { prefix };
                errors.add(key, format!("Expected object, received {}", describe(other)));
                return None;
            }
        };

        let mut cleaned = Map::new();
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{prefix}.{}", field.name)
            };
            if let Some(value) = field.validate_into(&path, object.get(field.name), errors) {
                cleaned.insert(field.name.to_string(), value);
            }
        }
        Some(Value::Object(cleaned))
    }
}
