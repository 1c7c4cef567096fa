//! Literal values and their OData textual form
//!
//! Every literal that reaches a rendered URL goes through [`normalize`]:
//! strings are quoted with doubled single quotes, dates render as ISO 8601,
//! aliases render as `@name` and land in the render context so they can be
//! flushed into the query parameters afterwards.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

static ALIAS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A literal that can be rendered into a URL
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    Guid(Uuid),
    /// Rendered exactly as given
    Raw(String),
    Alias(Alias),
    List(Vec<Literal>),
}

/// A named query parameter standing in for an inline literal
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    name: String,
    value: Box<Literal>,
}

impl Alias {
    pub fn new(name: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self {
            name: name.into().trim_start_matches('@').to_string(),
            value: Box::new(value.into()),
        }
    }

    /// Alias with a generated `pN` name
    pub fn auto(value: impl Into<Literal>) -> Self {
        let n = ALIAS_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Self::new(format!("p{}", n), value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Literal {
        &self.value
    }

    /// Parameter key, `@name`
    pub fn param(&self) -> String {
        format!("@{}", self.name)
    }
}

/// Register a named or auto-named alias for a value
pub fn alias(value: impl Into<Literal>, name: Option<&str>) -> Literal {
    let alias = match name {
        Some(name) => Alias::new(name, value),
        None => Alias::auto(value),
    };
    Literal::Alias(alias)
}

/// A literal rendered verbatim, e.g. an enum member or a GUID
pub fn raw(value: impl Into<String>) -> Literal {
    Literal::Raw(value.into())
}

/// Rendering context shared by every node of an expression tree
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Percent-encode characters that are illegal inside a URL component
    pub escape: bool,
    /// Prefix applied to field paths
    pub prefix: Option<String>,
    aliases: Vec<Alias>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escaped() -> Self {
        Self::with_escape(true)
    }

    pub fn with_escape(escape: bool) -> Self {
        Self {
            escape,
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn register_alias(&mut self, alias: &Alias) {
        if !self.aliases.iter().any(|a| a.name == alias.name) {
            self.aliases.push(alias.clone());
        }
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Render collected aliases as `(@name, value)` query parameters
    pub fn alias_params(&self) -> Vec<(String, String)> {
        let mut scratch = RenderContext::with_escape(self.escape);
        self.aliases
            .iter()
            .map(|a| (a.param(), normalize(&a.value, &mut scratch)))
            .collect()
    }
}

/// Convert a literal into OData syntax
pub fn normalize(value: &Literal, ctx: &mut RenderContext) -> String {
    match value {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) if f.is_nan() => "NaN".to_string(),
        Literal::Float(f) if f.is_infinite() && f.is_sign_positive() => "INF".to_string(),
        Literal::Float(f) if f.is_infinite() => "-INF".to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::String(s) => {
            let quoted = s.replace('\'', "''");
            if ctx.escape {
                format!("'{}'", escape_illegal_chars(&quoted))
            } else {
                format!("'{}'", quoted)
            }
        }
        Literal::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Literal::Date(d) => d.format("%Y-%m-%d").to_string(),
        Literal::Guid(g) => g.hyphenated().to_string(),
        Literal::Raw(r) => r.clone(),
        Literal::Alias(alias) => {
            ctx.register_alias(alias);
            alias.param()
        }
        Literal::List(items) => {
            let rendered: Vec<String> = items.iter().map(|i| normalize(i, ctx)).collect();
            format!("[{}]", rendered.join(","))
        }
    }
}

/// Escape the characters that break a URL component
pub fn escape_illegal_chars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '+' => out.push_str("%2B"),
            '/' => out.push_str("%2F"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            '&' => out.push_str("%26"),
            _ => out.push(c),
        }
    }
    out
}

impl Literal {
    /// Convert a JSON value into a literal
    pub fn from_json(value: &Value) -> Literal {
        match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Literal::Int(i),
                None => Literal::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Literal::String(s.clone()),
            Value::Array(items) => Literal::List(items.iter().map(Literal::from_json).collect()),
            Value::Object(_) => Literal::Raw(value.to_string()),
        }
    }

    /// JSON form used in request bodies and parameter payloads
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Float(f) => Value::from(*f),
            Literal::String(s) | Literal::Raw(s) => Value::String(s.clone()),
            Literal::DateTime(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Literal::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Literal::Guid(g) => Value::String(g.hyphenated().to_string()),
            Literal::Alias(a) => a.value.to_json(),
            Literal::List(items) => Value::Array(items.iter().map(Literal::to_json).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<&String> for Literal {
    fn from(value: &String) -> Self {
        Literal::String(value.clone())
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<u32> for Literal {
    fn from(value: u32) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<usize> for Literal {
    fn from(value: usize) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<Uuid> for Literal {
    fn from(value: Uuid) -> Self {
        Literal::Guid(value)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(value: DateTime<Utc>) -> Self {
        Literal::DateTime(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Literal {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Literal::DateTime(value)
    }
}

impl From<NaiveDate> for Literal {
    fn from(value: NaiveDate) -> Self {
        Literal::Date(value)
    }
}

impl From<Alias> for Literal {
    fn from(value: Alias) -> Self {
        Literal::Alias(value)
    }
}

impl From<Value> for Literal {
    fn from(value: Value) -> Self {
        Literal::from_json(&value)
    }
}

impl From<&Value> for Literal {
    fn from(value: &Value) -> Self {
        Literal::from_json(value)
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Literal::Null)
    }
}

impl<T: Into<Literal>> From<Vec<T>> for Literal {
    fn from(value: Vec<T>) -> Self {
        Literal::List(value.into_iter().map(Into::into).collect())
    }
}
