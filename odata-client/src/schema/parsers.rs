//! Value parsers for Edm primitives, enums, structured types and callables
//!
//! Parsers convert between wire JSON and the values held by models
//! (`deserialize`/`serialize`) and produce URL literals (`encode`).

use super::Schema;
use super::types::{CallableDef, EnumTypeDef, FieldDef, StructuredType};
use crate::constants::*;
use crate::literal::Literal;
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Switches that change how values are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Int64 and Decimal travel as JSON strings
    pub ieee754_compatible: bool,
    /// Enum members encode as bare quoted names
    pub string_as_enum: bool,
}

/// Converts values of one schema type
pub trait Parser: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// Wire JSON to model value
    fn deserialize(&self, value: &Value, options: &ParserOptions) -> Value;

    /// Model value to wire JSON
    fn serialize(&self, value: &Value, options: &ParserOptions) -> Value;

    /// Model value to URL literal
    fn encode(&self, value: &Value, options: &ParserOptions) -> Literal;
}

/// Parser for `Edm.*` primitive types
#[derive(Debug, Clone)]
pub struct EdmParser {
    type_name: String,
}

impl EdmParser {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            EDM_INT16 | EDM_INT32 | EDM_INT64 | EDM_BYTE | EDM_SBYTE
        )
    }

    fn is_decimal(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            EDM_SINGLE | EDM_DOUBLE | EDM_DECIMAL
        )
    }

    fn travels_as_string(&self) -> bool {
        matches!(self.type_name.as_str(), EDM_INT64 | EDM_DECIMAL)
    }
}

impl Parser for EdmParser {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn deserialize(&self, value: &Value, options: &ParserOptions) -> Value {
        match value {
            Value::String(s) if self.is_integer() => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            // INF and NaN stay strings
            Value::String(s) if self.is_decimal() => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            Value::String(s) if self.type_name == EDM_BOOLEAN => match s.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => value.clone(),
            },
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.deserialize(v, options)).collect())
            }
            _ => value.clone(),
        }
    }

    fn serialize(&self, value: &Value, options: &ParserOptions) -> Value {
        match value {
            Value::Number(n) if options.ieee754_compatible && self.travels_as_string() => {
                Value::String(n.to_string())
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.serialize(v, options)).collect())
            }
            _ => value.clone(),
        }
    }

    fn encode(&self, value: &Value, _options: &ParserOptions) -> Literal {
        let s = match value {
            Value::String(s) => s,
            other => return Literal::from_json(other),
        };
        match self.type_name.as_str() {
            EDM_GUID => Uuid::parse_str(s)
                .map(Literal::Guid)
                .unwrap_or_else(|_| Literal::String(s.clone())),
            EDM_DATETIME_OFFSET => DateTime::parse_from_rfc3339(s)
                .map(Literal::DateTime)
                .unwrap_or_else(|_| Literal::Raw(s.clone())),
            EDM_DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Literal::Date)
                .unwrap_or_else(|_| Literal::Raw(s.clone())),
            EDM_TIME_OF_DAY => Literal::Raw(s.clone()),
            EDM_DURATION => Literal::Raw(format!("duration'{}'", s)),
            EDM_BINARY => Literal::Raw(format!("binary'{}'", s)),
            _ if self.is_integer() || self.is_decimal() => Literal::Raw(s.clone()),
            _ => Literal::String(s.clone()),
        }
    }
}

/// Parser for enum types; model values are member numbers
#[derive(Debug, Clone)]
pub struct EnumParser {
    def: Arc<EnumTypeDef>,
    type_name: String,
}

impl EnumParser {
    pub fn new(def: Arc<EnumTypeDef>) -> Self {
        let type_name = def.qualified_name();
        Self { def, type_name }
    }

    fn member_value(&self, name: &str) -> Option<i64> {
        self.def
            .members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, v)| *v)
    }

    /// Member names for a numeric value; flag enums may yield several
    pub fn names(&self, value: i64) -> Vec<String> {
        if self.def.flags {
            self.def
                .members
                .iter()
                .filter(|(_, v)| *v != 0 && value & v == *v)
                .map(|(name, _)| name.clone())
                .collect()
        } else {
            self.def
                .members
                .iter()
                .filter(|(_, v)| *v == value)
                .map(|(name, _)| name.clone())
                .collect()
        }
    }

    fn member_names(&self, value: &Value) -> Option<String> {
        match value {
            Value::Number(n) => {
                let names = self.names(n.as_i64()?);
                (!names.is_empty()).then(|| names.join(", "))
            }
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl Parser for EnumParser {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn deserialize(&self, value: &Value, _options: &ParserOptions) -> Value {
        match value {
            Value::String(s) => {
                let mut total = 0;
                for name in s.split(',').map(str::trim) {
                    match self.member_value(name) {
                        Some(v) if self.def.flags => total |= v,
                        Some(v) => total = v,
                        None => return value.clone(),
                    }
                }
                Value::from(total)
            }
            _ => value.clone(),
        }
    }

    fn serialize(&self, value: &Value, _options: &ParserOptions) -> Value {
        self.member_names(value)
            .map(Value::String)
            .unwrap_or_else(|| value.clone())
    }

    fn encode(&self, value: &Value, options: &ParserOptions) -> Literal {
        match self.member_names(value) {
            Some(names) if options.string_as_enum => Literal::String(names),
            Some(names) => Literal::Raw(format!("{}'{}'", self.type_name, names)),
            None => Literal::Null,
        }
    }
}

/// Parser for entity and complex types, delegating per field
pub struct StructuredParser {
    ty: Arc<StructuredType>,
    type_name: String,
    schema: Arc<dyn Schema>,
}

impl fmt::Debug for StructuredParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredParser")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl StructuredParser {
    pub fn new(ty: Arc<StructuredType>, schema: Arc<dyn Schema>) -> Self {
        let type_name = ty.qualified_name();
        Self {
            ty,
            type_name,
            schema,
        }
    }

    /// Parser for a derived type announced by `@odata.type`
    fn derived(&self, map: &Map<String, Value>) -> Option<Arc<dyn Parser>> {
        let announced = map.get(ODATA_TYPE)?.as_str()?.trim_start_matches('#');
        if announced == self.type_name {
            return None;
        }
        let derived = self.schema.find_structured_type(announced)?;
        derived
            .is_sub_type_of(&self.type_name)
            .then(|| self.schema.parser_for_type(announced))
            .flatten()
    }

    fn convert(
        &self,
        value: &Value,
        options: &ParserOptions,
        op: fn(&dyn Parser, &Value, &ParserOptions) -> Value,
    ) -> Value {
        let map = match value {
            Value::Object(map) => map,
            Value::Array(items) => {
                return Value::Array(items.iter().map(|v| self.convert(v, options, op)).collect());
            }
            _ => return value.clone(),
        };
        if let Some(derived) = self.derived(map) {
            return op(derived.as_ref(), value, options);
        }
        let mut out = Map::with_capacity(map.len());
        for (name, field_value) in map {
            let converted = match self.field_parser(name) {
                Some(parser) => op(parser.as_ref(), field_value, options),
                None => field_value.clone(),
            };
            out.insert(name.clone(), converted);
        }
        Value::Object(out)
    }

    fn field_parser(&self, name: &str) -> Option<Arc<dyn Parser>> {
        if name.contains('@') {
            return None;
        }
        let field = self.ty.find_field(name)?;
        self.schema.parser_for_type(&field.type_name)
    }
}

impl Parser for StructuredParser {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn deserialize(&self, value: &Value, options: &ParserOptions) -> Value {
        self.convert(value, options, |p, v, o| p.deserialize(v, o))
    }

    fn serialize(&self, value: &Value, options: &ParserOptions) -> Value {
        self.convert(value, options, |p, v, o| p.serialize(v, o))
    }

    fn encode(&self, value: &Value, options: &ParserOptions) -> Literal {
        Literal::Raw(self.serialize(value, options).to_string())
    }
}

/// Parser for function and action payloads
///
/// Serializing converts a parameter object; deserializing converts a
/// result using the declared return type.
pub struct CallableParser {
    def: Arc<CallableDef>,
    type_name: String,
    schema: Arc<dyn Schema>,
}

impl fmt::Debug for CallableParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableParser")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl CallableParser {
    pub fn new(def: Arc<CallableDef>, schema: Arc<dyn Schema>) -> Self {
        let type_name = def.qualified_name();
        Self {
            def,
            type_name,
            schema,
        }
    }
}

impl Parser for CallableParser {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn deserialize(&self, value: &Value, options: &ParserOptions) -> Value {
        match self
            .def
            .return_type
            .as_ref()
            .and_then(|r| self.schema.parser_for_type(&r.type_name))
        {
            Some(parser) => parser.deserialize(value, options),
            None => value.clone(),
        }
    }

    fn serialize(&self, value: &Value, options: &ParserOptions) -> Value {
        match value {
            Value::Object(params) => {
                let schema = self.schema.as_ref();
                Value::Object(serialize_parameters(schema, &self.def, params, options))
            }
            _ => value.clone(),
        }
    }

    fn encode(&self, value: &Value, options: &ParserOptions) -> Literal {
        Literal::Raw(self.serialize(value, options).to_string())
    }
}

fn parameter_parser(
    schema: &dyn Schema,
    def: &CallableDef,
    name: &str,
) -> Option<(FieldDef, Arc<dyn Parser>)> {
    let field = def.call_parameters().iter().find(|p| p.name == name)?;
    let parser = schema.parser_for_type(&field.type_name)?;
    Some((field.clone(), parser))
}

/// Parameters as URL literals, in the order given
pub fn encode_parameters(
    schema: &dyn Schema,
    def: &CallableDef,
    params: &Map<String, Value>,
    options: &ParserOptions,
) -> Vec<(String, Literal)> {
    params
        .iter()
        .map(|(name, value)| {
            let literal = match parameter_parser(schema, def, name) {
                Some((field, _)) if field.collection => Literal::Raw(value.to_string()),
                Some((_, parser)) => parser.encode(value, options),
                None => Literal::from_json(value),
            };
            (name.clone(), literal)
        })
        .collect()
}

/// Parameters as an action body
pub fn serialize_parameters(
    schema: &dyn Schema,
    def: &CallableDef,
    params: &Map<String, Value>,
    options: &ParserOptions,
) -> Map<String, Value> {
    params
        .iter()
        .map(|(name, value)| {
            let serialized = match parameter_parser(schema, def, name) {
                Some((_, parser)) => parser.serialize(value, options),
                None => value.clone(),
            };
            (name.clone(), serialized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{RenderContext, normalize};
    use serde_json::json;

    fn opts() -> ParserOptions {
        ParserOptions::default()
    }

    fn color() -> EnumParser {
        EnumParser::new(Arc::new(
            EnumTypeDef::new("NS", "Color")
                .member("Red", 1)
                .member("Green", 2)
                .member("Blue", 4),
        ))
    }

    fn flags() -> EnumParser {
        EnumParser::new(Arc::new(
            EnumTypeDef::new("NS", "Access")
                .flags()
                .member("None", 0)
                .member("Read", 1)
                .member("Write", 2),
        ))
    }

    #[test]
    fn test_int64_strings_deserialize_to_numbers() {
        let parser = EdmParser::new(EDM_INT64);
        assert_eq!(parser.deserialize(&json!("42"), &opts()), json!(42));
        assert_eq!(parser.deserialize(&json!(7), &opts()), json!(7));
    }

    #[test]
    fn test_ieee754_serialization() {
        let parser = EdmParser::new(EDM_DECIMAL);
        let ieee = ParserOptions {
            ieee754_compatible: true,
            ..opts()
        };
        assert_eq!(parser.serialize(&json!(12), &ieee), json!("12"));
        assert_eq!(parser.serialize(&json!(12), &opts()), json!(12));
    }

    #[test]
    fn test_edm_encoding() {
        let mut ctx = RenderContext::new();
        let guid = EdmParser::new(EDM_GUID)
            .encode(&json!("cd1bd5c3-1c4b-4c58-9a3a-6a8f3b4a2e11"), &opts());
        assert_eq!(
            normalize(&guid, &mut ctx),
            "cd1bd5c3-1c4b-4c58-9a3a-6a8f3b4a2e11"
        );
        let duration = EdmParser::new(EDM_DURATION).encode(&json!("PT1H"), &opts());
        assert_eq!(normalize(&duration, &mut ctx), "duration'PT1H'");
        let name = EdmParser::new(EDM_STRING).encode(&json!("O'Neil"), &opts());
        assert_eq!(normalize(&name, &mut ctx), "'O''Neil'");
    }

    #[test]
    fn test_enum_round_trip() {
        let parser = color();
        assert_eq!(parser.deserialize(&json!("Green"), &opts()), json!(2));
        assert_eq!(parser.serialize(&json!(2), &opts()), json!("Green"));
        assert_eq!(
            parser.deserialize(&json!("Purple"), &opts()),
            json!("Purple")
        );
    }

    #[test]
    fn test_flag_enums_combine() {
        let parser = flags();
        assert_eq!(parser.deserialize(&json!("Read, Write"), &opts()), json!(3));
        assert_eq!(parser.serialize(&json!(3), &opts()), json!("Read, Write"));
    }

    #[test]
    fn test_enum_encoding() {
        let mut ctx = RenderContext::new();
        let qualified = color().encode(&json!(4), &opts());
        assert_eq!(normalize(&qualified, &mut ctx), "NS.Color'Blue'");
        let bare = color().encode(
            &json!(4),
            &ParserOptions {
                string_as_enum: true,
                ..opts()
            },
        );
        assert_eq!(normalize(&bare, &mut ctx), "'Blue'");
    }
}
