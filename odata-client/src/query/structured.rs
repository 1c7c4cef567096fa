//! Rendering of plain (JSON) query option values
//!
//! Options may be given as strings, arrays or nested objects instead of
//! expression trees, e.g. `{"Trips": {"select": ["Name"], "top": 2}}` for
//! `$expand` or `{"Age": {"gt": 3}}` for `$filter`.

use super::names::QueryOptionName;
use crate::literal::{Literal, RenderContext, normalize};
use serde_json::{Map, Value};

const COMPARISON_OPERATORS: [&str; 7] = ["eq", "ne", "gt", "ge", "lt", "le", "has"];
const STRING_FUNCTIONS: [&str; 3] = ["contains", "startswith", "endswith"];

/// Render a plain option value, `None` when it renders empty
pub fn render_value(
    name: QueryOptionName,
    value: &Value,
    ctx: &mut RenderContext,
) -> Option<String> {
    let rendered = match name {
        QueryOptionName::Filter => render_filter(value, ctx),
        QueryOptionName::Expand => render_expand(value, ctx),
        QueryOptionName::Select | QueryOptionName::OrderBy | QueryOptionName::Compute => {
            render_list(value)
        }
        _ => render_scalar(value),
    };
    (!rendered.is_empty()).then_some(rendered)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// `["Name", ["Age", "desc"]]` style lists
fn render_list(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(pair) => pair.iter().map(render_scalar).collect::<Vec<_>>().join(" "),
                other => render_scalar(other),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        other => render_scalar(other),
    }
}

fn literal(value: &Value, ctx: &mut RenderContext) -> String {
    normalize(&Literal::from_json(value), ctx)
}

/// Render a filter given as string, array of conditions or condition object
pub fn render_filter(value: &Value, ctx: &mut RenderContext) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts = items.iter().map(|i| render_filter(i, ctx)).collect();
            join_wrapped(parts, "and")
        }
        Value::Object(map) => render_filter_object(map, None, ctx),
        _ => String::new(),
    }
}

fn join_wrapped(parts: Vec<String>, connector: &str) -> String {
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_default();
    }
    parts
        .into_iter()
        .map(|p| format!("({})", p))
        .collect::<Vec<_>>()
        .join(&format!(" {} ", connector))
}

fn render_filter_object(
    map: &Map<String, Value>,
    prefix: Option<&str>,
    ctx: &mut RenderContext,
) -> String {
    let mut parts = Vec::new();
    for (key, value) in map {
        let lower = key.to_ascii_lowercase();
        let part = match (lower.as_str(), value) {
            ("and" | "or", Value::Array(items)) => {
                let rendered = items.iter().map(|i| render_filter(i, ctx)).collect();
                join_wrapped(rendered, &lower)
            }
            ("and" | "or", Value::Object(inner)) => {
                let rendered = inner
                    .iter()
                    .map(|(k, v)| {
                        let mut single = Map::new();
                        single.insert(k.clone(), v.clone());
                        render_filter_object(&single, prefix, ctx)
                    })
                    .collect();
                join_wrapped(rendered, &lower)
            }
            ("not", inner) => format!("not ({})", render_filter(inner, ctx)),
            _ => {
                let field = match prefix {
                    Some(prefix) => format!("{}/{}", prefix, key),
                    None => key.clone(),
                };
                render_condition(&field, value, ctx)
            }
        };
        if !part.is_empty() {
            parts.push(part);
        }
    }
    parts.join(" and ")
}

fn render_condition(field: &str, value: &Value, ctx: &mut RenderContext) -> String {
    let ops = match value {
        Value::Object(ops) => ops,
        scalar => return format!("{} eq {}", field, literal(scalar, ctx)),
    };
    let mut parts = Vec::new();
    for (op, operand) in ops {
        let lower = op.to_ascii_lowercase();
        if COMPARISON_OPERATORS.contains(&lower.as_str()) {
            parts.push(format!("{} {} {}", field, lower, literal(operand, ctx)));
        } else if lower == "in" {
            let items = match operand {
                Value::Array(items) => items.iter().map(|i| literal(i, ctx)).collect::<Vec<_>>(),
                other => vec![literal(other, ctx)],
            };
            parts.push(format!("{} in ({})", field, items.join(",")));
        } else if STRING_FUNCTIONS.contains(&lower.as_str()) {
            parts.push(format!("{}({}, {})", lower, field, literal(operand, ctx)));
        } else {
            // Nested structural property
            let mut nested = Map::new();
            nested.insert(op.clone(), operand.clone());
            parts.push(render_filter_object(&nested, Some(field), ctx));
        }
    }
    parts.join(" and ")
}

/// Render an expand given as string, array or `{Nav: {options}}` object
pub fn render_expand(value: &Value, ctx: &mut RenderContext) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|i| render_expand(i, ctx))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(map) => map
            .iter()
            .map(|(nav, options)| match options {
                Value::Object(opts) if !opts.is_empty() => {
                    let nested = render_nested_options(opts, ctx);
                    if nested.is_empty() {
                        nav.clone()
                    } else {
                        format!("{}({})", nav, nested)
                    }
                }
                _ => nav.clone(),
            })
            .collect::<Vec<_>>()
            .join(","),
        _ => String::new(),
    }
}

fn render_nested_options(opts: &Map<String, Value>, ctx: &mut RenderContext) -> String {
    let mut ordered: Vec<(QueryOptionName, &Value)> = opts
        .iter()
        .filter_map(|(k, v)| QueryOptionName::parse(k).map(|n| (n, v)))
        .collect();
    ordered.sort_by_key(|(n, _)| *n);
    ordered
        .into_iter()
        .filter_map(|(name, value)| {
            let rendered = match name {
                QueryOptionName::Count => match value {
                    Value::Bool(true) => Some("true".to_string()),
                    _ => None,
                },
                other => render_value(other, value, ctx),
            }?;
            Some(format!("{}={}", name.param(), rendered))
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn r(name: QueryOptionName, value: Value) -> Option<String> {
        render_value(name, &value, &mut RenderContext::new())
    }

    #[test]
    fn test_select_and_orderby_lists() {
        assert_eq!(
            r(QueryOptionName::Select, json!(["Name", "Age"])),
            Some("Name,Age".into())
        );
        assert_eq!(
            r(QueryOptionName::OrderBy, json!(["Name", ["Age", "desc"]])),
            Some("Name,Age desc".into())
        );
        assert_eq!(r(QueryOptionName::Select, json!([])), None);
    }

    #[test]
    fn test_filter_objects() {
        assert_eq!(
            r(QueryOptionName::Filter, json!({"Name": "Scott"})),
            Some("Name eq 'Scott'".into())
        );
        assert_eq!(
            r(QueryOptionName::Filter, json!({"Age": {"gt": 3, "lt": 10}})),
            Some("Age gt 3 and Age lt 10".into())
        );
        assert_eq!(
            r(QueryOptionName::Filter, json!({"Name": {"contains": "ab"}})),
            Some("contains(Name, 'ab')".into())
        );
        assert_eq!(
            r(QueryOptionName::Filter, json!({"City": {"in": ["A", "B"]}})),
            Some("City in ('A','B')".into())
        );
        assert_eq!(
            r(
                QueryOptionName::Filter,
                json!({"Address": {"City": "Lyon"}}),
            ),
            Some("Address/City eq 'Lyon'".into())
        );
    }

    #[test]
    fn test_filter_arrays_and_connectors() {
        assert_eq!(
            r(QueryOptionName::Filter, json!([{"A": 1}, {"B": 2}])),
            Some("(A eq 1) and (B eq 2)".into())
        );
        assert_eq!(
            r(QueryOptionName::Filter, json!({"or": [{"A": 1}, {"B": 2}]})),
            Some("(A eq 1) or (B eq 2)".into())
        );
        assert_eq!(
            r(QueryOptionName::Filter, json!({"not": {"A": 1}})),
            Some("not (A eq 1)".into())
        );
    }

    #[test]
    fn test_expand_objects() {
        assert_eq!(
            r(
                QueryOptionName::Expand,
                json!({"Trips": {"select": ["Name"], "top": 2, "filter": {"Budget": {"gt": 5}}}})
            ),
            Some("Trips($select=Name;$filter=Budget gt 5;$top=2)".into())
        );
        assert_eq!(
            r(QueryOptionName::Expand, json!(["Friends", {"Trips": {}}])),
            Some("Friends,Trips".into())
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(r(QueryOptionName::Top, json!(10)), Some("10".into()));
        assert_eq!(
            r(QueryOptionName::SkipToken, json!("abc")),
            Some("abc".into())
        );
        assert_eq!(r(QueryOptionName::Top, Value::Null), None);
    }
}
