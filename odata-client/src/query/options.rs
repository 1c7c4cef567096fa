//! Query options of a resource

use super::expressions::{
    ComputeExpression, ExpandExpression, Expression, FieldProxy, FilterExpression,
    OrderByExpression, Renderable, SearchExpression, SelectExpression,
};
use super::handler::OptionHandle;
use super::names::QueryOptionName;
use super::params::Params;
use super::structured;
use crate::literal::RenderContext;
use serde_json::Value;
use std::collections::BTreeMap;

/// Value held by a query option
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Primitive, array or nested object
    Json(Value),
    Expression(Expression),
}

/// Mapping from option name to value; at most one value per name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    options: BTreeMap<QueryOptionName, OptionValue>,
}

/// Whether a JSON value counts as "no value"
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for reading and editing one option
    pub fn option(&mut self, name: QueryOptionName) -> OptionHandle<'_> {
        OptionHandle::new(self, name)
    }

    pub fn get(&self, name: QueryOptionName) -> Option<&OptionValue> {
        self.options.get(&name)
    }

    pub fn has(&self, name: QueryOptionName) -> bool {
        self.options.contains_key(&name)
    }

    /// Set a plain value; an empty value removes the option
    pub fn set(&mut self, name: QueryOptionName, value: impl Into<Value>) {
        let value = value.into();
        if is_empty_value(&value) {
            self.options.remove(&name);
        } else {
            self.options.insert(name, OptionValue::Json(value));
        }
    }

    /// Store an expression tree; an empty tree removes the option
    pub fn set_expression(&mut self, name: QueryOptionName, expression: Expression) {
        if expression.is_empty() {
            self.options.remove(&name);
        } else {
            let value = OptionValue::Expression(expression);
            self.options.insert(name, value);
        }
    }

    pub fn remove(&mut self, names: &[QueryOptionName]) {
        for name in names {
            self.options.remove(name);
        }
    }

    /// Drop every option not listed
    pub fn keep(&mut self, names: &[QueryOptionName]) {
        self.options.retain(|name, _| names.contains(name));
    }

    pub fn clear(&mut self) {
        self.options.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = QueryOptionName> + '_ {
        self.options.keys().copied()
    }

    fn take_expression(&mut self, name: QueryOptionName) -> Option<Expression> {
        match self.options.get(&name) {
            Some(OptionValue::Expression(_)) => match self.options.remove(&name) {
                Some(OptionValue::Expression(e)) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }

    /// Build or extend the `$filter` expression
    pub fn filter<F>(&mut self, fields: &FieldProxy, builder: F)
    where
        F: FnOnce(&FieldProxy, FilterExpression) -> FilterExpression,
    {
        let current = match self.take_expression(QueryOptionName::Filter) {
            Some(Expression::Filter(f)) => Some(f),
            _ => None,
        };
        let exp = FilterExpression::build(fields, current, builder);
        self.set_expression(QueryOptionName::Filter, Expression::Filter(exp));
    }

    /// Build or extend the `$orderby` expression
    pub fn orderby<F>(&mut self, builder: F)
    where
        F: FnOnce(OrderByExpression) -> OrderByExpression,
    {
        let current = match self.take_expression(QueryOptionName::OrderBy) {
            Some(Expression::OrderBy(o)) => Some(o),
            _ => None,
        };
        let exp = OrderByExpression::build(current, builder);
        self.set_expression(QueryOptionName::OrderBy, Expression::OrderBy(exp));
    }

    /// Build or extend the `$search` expression
    pub fn search<F>(&mut self, builder: F)
    where
        F: FnOnce(SearchExpression) -> SearchExpression,
    {
        let current = match self.take_expression(QueryOptionName::Search) {
            Some(Expression::Search(s)) => Some(s),
            _ => None,
        };
        let exp = SearchExpression::build(current, builder);
        self.set_expression(QueryOptionName::Search, Expression::Search(exp));
    }

    /// Build or extend the `$compute` expression
    pub fn compute<F>(&mut self, builder: F)
    where
        F: FnOnce(ComputeExpression) -> ComputeExpression,
    {
        let current = match self.take_expression(QueryOptionName::Compute) {
            Some(Expression::Compute(c)) => Some(c),
            _ => None,
        };
        let exp = ComputeExpression::build(current, builder);
        self.set_expression(QueryOptionName::Compute, Expression::Compute(exp));
    }

    /// Build or extend the `$select` expression
    pub fn select<F>(&mut self, builder: F)
    where
        F: FnOnce(SelectExpression) -> SelectExpression,
    {
        let current = match self.take_expression(QueryOptionName::Select) {
            Some(Expression::Select(s)) => Some(s),
            _ => None,
        };
        let exp = SelectExpression::build(current, builder);
        self.set_expression(QueryOptionName::Select, Expression::Select(exp));
    }

    /// Build or extend the `$expand` expression
    pub fn expand<F>(&mut self, builder: F)
    where
        F: FnOnce(ExpandExpression) -> ExpandExpression,
    {
        let current = match self.take_expression(QueryOptionName::Expand) {
            Some(Expression::Expand(e)) => Some(e),
            _ => None,
        };
        let exp = ExpandExpression::build(current, builder);
        self.set_expression(QueryOptionName::Expand, Expression::Expand(exp));
    }

    /// Set paging options, clearing those not given
    pub fn paging(&mut self, skip: Option<u64>, skiptoken: Option<String>, top: Option<u64>) {
        self.set(
            QueryOptionName::Skip,
            skip.map(Value::from).unwrap_or(Value::Null),
        );
        self.set(
            QueryOptionName::SkipToken,
            skiptoken.map(Value::from).unwrap_or(Value::Null),
        );
        if let Some(top) = top {
            self.set(QueryOptionName::Top, top);
        }
    }

    pub fn clear_paging(&mut self) {
        self.remove(&[
            QueryOptionName::Skip,
            QueryOptionName::SkipToken,
            QueryOptionName::Top,
        ]);
    }

    /// Render one option, `None` when absent or empty
    pub fn render_option(&self, name: QueryOptionName, ctx: &mut RenderContext) -> Option<String> {
        match self.options.get(&name)? {
            OptionValue::Json(value) => structured::render_value(name, value, ctx),
            OptionValue::Expression(exp) => {
                let rendered = exp.render(ctx);
                (!rendered.is_empty()).then_some(rendered)
            }
        }
    }

    /// Render every option in canonical order, then the collected aliases
    pub fn to_params(&self, escape: bool) -> Params {
        let mut ctx = RenderContext::with_escape(escape);
        let mut params = Params::new();
        for name in QueryOptionName::CANONICAL {
            if let Some(value) = self.render_option(name, &mut ctx) {
                params.insert(name.param(), value);
            }
        }
        for (name, value) in ctx.alias_params() {
            params.insert(name, value);
        }
        log::trace!("rendered query options: {}", params.to_raw_string());
        params
    }
}
