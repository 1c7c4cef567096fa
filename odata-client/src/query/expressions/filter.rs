//! `$filter` expressions

use super::syntax::{self, Field, FieldProxy, Node, Renderable};
use crate::literal::RenderContext;

/// Connector joining the children of a filter expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterConnector {
    And,
    Or,
}

impl FilterConnector {
    fn as_str(&self) -> &'static str {
        match self {
            FilterConnector::And => "and",
            FilterConnector::Or => "or",
        }
    }
}

/// A chain of predicates joined by one connector
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    children: Vec<Node>,
    connector: FilterConnector,
    negated: bool,
}

impl Default for FilterExpression {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::with_connector(FilterConnector::And)
    }

    pub fn with_connector(connector: FilterConnector) -> Self {
        Self {
            children: Vec::new(),
            connector,
            negated: false,
        }
    }

    /// Run a builder with field paths and the current expression, or a fresh one
    pub fn build<F>(fields: &FieldProxy, current: Option<FilterExpression>, builder: F) -> Self
    where
        F: FnOnce(&FieldProxy, FilterExpression) -> FilterExpression,
    {
        builder(fields, current.unwrap_or_default())
    }

    pub fn connector(&self) -> FilterConnector {
        self.connector
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    fn push(mut self, node: Node, connector: Option<FilterConnector>) -> Self {
        match connector {
            Some(connector) if connector != self.connector => {
                let mut children = Vec::new();
                if self.children.len() == 1 {
                    children = std::mem::take(&mut self.children);
                } else if self.children.len() > 1 {
                    let current = FilterExpression {
                        children: std::mem::take(&mut self.children),
                        connector: self.connector,
                        negated: self.negated,
                    };
                    children.push(syntax::grouping(current));
                }
                match node {
                    Node::Filter(exp)
                        if !exp.negated && (exp.connector == connector || exp.len() == 1) =>
                    {
                        children.extend(exp.children);
                    }
                    other => children.push(syntax::grouping(other)),
                }
                self.connector = connector;
                self.negated = false;
                self.children = children;
            }
            _ => match node {
                Node::Filter(exp)
                    if !exp.negated && (exp.connector == self.connector || exp.len() == 1) =>
                {
                    self.children.extend(exp.children);
                }
                Node::Filter(exp) if !exp.negated => {
                    self.children.push(syntax::grouping(Node::Filter(exp)));
                }
                other => self.children.push(other),
            },
        }
        self
    }

    /// Append any node as a predicate
    pub fn expr(self, node: impl Into<Node>) -> Self {
        self.push(node.into(), None)
    }

    pub fn and(self, other: FilterExpression) -> Self {
        if other.is_empty() {
            return self;
        }
        self.push(other.into(), Some(FilterConnector::And))
    }

    pub fn or(self, other: FilterExpression) -> Self {
        if other.is_empty() {
            return self;
        }
        self.push(other.into(), Some(FilterConnector::Or))
    }

    /// Append the negation of an expression
    pub fn not(self, other: FilterExpression) -> Self {
        let negated = FilterExpression {
            negated: true,
            ..other
        };
        self.push(negated.into(), None)
    }

    pub fn eq(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::eq(left, right))
    }

    pub fn ne(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::ne(left, right))
    }

    pub fn gt(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::gt(left, right))
    }

    pub fn ge(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::ge(left, right))
    }

    pub fn lt(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::lt(left, right))
    }

    pub fn le(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::le(left, right))
    }

    pub fn has(self, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        self.expr(syntax::has(left, right))
    }

    pub fn in_<I, N>(self, left: impl Into<Node>, values: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.expr(syntax::in_(left, values))
    }

    pub fn contains(self, field: impl Into<Node>, value: impl Into<Node>) -> Self {
        self.expr(syntax::contains(field, value))
    }

    pub fn starts_with(self, field: impl Into<Node>, value: impl Into<Node>) -> Self {
        self.expr(syntax::starts_with(field, value))
    }

    pub fn ends_with(self, field: impl Into<Node>, value: impl Into<Node>) -> Self {
        self.expr(syntax::ends_with(field, value))
    }

    pub fn is_of(self, field: impl Into<Node>, type_name: &str) -> Self {
        self.expr(syntax::isof(field, type_name))
    }

    /// `Field/any(alias:predicate)` with the predicate built on a fresh expression
    pub fn any<F>(self, field: impl Into<Field>, builder: F) -> Self
    where
        F: FnOnce(FilterExpression) -> FilterExpression,
    {
        let predicate = builder(FilterExpression::new());
        self.expr(syntax::any(field.into(), predicate))
    }

    /// `Field/all(alias:predicate)` with the predicate built on a fresh expression
    pub fn all<F>(self, field: impl Into<Field>, builder: F) -> Self
    where
        F: FnOnce(FilterExpression) -> FilterExpression,
    {
        let predicate = builder(FilterExpression::new());
        self.expr(syntax::all(field.into(), predicate))
    }
}

impl Renderable for FilterExpression {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let content = self
            .children
            .iter()
            .map(|n| n.render(ctx))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", self.connector.as_str()));
        if self.negated {
            format!("not ({})", content)
        } else {
            content
        }
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expressions::syntax::to_lower;

    fn e() -> FilterExpression {
        FilterExpression::new()
    }

    #[test]
    fn test_and_chain_has_no_parentheses() {
        let exp = e().eq("Name", "a").gt("Age", 3).and(e().lt("Age", 10));
        assert_eq!(exp.to_query(), "Name eq 'a' and Age gt 3 and Age lt 10");
    }

    #[test]
    fn test_connector_change_groups_left_side() {
        let exp = e().eq("A", 1).eq("B", 2).or(e().eq("C", 3));
        assert_eq!(exp.to_query(), "(A eq 1 and B eq 2) or C eq 3");
    }

    #[test]
    fn test_single_child_left_side_is_not_grouped() {
        let exp = e().eq("A", 1).or(e().eq("B", 2));
        assert_eq!(exp.to_query(), "A eq 1 or B eq 2");
    }

    #[test]
    fn test_nested_or_inside_and_is_grouped() {
        let exp = e().eq("A", 1).and(e().eq("B", 2).or(e().eq("C", 3)));
        assert_eq!(exp.to_query(), "A eq 1 and (B eq 2 or C eq 3)");
    }

    #[test]
    fn test_right_side_with_other_connector_is_grouped() {
        let right = e().eq("B", 2).or(e().eq("C", 3));
        let exp = e().eq("A", 1).eq("D", 4).or(right.clone());
        assert_eq!(exp.to_query(), "(A eq 1 and D eq 4) or B eq 2 or C eq 3");
        let exp = e().eq("A", 1).and(right);
        assert_eq!(exp.to_query(), "A eq 1 and (B eq 2 or C eq 3)");
    }

    #[test]
    fn test_not() {
        let exp = e().eq("A", 1).not(e().contains("Name", "x"));
        assert_eq!(exp.to_query(), "A eq 1 and not (contains(Name, 'x'))");
    }

    #[test]
    fn test_lambda_in_filter() {
        let exp = e().any("Pets", |p| p.gt("Age", 3));
        assert_eq!(exp.to_query(), "Pets/any(pets:pets/Age gt 3)");
    }

    #[test]
    fn test_functions_as_operands() {
        let exp = e()
            .eq(to_lower("Name"), "scott")
            .in_("City", vec!["A", "B"]);
        assert_eq!(
            exp.to_query(),
            "tolower(Name) eq 'scott' and City in ('A','B')"
        );
    }

    #[test]
    fn test_build_continues_current_expression() {
        let s = FieldProxy::new(["Name", "Age"]);
        let first = FilterExpression::build(&s, None, |s, e| e.eq(s.get("Name"), "a"));
        let second = FilterExpression::build(&s, Some(first), |s, e| e.gt(s.get("Age"), 1));
        assert_eq!(second.to_query(), "Name eq 'a' and Age gt 1");
    }

    #[test]
    fn test_clone_renders_identically() {
        let exp = e().eq("A", 1).or(e().eq("B", 2).eq("C", 3));
        assert_eq!(exp.clone().to_query(), exp.to_query());
    }
}
