//! `$search` expressions

use super::syntax::Renderable;
use crate::literal::RenderContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchConnector {
    And,
    Or,
}

impl SearchConnector {
    fn as_str(&self) -> &'static str {
        match self {
            SearchConnector::And => "AND",
            SearchConnector::Or => "OR",
        }
    }
}

/// Child of a search expression
#[derive(Debug, Clone, PartialEq)]
pub enum SearchNode {
    Term(String),
    Expression(SearchExpression),
    Grouping(Box<SearchNode>),
}

impl Renderable for SearchNode {
    fn render(&self, ctx: &mut RenderContext) -> String {
        match self {
            SearchNode::Term(term) if term.chars().any(char::is_whitespace) => {
                format!("\"{}\"", term)
            }
            SearchNode::Term(term) => term.clone(),
            SearchNode::Expression(exp) => exp.render(ctx),
            SearchNode::Grouping(inner) => format!("({})", inner.render(ctx)),
        }
    }
}

/// Search terms joined by `AND`/`OR`, optionally negated
#[derive(Debug, Clone, PartialEq)]
pub struct SearchExpression {
    children: Vec<SearchNode>,
    connector: SearchConnector,
    negated: bool,
}

impl Default for SearchExpression {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchExpression {
    pub fn new() -> Self {
        Self::with_connector(SearchConnector::And)
    }

    pub fn with_connector(connector: SearchConnector) -> Self {
        Self {
            children: Vec::new(),
            connector,
            negated: false,
        }
    }

    /// Run a builder with the current expression, or a fresh one
    pub fn build<F>(current: Option<SearchExpression>, builder: F) -> Self
    where
        F: FnOnce(SearchExpression) -> SearchExpression,
    {
        builder(current.unwrap_or_default())
    }

    pub fn connector(&self) -> SearchConnector {
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

    fn push(mut self, node: SearchNode, connector: Option<SearchConnector>) -> Self {
        match connector {
            Some(connector) if connector != self.connector => {
                let mut children = Vec::new();
                if self.children.len() == 1 {
                    children = std::mem::take(&mut self.children);
                } else if self.children.len() > 1 {
                    let current = SearchExpression {
                        children: std::mem::take(&mut self.children),
                        connector: self.connector,
                        negated: self.negated,
                    };
                    children.push(SearchNode::Grouping(Box::new(SearchNode::Expression(current))));
                }
                match node {
                    SearchNode::Expression(exp)
                        if !exp.negated && (exp.connector == connector || exp.len() == 1) =>
                    {
                        children.extend(exp.children);
                    }
                    other => children.push(SearchNode::Grouping(Box::new(other))),
                }
                self.connector = connector;
                self.children = children;
            }
            _ => match node {
                SearchNode::Expression(exp)
                    if !exp.negated && (exp.connector == self.connector || exp.len() == 1) =>
                {
                    self.children.extend(exp.children);
                }
                SearchNode::Expression(exp) if !exp.negated => {
                    self.children
                        .push(SearchNode::Grouping(Box::new(SearchNode::Expression(exp))));
                }
                other => self.children.push(other),
            },
        }
        self
    }

    pub fn term(self, value: impl Into<String>) -> Self {
        self.push(SearchNode::Term(value.into()), None)
    }

    pub fn and(self, other: SearchExpression) -> Self {
        self.push(SearchNode::Expression(other), Some(SearchConnector::And))
    }

    pub fn or(self, other: SearchExpression) -> Self {
        self.push(SearchNode::Expression(other), Some(SearchConnector::Or))
    }

    /// Append the negation of an expression under the current connector
    pub fn not(self, other: SearchExpression) -> Self {
        let connector = self.connector;
        let negated = SearchExpression {
            negated: true,
            ..other
        };
        self.push(SearchNode::Expression(negated), Some(connector))
    }
}

impl Renderable for SearchExpression {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let content = self
            .children
            .iter()
            .map(|n| n.render(ctx))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", self.connector.as_str()));
        match (self.negated, self.children.len()) {
            (false, _) => content,
            (true, 1) => format!("NOT {}", content),
            (true, _) => format!("NOT ({})", content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e() -> SearchExpression {
        SearchExpression::new()
    }

    #[test]
    fn test_same_connector_flattens() {
        let exp = e().term("A").and(e().term("B").and(e().term("C")));
        assert_eq!(exp.to_query(), "A AND B AND C");
    }

    #[test]
    fn test_connector_change_groups_current() {
        let exp = e().term("A").term("B").or(e().term("C"));
        assert_eq!(exp.to_query(), "(A AND B) OR C");
    }

    #[test]
    fn test_not_term() {
        let exp = e().term("mountain").not(e().term("bike"));
        assert_eq!(exp.to_query(), "mountain AND NOT bike");
    }

    #[test]
    fn test_not_group() {
        let exp = e().term("a").not(e().term("b").or(e().term("c")));
        assert_eq!(exp.to_query(), "a AND NOT (b OR c)");
    }

    #[test]
    fn test_phrases_are_quoted() {
        assert_eq!(e().term("blue green").to_query(), "\"blue green\"");
    }
}
