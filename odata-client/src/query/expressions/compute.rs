//! `$compute` expressions

use super::syntax::{Node, Renderable};
use crate::literal::RenderContext;

/// Computed properties, each rendered as `expression as Name`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputeExpression {
    children: Vec<(Node, String)>,
}

impl ComputeExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<F>(current: Option<ComputeExpression>, builder: F) -> Self
    where
        F: FnOnce(ComputeExpression) -> ComputeExpression,
    {
        builder(current.unwrap_or_default())
    }

    pub fn field(mut self, expression: impl Into<Node>, name: impl Into<String>) -> Self {
        self.children.push((expression.into(), name.into()));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(_, n)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Renderable for ComputeExpression {
    fn render(&self, ctx: &mut RenderContext) -> String {
        self.children
            .iter()
            .map(|(node, name)| format!("{} as {}", node.render(ctx), name))
            .collect::<Vec<_>>()
            .join(",")
    }
}
