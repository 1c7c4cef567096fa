//! `$orderby` expressions

use super::syntax::{Node, Renderable};
use crate::literal::RenderContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByField {
    field: Node,
    order: Order,
}

impl Renderable for OrderByField {
    fn render(&self, ctx: &mut RenderContext) -> String {
        format!(
            "{} {}",
            self.field.render_operand(ctx, false), self.order.as_str()
        )
    }
}

/// Flat list of sort keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderByExpression {
    children: Vec<OrderByField>,
}

impl OrderByExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<F>(current: Option<OrderByExpression>, builder: F) -> Self
    where
        F: FnOnce(OrderByExpression) -> OrderByExpression,
    {
        builder(current.unwrap_or_default())
    }

    pub fn ascending(mut self, field: impl Into<Node>) -> Self {
        self.children.push(OrderByField {
            field: field.into(),
            order: Order::Asc,
        });
        self
    }

    pub fn descending(mut self, field: impl Into<Node>) -> Self {
        self.children.push(OrderByField {
            field: field.into(),
            order: Order::Desc,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Renderable for OrderByExpression {
    fn render(&self, ctx: &mut RenderContext) -> String {
        self.children
            .iter()
            .map(|c| c.render(ctx))
            .collect::<Vec<_>>()
            .join(",")
    }
}
