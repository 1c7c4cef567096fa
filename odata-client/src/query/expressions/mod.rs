//! Typed expression builders rendering to OData syntax

pub mod compute;
pub mod count;
pub mod expand;
pub mod filter;
pub mod orderby;
pub mod search;
pub mod select;
pub mod syntax;

pub use compute::ComputeExpression;
pub use count::CountField;
pub use expand::{ExpandExpression, ExpandField};
pub use filter::{FilterConnector, FilterExpression};
pub use orderby::{Order, OrderByExpression};
pub use search::{SearchConnector, SearchExpression};
pub use select::SelectExpression;
pub use syntax::{Field, FieldProxy, Function, Lambda, Node, Operator, Renderable};

/// Expression stored as the value of a query option
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Filter(FilterExpression),
    OrderBy(OrderByExpression),
    Search(SearchExpression),
    Compute(ComputeExpression),
    Select(SelectExpression),
    Expand(ExpandExpression),
}

impl Expression {
    pub fn is_empty(&self) -> bool {
        match self {
            Expression::Filter(e) => e.is_empty(),
            Expression::OrderBy(e) => e.is_empty(),
            Expression::Search(e) => e.is_empty(),
            Expression::Compute(e) => e.is_empty(),
            Expression::Select(e) => e.is_empty(),
            Expression::Expand(e) => e.is_empty(),
        }
    }
}

impl Renderable for Expression {
    fn render(&self, ctx: &mut crate::literal::RenderContext) -> String {
        match self {
            Expression::Filter(e) => e.render(ctx),
            Expression::OrderBy(e) => e.render(ctx),
            Expression::Search(e) => e.render(ctx),
            Expression::Compute(e) => e.render(ctx),
            Expression::Select(e) => e.render(ctx),
            Expression::Expand(e) => e.render(ctx),
        }
    }
}
