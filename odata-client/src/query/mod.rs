//! Query options and the expression engine
//!
//! Follows the same split as the resources: [`QueryOptions`] holds the
//! values, [`OptionHandle`] edits one of them, and the `expressions`
//! module builds typed trees that render to URL syntax.

pub mod expressions;
pub mod handler;
pub mod names;
pub mod options;
pub mod params;
pub mod structured;

pub use expressions::{
    ComputeExpression, CountField, ExpandExpression, ExpandField, Expression, Field, FieldProxy,
    FilterConnector, FilterExpression, Node, Order, OrderByExpression, Renderable,
    SearchConnector, SearchExpression, SelectExpression,
};
pub use handler::OptionHandle;
pub use names::QueryOptionName;
pub use options::{OptionValue, QueryOptions};
pub use params::Params;
