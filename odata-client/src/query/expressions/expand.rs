//! `$expand` expressions with nested options

use super::filter::FilterExpression;
use super::orderby::OrderByExpression;
use super::search::SearchExpression;
use super::select::SelectExpression;
use super::syntax::{Field, Renderable};
use crate::literal::RenderContext;

/// One expanded navigation property and its nested options
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandField {
    field: Field,
    select: Option<SelectExpression>,
    filter: Option<FilterExpression>,
    search: Option<SearchExpression>,
    orderby: Option<OrderByExpression>,
    expand: Option<ExpandExpression>,
    top: Option<u64>,
    skip: Option<u64>,
    levels: Option<String>,
    count: bool,
}

impl ExpandField {
    pub fn new(field: impl Into<Field>) -> Self {
        Self {
            field: field.into(),
            select: None,
            filter: None,
            search: None,
            orderby: None,
            expand: None,
            top: None,
            skip: None,
            levels: None,
            count: false,
        }
    }

    pub fn select<F>(mut self, builder: F) -> Self
    where
        F: FnOnce(SelectExpression) -> SelectExpression,
    {
        self.select = Some(SelectExpression::build(self.select.take(), builder));
        self
    }

    pub fn filter<F>(mut self, builder: F) -> Self
    where
        F: FnOnce(FilterExpression) -> FilterExpression,
    {
        self.filter = Some(builder(self.filter.take().unwrap_or_default()));
        self
    }

    pub fn search<F>(mut self, builder: F) -> Self
    where
        F: FnOnce(SearchExpression) -> SearchExpression,
    {
        self.search = Some(SearchExpression::build(self.search.take(), builder));
        self
    }

    pub fn orderby<F>(mut self, builder: F) -> Self
    where
        F: FnOnce(OrderByExpression) -> OrderByExpression,
    {
        self.orderby = Some(OrderByExpression::build(self.orderby.take(), builder));
        self
    }

    pub fn expand<F>(mut self, builder: F) -> Self
    where
        F: FnOnce(ExpandExpression) -> ExpandExpression,
    {
        self.expand = Some(ExpandExpression::build(self.expand.take(), builder));
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// `$levels=n` or `$levels=max`
    pub fn levels(mut self, levels: impl Into<String>) -> Self {
        self.levels = Some(levels.into());
        self
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }
}

impl Renderable for ExpandField {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let mut options = Vec::new();
        if let Some(select) = self.select.as_ref().filter(|s| !s.is_empty()) {
            options.push(format!("$select={}", select.render(ctx)));
        }
        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            options.push(format!("$filter={}", filter.render(ctx)));
        }
        if let Some(search) = self.search.as_ref().filter(|s| !s.is_empty()) {
            options.push(format!("$search={}", search.render(ctx)));
        }
        if let Some(orderby) = self.orderby.as_ref().filter(|o| !o.is_empty()) {
            options.push(format!("$orderby={}", orderby.render(ctx)));
        }
        if let Some(top) = self.top {
            options.push(format!("$top={}", top));
        }
        if let Some(skip) = self.skip {
            options.push(format!("$skip={}", skip));
        }
        if let Some(levels) = &self.levels {
            options.push(format!("$levels={}", levels));
        }
        if self.count {
            options.push("$count=true".to_string());
        }
        if let Some(expand) = self.expand.as_ref().filter(|e| !e.is_empty()) {
            options.push(format!("$expand={}", expand.render(ctx)));
        }
        let field = self.field.render(ctx);
        if options.is_empty() {
            field
        } else {
            format!("{}({})", field, options.join(";"))
        }
    }
}

/// Comma-joined list of expanded navigation properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandExpression {
    children: Vec<ExpandField>,
}

impl ExpandExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<F>(current: Option<ExpandExpression>, builder: F) -> Self
    where
        F: FnOnce(ExpandExpression) -> ExpandExpression,
    {
        builder(current.unwrap_or_default())
    }

    /// Expand a navigation property, configuring its nested options
    pub fn field<F>(mut self, field: impl Into<Field>, builder: F) -> Self
    where
        F: FnOnce(ExpandField) -> ExpandField,
    {
        self.children.push(builder(ExpandField::new(field)));
        self
    }

    /// Expand a navigation property without nested options
    pub fn plain(self, field: impl Into<Field>) -> Self {
        self.field(field, |f| f)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Renderable for ExpandExpression {
    fn render(&self, ctx: &mut RenderContext) -> String {
        self.children
            .iter()
            .map(|c| c.render(ctx))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_expand() {
        let exp = ExpandExpression::new().plain("Friends").plain("Trips");
        assert_eq!(exp.to_query(), "Friends,Trips");
    }

    #[test]
    fn test_nested_options() {
        let exp = ExpandExpression::new().field("Trips", |t| {
            t.select(|s| s.field("Name").field("Budget"))
                .filter(|e| e.gt("Budget", 1000))
                .top(2)
                .expand(|e| e.plain("PlanItems"))
        });
        assert_eq!(
            exp.to_query(),
            "Trips($select=Name,Budget;$filter=Budget gt 1000;$top=2;$expand=PlanItems)"
        );
    }
}
