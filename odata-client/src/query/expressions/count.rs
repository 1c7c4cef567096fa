//! `Field/$count(...)` operands

use super::filter::FilterExpression;
use super::search::SearchExpression;
use super::syntax::{Field, Renderable};
use crate::literal::RenderContext;

/// Count of a collection-valued field, optionally filtered
#[derive(Debug, Clone, PartialEq)]
pub struct CountField {
    field: Field,
    filter: Option<FilterExpression>,
    search: Option<SearchExpression>,
}

impl CountField {
    pub fn new(field: impl Into<Field>) -> Self {
        Self {
            field: field.into(),
            filter: None,
            search: None,
        }
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
}

impl Renderable for CountField {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let mut params = Vec::new();
        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            params.push(format!("$filter={}", filter.render(ctx)));
        }
        if let Some(search) = self.search.as_ref().filter(|s| !s.is_empty()) {
            params.push(format!("$search={}", search.render(ctx)));
        }
        let count = format!("{}/$count", self.field.render(ctx));
        if params.is_empty() {
            count
        } else {
            format!("{}({})", count, params.join(";"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_field_in_filter() {
        let exp = FilterExpression::new().gt(CountField::new("Friends"), 2);
        assert_eq!(exp.to_query(), "Friends/$count gt 2");
    }

    #[test]
    fn test_count_field_with_nested_filter() {
        let count = CountField::new("Trips").filter(|e| e.gt("Budget", 100));
        assert_eq!(count.to_query(), "Trips/$count($filter=Budget gt 100)");
    }
}
