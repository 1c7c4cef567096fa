//! `$select` expressions

use super::syntax::{Field, Renderable};
use crate::literal::RenderContext;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectExpression {
    fields: Vec<Field>,
}

impl SelectExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<F>(current: Option<SelectExpression>, builder: F) -> Self
    where
        F: FnOnce(SelectExpression) -> SelectExpression,
    {
        builder(current.unwrap_or_default())
    }

    pub fn field(mut self, field: impl Into<Field>) -> Self {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Renderable for SelectExpression {
    fn render(&self, ctx: &mut RenderContext) -> String {
        self.fields
            .iter()
            .map(|f| f.render(ctx))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_dedupes_fields() {
        let exp = SelectExpression::new()
            .field("Name")
            .field(Field::new("Address").dot("City"))
            .field("Name");
        assert_eq!(exp.to_query(), "Name,Address/City");
    }
}
