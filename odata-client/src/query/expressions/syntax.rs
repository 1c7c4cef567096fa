//! Expression nodes and the operator/function catalogs
//!
//! Operands are [`Node`]s. A plain string in operand position is a field
//! name when it is the left side of an operator or the first argument of a
//! function, and a quoted literal anywhere else. Literals pass through
//! [`normalize`] unless normalization is switched off for that node.

use super::filter::FilterExpression;
use super::count::CountField;
use crate::literal::{Literal, RenderContext, normalize};

/// Anything that renders to OData syntax
pub trait Renderable {
    fn render(&self, ctx: &mut RenderContext) -> String;

    /// Render with a fresh context
    fn to_query(&self) -> String {
        self.render(&mut RenderContext::new())
    }
}

/// A node of an expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Field(Field),
    Function(Function),
    Operator(Operator),
    Grouping(Box<Node>),
    Lambda(Lambda),
    Literal(Literal),
    Filter(Box<FilterExpression>),
    Count(Box<CountField>),
}

impl Node {
    /// Render as an operand, quoting literals when `normalize` is set
    pub(crate) fn render_operand(
        &self,
        ctx: &mut RenderContext,
        normalize_literal: bool,
    ) -> String {
        match self {
            Node::Literal(lit) if normalize_literal => normalize(lit, ctx),
            Node::Literal(Literal::String(name)) => with_prefix(name, ctx),
            Node::Literal(lit) => normalize(lit, ctx),
            other => other.render(ctx),
        }
    }
}

impl Renderable for Node {
    fn render(&self, ctx: &mut RenderContext) -> String {
        match self {
            Node::Field(f) => f.render(ctx),
            Node::Function(f) => f.render(ctx),
            Node::Operator(o) => o.render(ctx),
            Node::Grouping(inner) => match inner.as_ref() {
                Node::Grouping(_) => inner.render(ctx),
                other => format!("({})", other.render(ctx)),
            },
            Node::Lambda(l) => l.render(ctx),
            Node::Literal(lit) => self.render_operand(ctx, !matches!(lit, Literal::String(_))),
            Node::Filter(f) => f.render(ctx),
            Node::Count(c) => c.render(ctx),
        }
    }
}

fn with_prefix(name: &str, ctx: &RenderContext) -> String {
    match &ctx.prefix {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    }
}

/// A path to a (possibly nested) field, e.g. `Address/City`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    names: Vec<String>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
        }
    }

    /// Descend into a child field
    pub fn dot(&self, child: impl Into<String>) -> Self {
        let mut names = self.names.clone();
        names.push(child.into());
        Self { names }
    }

    pub fn path(&self) -> String {
        self.names.join("/")
    }

    pub fn last(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or_default()
    }
}

impl Renderable for Field {
    fn render(&self, ctx: &mut RenderContext) -> String {
        with_prefix(&self.path(), ctx)
    }
}

/// Typed field paths of a structured type, handed to expression builders
#[derive(Debug, Clone, Default)]
pub struct FieldProxy {
    names: Vec<String>,
}

impl FieldProxy {
    /// Proxy for a set of declared field names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Field path for a name; undeclared names are accepted as-is
    pub fn get(&self, name: &str) -> Field {
        Field::new(name)
    }

    /// Field path only if the name is declared
    pub fn try_get(&self, name: &str) -> Option<Field> {
        self.names
            .iter()
            .any(|n| n == name)
            .then(|| Field::new(name))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Function call `name(arg, ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    args: Vec<Node>,
    normalize: bool,
}

impl Function {
    pub fn new(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            args,
            normalize: true,
        }
    }

    /// Render literal arguments verbatim
    pub fn raw(mut self) -> Self {
        self.normalize = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Renderable for Function {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let params: Vec<String> = self
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| arg.render_operand(ctx, i > 0 && self.normalize))
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Right side of a binary operator
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Box<Node>),
    List(Vec<Node>),
}

/// Binary `left op right` or unary `op(value)` operator
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    op: String,
    left: Box<Node>,
    right: Option<Operand>,
    normalize: bool,
}

impl Operator {
    pub fn binary(op: impl Into<String>, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        Self {
            op: op.into(),
            left: Box::new(left.into()),
            right: Some(Operand::Single(Box::new(right.into()))),
            normalize: true,
        }
    }

    pub fn list<I, N>(op: impl Into<String>, left: impl Into<Node>, right: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        Self {
            op: op.into(),
            left: Box::new(left.into()),
            right: Some(Operand::List(right.into_iter().map(Into::into).collect())),
            normalize: true,
        }
    }

    pub fn unary(op: impl Into<String>, value: impl Into<Node>) -> Self {
        Self {
            op: op.into(),
            left: Box::new(value.into()),
            right: None,
            normalize: true,
        }
    }

    /// Render the right side verbatim
    pub fn raw(mut self) -> Self {
        self.normalize = false;
        self
    }

    pub fn op(&self) -> &str {
        &self.op
    }
}

impl Renderable for Operator {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let left = self.left.render_operand(ctx, false);
        match &self.right {
            Some(Operand::Single(right)) => {
                let right = right.render_operand(ctx, self.normalize);
                format!("{} {} {}", left, self.op, right)
            }
            Some(Operand::List(items)) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|i| i.render_operand(ctx, self.normalize))
                    .collect();
                format!("{} {} ({})", left, self.op, items.join(","))
            }
            None => format!("{}({})", self.op, left),
        }
    }
}

/// `Collection/any(alias:predicate)` or `all`
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    op: String,
    field: Box<Node>,
    predicate: Box<Node>,
}

impl Lambda {
    pub fn new(op: impl Into<String>, field: impl Into<Node>, predicate: impl Into<Node>) -> Self {
        Self {
            op: op.into(),
            field: Box::new(field.into()),
            predicate: Box::new(predicate.into()),
        }
    }
}

impl Renderable for Lambda {
    fn render(&self, ctx: &mut RenderContext) -> String {
        let left = self.field.render_operand(ctx, false);
        let alias = left.rsplit('/').next().unwrap_or_default().to_lowercase();
        let mut inner = RenderContext::with_escape(ctx.escape).with_prefix(alias.clone());
        let predicate = self.predicate.render(&mut inner);
        for a in inner.aliases() {
            ctx.register_alias(a);
        }
        format!("{}/{}({}:{})", left, self.op, alias, predicate)
    }
}

impl From<Field> for Node {
    fn from(value: Field) -> Self {
        Node::Field(value)
    }
}

impl From<&Field> for Node {
    fn from(value: &Field) -> Self {
        Node::Field(value.clone())
    }
}

impl From<Function> for Node {
    fn from(value: Function) -> Self {
        Node::Function(value)
    }
}

impl From<Operator> for Node {
    fn from(value: Operator) -> Self {
        Node::Operator(value)
    }
}

impl From<Lambda> for Node {
    fn from(value: Lambda) -> Self {
        Node::Lambda(value)
    }
}

impl From<FilterExpression> for Node {
    fn from(value: FilterExpression) -> Self {
        Node::Filter(Box::new(value))
    }
}

impl From<CountField> for Node {
    fn from(value: CountField) -> Self {
        Node::Count(Box::new(value))
    }
}

impl<T: Into<Literal>> From<T> for Node {
    fn from(value: T) -> Self {
        Node::Literal(value.into())
    }
}

// String and collection functions

pub fn concat(left: impl Into<Node>, right: impl Into<Node>) -> Function {
    Function::new("concat", vec![left.into(), right.into()])
}

pub fn contains(field: impl Into<Node>, value: impl Into<Node>) -> Function {
    Function::new("contains", vec![field.into(), value.into()])
}

pub fn ends_with(field: impl Into<Node>, value: impl Into<Node>) -> Function {
    Function::new("endswith", vec![field.into(), value.into()])
}

pub fn index_of(field: impl Into<Node>, value: impl Into<Node>) -> Function {
    Function::new("indexof", vec![field.into(), value.into()])
}

pub fn length(field: impl Into<Node>) -> Function {
    Function::new("length", vec![field.into()])
}

pub fn starts_with(field: impl Into<Node>, value: impl Into<Node>) -> Function {
    Function::new("startswith", vec![field.into(), value.into()])
}

pub fn substring(field: impl Into<Node>, start: i64, length: Option<i64>) -> Function {
    let mut args = vec![field.into(), start.into()];
    if let Some(length) = length {
        args.push(length.into());
    }
    Function::new("substring", args)
}

pub fn matches_pattern(field: impl Into<Node>, pattern: impl Into<Node>) -> Function {
    Function::new("matchesPattern", vec![field.into(), pattern.into()])
}

pub fn to_lower(field: impl Into<Node>) -> Function {
    Function::new("tolower", vec![field.into()])
}

pub fn to_upper(field: impl Into<Node>) -> Function {
    Function::new("toupper", vec![field.into()])
}

pub fn trim(field: impl Into<Node>) -> Function {
    Function::new("trim", vec![field.into()])
}

pub fn has_subset(field: impl Into<Node>, values: impl Into<Node>) -> Function {
    Function::new("hassubset", vec![field.into(), values.into()])
}

pub fn has_subsequence(field: impl Into<Node>, values: impl Into<Node>) -> Function {
    Function::new("hassubsequence", vec![field.into(), values.into()])
}

// Date and time functions

fn unary_fn(name: &str, value: impl Into<Node>) -> Function {
    Function::new(name, vec![value.into()])
}

pub fn date(value: impl Into<Node>) -> Function {
    unary_fn("date", value)
}

pub fn day(value: impl Into<Node>) -> Function {
    unary_fn("day", value)
}

pub fn fractional_seconds(value: impl Into<Node>) -> Function {
    unary_fn("fractionalseconds", value)
}

pub fn hour(value: impl Into<Node>) -> Function {
    unary_fn("hour", value)
}

pub fn max_date_time(value: impl Into<Node>) -> Function {
    unary_fn("maxdatetime", value)
}

pub fn min_date_time(value: impl Into<Node>) -> Function {
    unary_fn("mindatetime", value)
}

pub fn minute(value: impl Into<Node>) -> Function {
    unary_fn("minute", value)
}

pub fn month(value: impl Into<Node>) -> Function {
    unary_fn("month", value)
}

pub fn now() -> Function {
    Function::new("now", Vec::new())
}

pub fn second(value: impl Into<Node>) -> Function {
    unary_fn("second", value)
}

pub fn time(value: impl Into<Node>) -> Function {
    unary_fn("time", value)
}

pub fn total_offset_minutes(value: impl Into<Node>) -> Function {
    unary_fn("totaloffsetminutes", value)
}

pub fn total_seconds(value: impl Into<Node>) -> Function {
    unary_fn("totalseconds", value)
}

pub fn year(value: impl Into<Node>) -> Function {
    unary_fn("year", value)
}

// Arithmetic functions

pub fn ceiling(value: impl Into<Node>) -> Function {
    unary_fn("ceiling", value)
}

pub fn floor(value: impl Into<Node>) -> Function {
    unary_fn("floor", value)
}

pub fn round(value: impl Into<Node>) -> Function {
    unary_fn("round", value)
}

// Type functions: the type name renders verbatim

pub fn cast(value: impl Into<Node>, type_name: &str) -> Function {
    Function::new(
        "cast",
        vec![value.into(), Literal::Raw(type_name.to_string()).into()],
    )
}

pub fn isof(value: impl Into<Node>, type_name: &str) -> Function {
    Function::new(
        "isof",
        vec![value.into(), Literal::Raw(type_name.to_string()).into()],
    )
}

// Geo functions: points and polygons are passed as raw geography literals

pub fn geo_distance(value: impl Into<Node>, point: &str) -> Function {
    Function::new(
        "geo.distance",
        vec![value.into(), Literal::Raw(point.to_string()).into()],
    )
}

pub fn geo_intersects(value: impl Into<Node>, polygon: &str) -> Function {
    Function::new(
        "geo.intersects",
        vec![value.into(), Literal::Raw(polygon.to_string()).into()],
    )
}

pub fn geo_length(line: impl Into<Node>) -> Function {
    unary_fn("geo.length", line)
}

// Conditional

pub fn case(condition: impl Into<Node>, value: impl Into<Node>) -> Function {
    Function::new("case", vec![condition.into(), value.into()])
}

// Logical operators

pub fn eq(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("eq", left, right)
}

pub fn ne(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("ne", left, right)
}

pub fn gt(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("gt", left, right)
}

pub fn ge(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("ge", left, right)
}

pub fn lt(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("lt", left, right)
}

pub fn le(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("le", left, right)
}

pub fn not(value: impl Into<Node>) -> Operator {
    Operator::unary("not", value)
}

/// `has`; enum flags are usually passed as `raw("NS.Color'Red'")`
pub fn has(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("has", left, right)
}

pub fn in_<I, N>(left: impl Into<Node>, values: I) -> Operator
where
    I: IntoIterator<Item = N>,
    N: Into<Node>,
{
    Operator::list("in", left, values)
}

// Arithmetic operators

pub fn add(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("add", left, right)
}

pub fn sub(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("sub", left, right)
}

pub fn mul(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("mul", left, right)
}

pub fn div(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("div", left, right)
}

pub fn modulo(left: impl Into<Node>, right: impl Into<Node>) -> Operator {
    Operator::binary("mod", left, right)
}

pub fn neg(value: impl Into<Node>) -> Operator {
    Operator::unary("-", value)
}

// Grouping and lambdas

pub fn grouping(value: impl Into<Node>) -> Node {
    Node::Grouping(Box::new(value.into()))
}

pub fn any(field: impl Into<Node>, predicate: impl Into<Node>) -> Lambda {
    Lambda::new("any", field, predicate)
}

pub fn all(field: impl Into<Node>, predicate: impl Into<Node>) -> Lambda {
    Lambda::new("all", field, predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{alias, raw};

    fn r(node: impl Into<Node>) -> String {
        node.into().to_query()
    }

    #[test]
    fn test_operators_quote_right_side_only() {
        assert_eq!(r(eq("Name", "Scott")), "Name eq 'Scott'");
        assert_eq!(r(gt(Field::new("Age"), 3)), "Age gt 3");
        assert_eq!(r(eq("Name", "x").raw()), "Name eq x");
    }

    #[test]
    fn test_unary_and_list_operators() {
        assert_eq!(r(not(contains("Name", "a"))), "not(contains(Name, 'a'))");
        assert_eq!(r(neg("Total")), "-(Total)");
        assert_eq!(r(in_("City", vec!["Sea", "Lon"])), "City in ('Sea','Lon')");
    }

    #[test]
    fn test_functions() {
        assert_eq!(r(to_lower("Name")), "tolower(Name)");
        assert_eq!(r(substring("Name", 1, Some(2))), "substring(Name, 1, 2)");
        assert_eq!(r(eq(length("Name"), 5)), "length(Name) eq 5");
        assert_eq!(r(now()), "now()");
        assert_eq!(
            r(isof("Friend", "Trip.Employee")),
            "isof(Friend, Trip.Employee)"
        );
        assert_eq!(
            r(lt(geo_distance("Location", "geography'POINT(-122 47)'"), 900)),
            "geo.distance(Location, geography'POINT(-122 47)') lt 900"
        );
        assert_eq!(
            r(eq(ceiling(div("Price", 2)), 5)),
            "ceiling(Price div 2) eq 5"
        );
    }

    #[test]
    fn test_nested_fields_and_grouping() {
        let city = Field::new("Address").dot("City");
        assert_eq!(r(eq(&city, "Lyon")), "Address/City eq 'Lyon'");
        assert_eq!(r(grouping(grouping(eq("A", 1)))), "(A eq 1)");
        assert_eq!(
            r(has("Color", raw("NS.Color'Red'"))),
            "Color has NS.Color'Red'"
        );
    }

    #[test]
    fn test_lambda_alias_from_last_segment() {
        let lambda = any(Field::new("Pets"), gt("Age", 3));
        assert_eq!(r(lambda), "Pets/any(pets:pets/Age gt 3)");
        let nested = all(Field::new("Person").dot("Trips"), eq("Budget", 10));
        assert_eq!(r(nested), "Person/Trips/all(trips:trips/Budget eq 10)");
    }

    #[test]
    fn test_alias_literal_collects_param() {
        let mut ctx = RenderContext::new();
        let rendered = eq("Name", alias("Scott", Some("n"))).render(&mut ctx);
        assert_eq!(rendered, "Name eq @n");
        assert_eq!(ctx.aliases()[0].name(), "n");
    }

    #[test]
    fn test_field_proxy() {
        let s = FieldProxy::new(["Name", "Age"]);
        assert!(s.try_get("Name").is_some());
        assert!(s.try_get("Nope").is_none());
        assert_eq!(s.get("Nope").path(), "Nope");
    }
}
