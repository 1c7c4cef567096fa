//! Path segments of a resource URL

use super::key::EntityKey;
use crate::constants::{BATCH, COUNT, METADATA, REF, VALUE};
use crate::literal::{Literal, RenderContext, normalize};
use crate::query::Params;
use std::fmt;

/// Kind of a path component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    EntitySet,
    Singleton,
    Type,
    Property,
    NavigationProperty,
    Reference,
    Value,
    Count,
    Function,
    Action,
    Batch,
    Metadata,
}

impl SegmentKind {
    /// Segments that can address a single member by key
    pub fn is_keyable(&self) -> bool {
        matches!(
            self,
            SegmentKind::EntitySet | SegmentKind::NavigationProperty
        )
    }
}

/// One path component
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    kind: SegmentKind,
    name: String,
    type_name: Option<String>,
    key: Option<EntityKey>,
    parameters: Option<Vec<(String, Literal)>>,
}

impl Segment {
    pub fn new(kind: SegmentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            type_name: None,
            key: None,
            parameters: None,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn key(&self) -> Option<&EntityKey> {
        self.key.as_ref()
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn parameters(&self) -> Option<&[(String, Literal)]> {
        self.parameters.as_deref()
    }

    fn render(&self, ctx: &mut RenderContext, non_parenthesis: bool) -> String {
        match self.kind {
            SegmentKind::Function => match &self.parameters {
                Some(params) if !params.is_empty() => {
                    let args: Vec<String> = params
                        .iter()
                        .map(|(name, value)| format!("{}={}", name, normalize(value, ctx)))
                        .collect();
                    format!("{}({})", self.name, args.join(","))
                }
                _ if non_parenthesis => self.name.clone(),
                _ => format!("{}()", self.name),
            },
            _ => match &self.key {
                Some(key) => format!("{}({})", self.name, key.render(ctx)),
                None => self.name.clone(),
            },
        }
    }
}

/// Mutable view on a freshly added or looked-up segment
pub struct SegmentHandle<'a> {
    segment: &'a mut Segment,
}

impl<'a> SegmentHandle<'a> {
    pub fn name(&self) -> &str {
        &self.segment.name
    }

    pub fn set_type(self, type_name: impl Into<String>) -> Self {
        self.segment.type_name = Some(type_name.into());
        self
    }

    pub fn set_type_opt(self, type_name: Option<String>) -> Self {
        self.segment.type_name = type_name;
        self
    }

    pub fn set_key(self, key: impl Into<EntityKey>) -> Self {
        self.segment.key = Some(key.into());
        self
    }

    pub fn clear_key(self) -> Self {
        self.segment.key = None;
        self
    }

    pub fn set_parameters(self, params: Vec<(String, Literal)>) -> Self {
        self.segment.parameters = Some(params);
        self
    }

    pub fn set_name(self, name: impl Into<String>) -> Self {
        self.segment.name = name.into();
        self
    }

    pub fn get(&self) -> &Segment {
        self.segment
    }
}

/// Ordered sequence of segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathSegments {
    segments: Vec<Segment>,
}

impl PathSegments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment and return a handle to configure it
    pub fn add(&mut self, kind: SegmentKind, name: impl Into<String>) -> SegmentHandle<'_> {
        self.segments.push(Segment::new(kind, name));
        let last = self.segments.len() - 1;
        SegmentHandle {
            segment: &mut self.segments[last],
        }
    }

    /// Last segment of a kind
    pub fn get(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.iter().rev().find(|s| s.kind == kind)
    }

    /// Handle on the last segment of a kind
    pub fn get_mut(&mut self, kind: SegmentKind) -> Option<SegmentHandle<'_>> {
        self.segments
            .iter_mut()
            .rev()
            .find(|s| s.kind == kind)
            .map(|segment| SegmentHandle { segment })
    }

    pub fn has(&self, kind: SegmentKind) -> bool {
        self.segments.iter().any(|s| s.kind == kind)
    }

    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Handle on the last segment
    pub fn last_mut(&mut self) -> Option<SegmentHandle<'_>> {
        self.segments
            .last_mut()
            .map(|segment| SegmentHandle { segment })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Drop the trailing segment
    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    /// Type declared by the last typed segment
    pub fn type_name(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| s.type_name())
    }

    /// Keys of every keyable segment, in order
    pub fn keys(&self) -> Vec<Option<EntityKey>> {
        self.segments
            .iter()
            .filter(|s| s.kind.is_keyable())
            .map(|s| s.key.clone())
            .collect()
    }

    /// Replace keys of keyable segments in order; `None` clears a key
    pub fn set_keys(&mut self, keys: Vec<Option<EntityKey>>) {
        let mut keys = keys.into_iter();
        for segment in self.segments.iter_mut().filter(|s| s.kind.is_keyable()) {
            match keys.next() {
                Some(key) => segment.key = key,
                None => break,
            }
        }
    }

    /// Render the path and the parameters produced by aliases
    pub fn path_and_params(&self, escape: bool, non_parenthesis: bool) -> (String, Params) {
        let mut ctx = RenderContext::with_escape(escape);
        let path = self
            .segments
            .iter()
            .map(|s| s.render(&mut ctx, non_parenthesis))
            .collect::<Vec<_>>()
            .join("/");
        let params: Params = ctx.alias_params().into_iter().collect();
        (path, params)
    }
}

impl fmt::Display for PathSegments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, _) = self.path_and_params(false, false);
        f.write_str(&path)
    }
}

/// Well-known name of a fixed segment kind
pub fn fixed_segment_name(kind: SegmentKind) -> Option<&'static str> {
    match kind {
        SegmentKind::Reference => Some(REF),
        SegmentKind::Value => Some(VALUE),
        SegmentKind::Count => Some(COUNT),
        SegmentKind::Batch => Some(BATCH),
        SegmentKind::Metadata => Some(METADATA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::alias;

    fn people() -> PathSegments {
        let mut segments = PathSegments::new();
        segments
            .add(SegmentKind::EntitySet, "People")
            .set_type("Trip.Person");
        segments
    }

    #[test]
    fn test_entity_set_renders_bare_name() {
        let (path, params) = people().path_and_params(false, false);
        assert_eq!(path, "People");
        assert!(params.is_empty());
    }

    #[test]
    fn test_key_then_clear_returns_unkeyed_form() {
        let mut segments = people();
        segments
            .get_mut(SegmentKind::EntitySet)
            .unwrap()
            .set_key("russellwhyte");
        assert_eq!(segments.to_string(), "People('russellwhyte')");
        segments.set_keys(vec![None]);
        assert_eq!(segments.to_string(), "People");
    }

    #[test]
    fn test_keys_follow_keyable_segments() {
        let mut segments = people();
        segments
            .get_mut(SegmentKind::EntitySet)
            .unwrap()
            .set_key("a");
        segments.add(SegmentKind::NavigationProperty, "Friends");
        segments.add(SegmentKind::Property, "Name");
        assert_eq!(segments.keys(), vec![Some("a".into()), None]);
        segments.set_keys(vec![Some("b".into()), Some("c".into())]);
        assert_eq!(segments.to_string(), "People('b')/Friends('c')/Name");
    }

    #[test]
    fn test_function_parameters_and_parenthesis() {
        let mut segments = PathSegments::new();
        segments
            .add(SegmentKind::Function, "GetNearestAirport")
            .set_parameters(vec![
                ("lat".into(), 33.into()),
                ("lon".into(), (-118).into()),
            ]);
        assert_eq!(segments.to_string(), "GetNearestAirport(lat=33,lon=-118)");

        let mut empty = PathSegments::new();
        empty.add(SegmentKind::Function, "GetFavoriteAirline");
        assert_eq!(
            empty.path_and_params(false, false).0,
            "GetFavoriteAirline()"
        );
        assert_eq!(empty.path_and_params(false, true).0, "GetFavoriteAirline");
    }

    #[test]
    fn test_function_alias_parameters_go_to_params() {
        let mut segments = PathSegments::new();
        segments
            .add(SegmentKind::Function, "GetFriendsTrips")
            .set_parameters(vec![("userName".into(), alias("ronaldmundy", Some("u")))]);
        let (path, params) = segments.path_and_params(false, false);
        assert_eq!(path, "GetFriendsTrips(userName=@u)");
        assert_eq!(params.get("@u"), Some("'ronaldmundy'"));
    }

    #[test]
    fn test_type_name_from_last_typed_segment() {
        let mut segments = people();
        segments
            .add(SegmentKind::NavigationProperty, "Trips")
            .set_type("Trip.Trip");
        segments.add(SegmentKind::Count, COUNT);
        assert_eq!(segments.type_name(), Some("Trip.Trip"));
    }
}
