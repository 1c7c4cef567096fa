//! Resource path model

pub mod key;
pub mod segments;

pub use key::{EntityKey, is_guid};
pub use segments::{PathSegments, Segment, SegmentHandle, SegmentKind};
