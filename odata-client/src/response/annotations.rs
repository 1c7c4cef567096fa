//! Instance annotations carried by OData payloads

use crate::constants::*;
use crate::query::Params;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Whether a payload key is an annotation (`@odata.x` or `Field@odata.x`)
pub fn is_annotation(key: &str) -> bool {
    key.contains('@') || key == V2_METADATA
}

/// Split a payload object into plain data and annotation keys
pub fn split_annotations(map: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut data = Map::new();
    let mut annots = Map::new();
    for (key, value) in map {
        if is_annotation(key) {
            annots.insert(key.clone(), value.clone());
        } else {
            data.insert(key.clone(), value.clone());
        }
    }
    (data, annots)
}

fn string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Count as a number, or as the string V2 services send
fn parse_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Entity set named by an `@odata.context` URL (`$metadata#People/$entity`)
pub fn context_entity_set(context: &str) -> Option<String> {
    let fragment = context.split_once('#')?.1;
    let name = fragment
        .split(['/', '('])
        .next()
        .filter(|n| !n.is_empty() && !n.starts_with("Collection"))?;
    Some(name.to_string())
}

/// Annotations on a single entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAnnotations {
    pub context: Option<String>,
    pub type_name: Option<String>,
    pub etag: Option<String>,
    pub id: Option<String>,
    pub read_link: Option<String>,
    pub edit_link: Option<String>,
    pub media_read_link: Option<String>,
    pub media_edit_link: Option<String>,
    pub media_content_type: Option<String>,
    pub media_etag: Option<String>,
    /// `Field@odata.x` annotations grouped by field
    pub fields: BTreeMap<String, Map<String, Value>>,
}

impl EntityAnnotations {
    /// Read annotations from the annotation part of an entity payload
    pub fn from_map(annots: &Map<String, Value>) -> Self {
        let mut result = Self {
            context: string(annots, ODATA_CONTEXT),
            type_name: string(annots, ODATA_TYPE).map(|t| t.trim_start_matches('#').to_string()),
            etag: string(annots, ODATA_ETAG),
            id: string(annots, ODATA_ID),
            read_link: string(annots, ODATA_READLINK),
            edit_link: string(annots, ODATA_EDITLINK),
            media_read_link: string(annots, ODATA_MEDIA_READLINK),
            media_edit_link: string(annots, ODATA_MEDIA_EDITLINK),
            media_content_type: string(annots, ODATA_MEDIA_CONTENTTYPE),
            media_etag: string(annots, ODATA_MEDIA_ETAG),
            fields: BTreeMap::new(),
        };
        if let Some(Value::Object(meta)) = annots.get(V2_METADATA) {
            result.type_name = result.type_name.or_else(|| string(meta, "type"));
            result.etag = result.etag.or_else(|| string(meta, "etag"));
            result.id = result.id.or_else(|| string(meta, "uri"));
        }
        for (key, value) in annots {
            if let Some((field, annotation)) = key.split_once('@')
                && !field.is_empty()
            {
                result
                    .fields
                    .entry(field.to_string())
                    .or_default()
                    .insert(format!("@{}", annotation), value.clone());
            }
        }
        result
    }

    pub fn entity_set(&self) -> Option<String> {
        self.context.as_deref().and_then(context_entity_set)
    }

    /// Annotations of one field, keyed `@odata.x`
    pub fn field(&self, name: &str) -> Option<&Map<String, Value>> {
        self.fields.get(name)
    }

    /// Write the annotations back in wire form
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let pairs = [
            (ODATA_CONTEXT, &self.context),
            (ODATA_ETAG, &self.etag),
            (ODATA_ID, &self.id),
            (ODATA_READLINK, &self.read_link),
            (ODATA_EDITLINK, &self.edit_link),
            (ODATA_MEDIA_READLINK, &self.media_read_link),
            (ODATA_MEDIA_EDITLINK, &self.media_edit_link),
            (ODATA_MEDIA_CONTENTTYPE, &self.media_content_type),
            (ODATA_MEDIA_ETAG, &self.media_etag),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(type_name) = &self.type_name {
            map.insert(
                ODATA_TYPE.to_string(),
                Value::String(format!("#{}", type_name)),
            );
        }
        for (field, annots) in &self.fields {
            for (key, value) in annots {
                map.insert(format!("{}{}", field, key), value.clone());
            }
        }
        map
    }
}

/// Annotations on a collection payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionAnnotations {
    pub context: Option<String>,
    pub count: Option<u64>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
}

impl CollectionAnnotations {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let count = map
            .get(ODATA_COUNT)
            .or_else(|| map.get(V2_COUNT))
            .and_then(parse_count);
        Self {
            context: string(map, ODATA_CONTEXT),
            count,
            next_link: string(map, ODATA_NEXTLINK).or_else(|| string(map, V2_NEXT)),
            delta_link: string(map, ODATA_DELTALINK),
        }
    }

    fn next_params(&self) -> Option<Params> {
        let link = self.next_link.as_deref()?;
        let query = link.split_once('?').map(|(_, q)| q).unwrap_or_default();
        Some(Params::parse(query))
    }

    /// `$skip` announced by the next link
    pub fn skip(&self) -> Option<u64> {
        self.next_params()?.get(SKIP)?.parse().ok()
    }

    /// `$skiptoken` announced by the next link
    pub fn skiptoken(&self) -> Option<String> {
        self.next_params()?.get(SKIPTOKEN).map(str::to_string)
    }

    pub fn has_more(&self) -> bool {
        self.skip().is_some() || self.skiptoken().is_some()
    }

    pub fn entity_set(&self) -> Option<String> {
        self.context.as_deref().and_then(context_entity_set)
    }
}
