//! CSDL XML (`$metadata`) reader

use super::registry::{SchemaRegistry, SchemaRegistryBuilder};
use super::types::{CallableDef, EnumTypeDef, FieldDef, StructuredType};
use crate::error::{ODataError, ODataResult};
use roxmltree::{Document, Node};

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn required<'a>(node: Node<'a, '_>, attr: &str) -> ODataResult<&'a str> {
    node.attribute(attr).ok_or_else(|| {
        let tag = node.tag_name().name();
        ODataError::parse(format!("<{}> without {} attribute", tag, attr))
    })
}

fn property(node: Node<'_, '_>, navigation: bool) -> ODataResult<FieldDef> {
    let mut field = FieldDef::new(required(node, "Name")?, required(node, "Type")?);
    field.navigation = navigation;
    if node.attribute("Nullable") == Some("false") {
        field.nullable = false;
    }
    field.max_length = node.attribute("MaxLength").and_then(|m| m.parse().ok());
    field.default = node
        .attribute("DefaultValue")
        .map(|d| serde_json::Value::String(d.to_string()));
    Ok(field)
}

fn structured(node: Node<'_, '_>, namespace: &str, complex: bool) -> ODataResult<StructuredType> {
    let name = required(node, "Name")?;
    let mut ty = if complex {
        StructuredType::complex(namespace, name)
    } else {
        StructuredType::entity(namespace, name)
    };
    ty.base = node.attribute("BaseType").map(str::to_string);
    ty.open = node.attribute("OpenType") == Some("true");
    for key in children(node, "Key") {
        for prop_ref in children(key, "PropertyRef") {
            ty.keys.push(required(prop_ref, "Name")?.to_string());
        }
    }
    for prop in children(node, "Property") {
        ty.fields.push(property(prop, false)?);
    }
    for nav in children(node, "NavigationProperty") {
        ty.fields.push(property(nav, true)?);
    }
    Ok(ty)
}

fn enum_type(node: Node<'_, '_>, namespace: &str) -> ODataResult<EnumTypeDef> {
    let mut def = EnumTypeDef::new(namespace, required(node, "Name")?);
    def.flags = node.attribute("IsFlags") == Some("true");
    for (index, member) in children(node, "Member").enumerate() {
        let value = match member.attribute("Value") {
            Some(v) => v
                .parse()
                .map_err(|_| ODataError::parse(format!("invalid enum member value {}", v)))?,
            None => index as i64,
        };
        let name = required(member, "Name")?.to_string();
        def.members.push((name, value));
    }
    Ok(def)
}

fn callable(node: Node<'_, '_>, namespace: &str, action: bool) -> ODataResult<CallableDef> {
    let name = required(node, "Name")?;
    let mut def = if action {
        CallableDef::action(namespace, name)
    } else {
        CallableDef::function(namespace, name)
    };
    def.bound = node.attribute("IsBound") == Some("true");
    def.entity_set_path = node.attribute("EntitySetPath").map(str::to_string);
    for param in children(node, "Parameter") {
        def.parameters.push(property(param, false)?);
    }
    if let Some(ret) = children(node, "ReturnType").next() {
        def = def.returns(required(ret, "Type")?);
    }
    Ok(def)
}

fn container(
    node: Node<'_, '_>,
    mut builder: SchemaRegistryBuilder,
) -> ODataResult<SchemaRegistryBuilder> {
    for set in children(node, "EntitySet") {
        builder = builder.entity_set(required(set, "Name")?, required(set, "EntityType")?);
    }
    for singleton in children(node, "Singleton") {
        builder = builder.singleton(required(singleton, "Name")?, required(singleton, "Type")?);
    }
    Ok(builder)
}

/// Parse a `$metadata` document into a schema registry
pub fn parse_metadata(xml: &str) -> ODataResult<SchemaRegistry> {
    let parsed = Document::parse(xml);
    let doc = parsed.map_err(|e| ODataError::parse(format!("invalid metadata: {}", e)))?;
    let mut builder = SchemaRegistry::builder();
    let schemas = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Schema");
    for schema in schemas {
        let namespace = required(schema, "Namespace")?;
        if let Some(alias) = schema.attribute("Alias") {
            builder = builder.alias(alias, namespace);
        }
        for node in schema.children().filter(|n| n.is_element()) {
            builder = match node.tag_name().name() {
                "EntityType" => builder.structured_type(structured(node, namespace, false)?),
                "ComplexType" => builder.structured_type(structured(node, namespace, true)?),
                "EnumType" => builder.enum_type(enum_type(node, namespace)?),
                "Function" => builder.callable(callable(node, namespace, false)?),
                "Action" => builder.callable(callable(node, namespace, true)?),
                "EntityContainer" => container(node, builder)?,
                other => {
                    log::trace!("skipping metadata element {}", other);
                    builder
                }
            };
        }
    }
    Ok(builder.build())
}
