//! Schema types for describing provider, resource, and data source structure.
//!
//! Schemas describe the shape of configuration and state. A [`Schema`] wraps a
//! root [`SchemaBlock`]; blocks hold attributes and nested blocks, and an
//! attribute carries either a [`Type`] or a nested [`SchemaObject`].
//!
//! # Example
//!
//! ```
//! use tf_provider_protocol::schema::{Schema, SchemaAttribute, SchemaBlock, SchemaNestedBlock};
//! use tf_provider_protocol::tftypes::Type;
//!
//! let schema = Schema::new(
//!     1,
//!     SchemaBlock::new()
//!         .with_attribute(SchemaAttribute::required("name", Type::String))
//!         .with_attribute(SchemaAttribute::computed("id", Type::String))
//!         .with_block(SchemaNestedBlock::list(
//!             "rule",
//!             SchemaBlock::new().with_attribute(SchemaAttribute::optional("port", Type::Number)),
//!         )),
//! );
//!
//! assert!(schema.value_type().attribute_types().unwrap().contains_key("rule"));
//! ```

use std::collections::BTreeMap;

use crate::tftypes::Type;

/// How a description string is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringKind {
    /// Plain text.
    #[default]
    Plain,
    /// Markdown.
    Markdown,
    /// A kind this library does not know, kept by its wire value.
    Unrecognized(i32),
}

impl From<i32> for StringKind {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Plain,
            1 => Self::Markdown,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<StringKind> for i32 {
    fn from(kind: StringKind) -> Self {
        match kind {
            StringKind::Plain => 0,
            StringKind::Markdown => 1,
            StringKind::Unrecognized(other) => other,
        }
    }
}

/// Schema for a provider, resource, data source, or other configurable object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    pub version: i64,
    /// The root block.
    pub block: Option<SchemaBlock>,
}

impl Schema {
    /// Create a schema with a root block.
    pub fn new(version: i64, block: SchemaBlock) -> Self {
        Self {
            version,
            block: Some(block),
        }
    }

    /// The object type that values conforming to this schema have.
    pub fn value_type(&self) -> Type {
        match &self.block {
            Some(block) => block.value_type(),
            None => Type::object(std::iter::empty::<(String, Type)>()),
        }
    }
}

/// A group of attributes and nested blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaBlock {
    /// Block version; usually zero.
    pub version: i64,
    /// Attributes, in declaration order.
    pub attributes: Vec<SchemaAttribute>,
    /// Nested blocks, in declaration order.
    pub block_types: Vec<SchemaNestedBlock>,
    /// Human-readable description.
    pub description: String,
    /// Format of `description`.
    pub description_kind: StringKind,
    /// Whether the block is deprecated.
    pub deprecated: bool,
}

impl SchemaBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, attribute: SchemaAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add a nested block.
    pub fn with_block(mut self, block: SchemaNestedBlock) -> Self {
        self.block_types.push(block);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the description format.
    pub fn with_description_kind(mut self, kind: StringKind) -> Self {
        self.description_kind = kind;
        self
    }

    /// Mark the block as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up a nested block by type name.
    pub fn nested_block(&self, type_name: &str) -> Option<&SchemaNestedBlock> {
        self.block_types.iter().find(|b| b.type_name == type_name)
    }

    /// The object type of values of this block.
    ///
    /// Attributes and nested blocks whose type cannot be determined (no type,
    /// or an invalid nesting mode) are left out.
    pub fn value_type(&self) -> Type {
        let mut attribute_types = BTreeMap::new();
        for attribute in &self.attributes {
            if let Some(typ) = attribute.value_type() {
                attribute_types.insert(attribute.name.clone(), typ);
            }
        }
        for block in &self.block_types {
            if let Some(typ) = block.value_type() {
                attribute_types.insert(block.type_name.clone(), typ);
            }
        }
        Type::object(attribute_types)
    }
}

/// A single attribute of a block or nested object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaAttribute {
    /// Attribute name.
    pub name: String,
    /// Value type. Mutually exclusive with `nested_type`.
    pub ty: Option<Type>,
    /// Nested attribute object. Only supported by protocol version 6.
    pub nested_type: Option<SchemaObject>,
    /// Human-readable description.
    pub description: String,
    /// The attribute must be set in configuration.
    pub required: bool,
    /// The attribute may be set in configuration.
    pub optional: bool,
    /// The provider may set the value.
    pub computed: bool,
    /// The value should be hidden in output.
    pub sensitive: bool,
    /// Format of `description`.
    pub description_kind: StringKind,
    /// Whether the attribute is deprecated.
    pub deprecated: bool,
    /// The value is accepted in configuration but never persisted.
    pub write_only: bool,
}

impl SchemaAttribute {
    /// Create an attribute with a type and no flags set.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            ..Default::default()
        }
    }

    /// Create a required attribute.
    pub fn required(name: impl Into<String>, ty: Type) -> Self {
        Self {
            required: true,
            ..Self::new(name, ty)
        }
    }

    /// Create an optional attribute.
    pub fn optional(name: impl Into<String>, ty: Type) -> Self {
        Self {
            optional: true,
            ..Self::new(name, ty)
        }
    }

    /// Create a computed attribute (read-only, set by the provider).
    pub fn computed(name: impl Into<String>, ty: Type) -> Self {
        Self {
            computed: true,
            ..Self::new(name, ty)
        }
    }

    /// Create an optional+computed attribute (can be set, defaulted by the provider).
    pub fn optional_computed(name: impl Into<String>, ty: Type) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::new(name, ty)
        }
    }

    /// Create an attribute whose value is a nested object.
    pub fn nested(name: impl Into<String>, nested_type: SchemaObject) -> Self {
        Self {
            name: name.into(),
            nested_type: Some(nested_type),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the description format.
    pub fn with_description_kind(mut self, kind: StringKind) -> Self {
        self.description_kind = kind;
        self
    }

    /// Mark the attribute as required.
    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the attribute as optional.
    pub fn with_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the attribute as computed.
    pub fn with_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Mark the attribute as write-only.
    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    /// Mark the attribute as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// The type of this attribute's values.
    pub fn value_type(&self) -> Option<Type> {
        match (&self.ty, &self.nested_type) {
            (Some(ty), _) => Some(ty.clone()),
            (None, Some(nested)) => nested.value_type(),
            (None, None) => None,
        }
    }
}

/// Nesting mode of a nested block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NestedBlockNesting {
    /// Unset.
    #[default]
    Invalid,
    /// At most one block, null when absent.
    Single,
    /// An ordered list of blocks.
    List,
    /// An unordered set of blocks.
    Set,
    /// Blocks keyed by label.
    Map,
    /// Exactly one block, never null.
    Group,
    /// A mode this library does not know, kept by its wire value.
    Unrecognized(i32),
}

impl From<i32> for NestedBlockNesting {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Invalid,
            1 => Self::Single,
            2 => Self::List,
            3 => Self::Set,
            4 => Self::Map,
            5 => Self::Group,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<NestedBlockNesting> for i32 {
    fn from(nesting: NestedBlockNesting) -> Self {
        match nesting {
            NestedBlockNesting::Invalid => 0,
            NestedBlockNesting::Single => 1,
            NestedBlockNesting::List => 2,
            NestedBlockNesting::Set => 3,
            NestedBlockNesting::Map => 4,
            NestedBlockNesting::Group => 5,
            NestedBlockNesting::Unrecognized(other) => other,
        }
    }
}

/// A nested block within a schema block.
///
/// Blocks are used for complex nested structures that have their own set of
/// attributes (e.g., `ingress` blocks in a security group).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaNestedBlock {
    /// Name of the block in configuration.
    pub type_name: String,
    /// The block definition.
    pub block: Option<SchemaBlock>,
    /// How the block is nested.
    pub nesting: NestedBlockNesting,
    /// Minimum number of blocks required.
    pub min_items: i64,
    /// Maximum number of blocks allowed (0 = unlimited).
    pub max_items: i64,
}

impl SchemaNestedBlock {
    fn with_nesting(
        type_name: impl Into<String>,
        block: SchemaBlock,
        nesting: NestedBlockNesting,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            block: Some(block),
            nesting,
            min_items: 0,
            max_items: 0,
        }
    }

    /// A single nested block (0 or 1 allowed).
    pub fn single(type_name: impl Into<String>, block: SchemaBlock) -> Self {
        Self::with_nesting(type_name, block, NestedBlockNesting::Single)
    }

    /// A list of nested blocks.
    pub fn list(type_name: impl Into<String>, block: SchemaBlock) -> Self {
        Self::with_nesting(type_name, block, NestedBlockNesting::List)
    }

    /// A set of nested blocks.
    pub fn set(type_name: impl Into<String>, block: SchemaBlock) -> Self {
        Self::with_nesting(type_name, block, NestedBlockNesting::Set)
    }

    /// A map of nested blocks.
    pub fn map(type_name: impl Into<String>, block: SchemaBlock) -> Self {
        Self::with_nesting(type_name, block, NestedBlockNesting::Map)
    }

    /// A group: a single block that is never null.
    pub fn group(type_name: impl Into<String>, block: SchemaBlock) -> Self {
        Self::with_nesting(type_name, block, NestedBlockNesting::Group)
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: i64) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: i64) -> Self {
        self.max_items = max;
        self
    }

    /// The type of this block's values, or `None` for an invalid nesting mode.
    pub fn value_type(&self) -> Option<Type> {
        let block_type = match &self.block {
            Some(block) => block.value_type(),
            None => SchemaBlock::new().value_type(),
        };
        match self.nesting {
            NestedBlockNesting::Single | NestedBlockNesting::Group => Some(block_type),
            NestedBlockNesting::List => Some(Type::list(block_type)),
            NestedBlockNesting::Set => Some(Type::set(block_type)),
            NestedBlockNesting::Map => Some(Type::map(block_type)),
            NestedBlockNesting::Invalid | NestedBlockNesting::Unrecognized(_) => None,
        }
    }
}

/// Nesting mode of a nested attribute object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectNesting {
    /// Unset.
    #[default]
    Invalid,
    /// A single object.
    Single,
    /// A list of objects.
    List,
    /// A set of objects.
    Set,
    /// Objects keyed by string.
    Map,
    /// A mode this library does not know, kept by its wire value.
    Unrecognized(i32),
}

impl From<i32> for ObjectNesting {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Invalid,
            1 => Self::Single,
            2 => Self::List,
            3 => Self::Set,
            4 => Self::Map,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<ObjectNesting> for i32 {
    fn from(nesting: ObjectNesting) -> Self {
        match nesting {
            ObjectNesting::Invalid => 0,
            ObjectNesting::Single => 1,
            ObjectNesting::List => 2,
            ObjectNesting::Set => 3,
            ObjectNesting::Map => 4,
            ObjectNesting::Unrecognized(other) => other,
        }
    }
}

/// A nested attribute object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaObject {
    /// How the object is nested.
    pub nesting: ObjectNesting,
    /// Attributes of the object.
    pub attributes: Vec<SchemaAttribute>,
    /// Deprecated on the wire; kept for round-tripping.
    pub min_items: i64,
    /// Deprecated on the wire; kept for round-tripping.
    pub max_items: i64,
}

impl SchemaObject {
    /// Create a nested object with a nesting mode.
    pub fn new(nesting: ObjectNesting, attributes: Vec<SchemaAttribute>) -> Self {
        Self {
            nesting,
            attributes,
            min_items: 0,
            max_items: 0,
        }
    }

    /// A single nested object.
    pub fn single(attributes: Vec<SchemaAttribute>) -> Self {
        Self::new(ObjectNesting::Single, attributes)
    }

    /// A list of nested objects.
    pub fn list(attributes: Vec<SchemaAttribute>) -> Self {
        Self::new(ObjectNesting::List, attributes)
    }

    /// A set of nested objects.
    pub fn set(attributes: Vec<SchemaAttribute>) -> Self {
        Self::new(ObjectNesting::Set, attributes)
    }

    /// A map of nested objects.
    pub fn map(attributes: Vec<SchemaAttribute>) -> Self {
        Self::new(ObjectNesting::Map, attributes)
    }

    /// The type of values of this object, or `None` for an invalid nesting mode.
    pub fn value_type(&self) -> Option<Type> {
        let object = Type::object(
            self.attributes
                .iter()
                .filter_map(|a| a.value_type().map(|t| (a.name.clone(), t))),
        );
        match self.nesting {
            ObjectNesting::Single => Some(object),
            ObjectNesting::List => Some(Type::list(object)),
            ObjectNesting::Set => Some(Type::set(object)),
            ObjectNesting::Map => Some(Type::map(object)),
            ObjectNesting::Invalid | ObjectNesting::Unrecognized(_) => None,
        }
    }
}

/// Schema of a managed resource's identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceIdentitySchema {
    /// Identity schema version.
    pub version: i64,
    /// Identity attributes.
    pub identity_attributes: Vec<ResourceIdentitySchemaAttribute>,
}

impl ResourceIdentitySchema {
    /// Create an identity schema.
    pub fn new(version: i64, identity_attributes: Vec<ResourceIdentitySchemaAttribute>) -> Self {
        Self {
            version,
            identity_attributes,
        }
    }

    /// The object type of identity values.
    pub fn value_type(&self) -> Type {
        Type::object(
            self.identity_attributes
                .iter()
                .filter_map(|a| a.ty.clone().map(|t| (a.name.clone(), t))),
        )
    }
}

/// A single identity attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceIdentitySchemaAttribute {
    /// Attribute name.
    pub name: String,
    /// Value type.
    pub ty: Option<Type>,
    /// The attribute must be supplied when importing by identity.
    pub required_for_import: bool,
    /// The attribute may be supplied when importing by identity.
    pub optional_for_import: bool,
    /// Human-readable description.
    pub description: String,
}

impl ResourceIdentitySchemaAttribute {
    /// An attribute required for import.
    pub fn required_for_import(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            required_for_import: true,
            ..Default::default()
        }
    }

    /// An attribute optional for import.
    pub fn optional_for_import(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            optional_for_import: true,
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_builders() {
        let attr = SchemaAttribute::required("name", Type::String)
            .with_description("A test attribute")
            .sensitive();

        assert_eq!(attr.ty, Some(Type::String));
        assert!(attr.required);
        assert!(!attr.optional);
        assert!(attr.sensitive);
        assert_eq!(attr.description, "A test attribute");

        let attr = SchemaAttribute::optional_computed("region", Type::String);
        assert!(attr.optional && attr.computed && !attr.required);

        let attr = SchemaAttribute::optional("password", Type::String).write_only();
        assert!(attr.write_only);
    }

    #[test]
    fn test_block_value_type() {
        let block = SchemaBlock::new()
            .with_attribute(SchemaAttribute::required("name", Type::String))
            .with_attribute(SchemaAttribute::computed("id", Type::String))
            .with_block(SchemaNestedBlock::single(
                "config",
                SchemaBlock::new().with_attribute(SchemaAttribute::optional("enabled", Type::Bool)),
            ))
            .with_block(SchemaNestedBlock::set(
                "tag",
                SchemaBlock::new().with_attribute(SchemaAttribute::required("key", Type::String)),
            ));

        let expected = Type::object([
            ("name", Type::String),
            ("id", Type::String),
            ("config", Type::object([("enabled", Type::Bool)])),
            ("tag", Type::set(Type::object([("key", Type::String)]))),
        ]);
        assert_eq!(block.value_type(), expected);
    }

    #[test]
    fn test_nested_attribute_value_type() {
        let attr = SchemaAttribute::nested(
            "rules",
            SchemaObject::list(vec![SchemaAttribute::required("port", Type::Number)]),
        )
        .with_optional();

        assert_eq!(
            attr.value_type(),
            Some(Type::list(Type::object([("port", Type::Number)])))
        );

        let invalid = SchemaObject::new(ObjectNesting::Invalid, vec![]);
        assert_eq!(invalid.value_type(), None);
    }

    #[test]
    fn test_invalid_nesting_left_out() {
        let block = SchemaBlock::new().with_block(SchemaNestedBlock {
            type_name: "broken".to_string(),
            ..Default::default()
        });
        assert_eq!(block.value_type(), Type::object(std::iter::empty::<(String, Type)>()));
    }

    #[test]
    fn test_nested_block_modes() {
        let single = SchemaNestedBlock::single("x", SchemaBlock::new());
        assert_eq!(single.nesting, NestedBlockNesting::Single);

        let list = SchemaNestedBlock::list("x", SchemaBlock::new())
            .with_min_items(1)
            .with_max_items(5);
        assert_eq!(list.nesting, NestedBlockNesting::List);
        assert_eq!(list.min_items, 1);
        assert_eq!(list.max_items, 5);

        let group = SchemaNestedBlock::group("x", SchemaBlock::new());
        assert_eq!(group.value_type(), Some(Type::object(std::iter::empty::<(String, Type)>())));
    }

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(NestedBlockNesting::from(5), NestedBlockNesting::Group);
        assert_eq!(i32::from(NestedBlockNesting::Unrecognized(9)), 9);
        assert_eq!(ObjectNesting::from(5), ObjectNesting::Unrecognized(5));
        assert_eq!(StringKind::from(1), StringKind::Markdown);
        assert_eq!(i32::from(StringKind::Markdown), 1);
    }

    #[test]
    fn test_lookup() {
        let block = SchemaBlock::new()
            .with_attribute(SchemaAttribute::required("name", Type::String))
            .with_block(SchemaNestedBlock::list("rule", SchemaBlock::new()));
        assert!(block.attribute("name").is_some());
        assert!(block.attribute("missing").is_none());
        assert!(block.nested_block("rule").is_some());
    }

    #[test]
    fn test_identity_value_type() {
        let schema = ResourceIdentitySchema::new(
            1,
            vec![
                ResourceIdentitySchemaAttribute::required_for_import("id", Type::String),
                ResourceIdentitySchemaAttribute::optional_for_import("region", Type::String),
            ],
        );
        assert_eq!(
            schema.value_type(),
            Type::object([("id", Type::String), ("region", Type::String)])
        );
    }
}
