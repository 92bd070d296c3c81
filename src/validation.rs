//! Schema validation helpers.
//!
//! This module checks a configuration [`Value`] against a [`Schema`] the way
//! the host does before sending it: required arguments must be set, computed
//! attributes must not be, and nested blocks must respect their item limits.
//!
//! # Example
//!
//! ```
//! use tf_provider_protocol::schema::{Schema, SchemaAttribute, SchemaBlock};
//! use tf_provider_protocol::tftypes::{Type, Value};
//! use tf_provider_protocol::validation::validate;
//!
//! let block = SchemaBlock::new()
//!     .with_attribute(SchemaAttribute::required("name", Type::String))
//!     .with_attribute(SchemaAttribute::optional("count", Type::Number));
//! let schema = Schema::new(0, block);
//!
//! let config = Value::object(
//!     schema.value_type(),
//!     [("name", Value::null(Type::String)), ("count", Value::number(2))],
//! )
//! .unwrap();
//! let diagnostics = validate(&schema, &config);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].summary, "Missing required argument");
//! ```

use crate::diagnostic::Diagnostic;
use crate::schema::{
    NestedBlockNesting, ObjectNesting, Schema, SchemaAttribute, SchemaBlock, SchemaNestedBlock,
};
use crate::tftypes::{AttributePath, Value};

/// Validate a configuration value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - The value's type must conform to the schema's type
/// - Required attributes must be set and non-null
/// - Computed-only attributes must not be set
/// - Unknown values are accepted anywhere
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let block = schema.block.clone().unwrap_or_default();
    let expected = block.value_type();
    if !value.typ().usable_as(&expected) {
        diagnostics.push(
            Diagnostic::error("Value does not conform to schema")
                .with_detail(format!("Expected {}, got {}.", expected, value.typ())),
        );
        return diagnostics;
    }
    if value.is_known() && !value.is_null() {
        validate_block(&block, value, &AttributePath::new(), &mut diagnostics);
    }
    diagnostics
}

/// Validate a value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a value is valid against a schema.
///
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(
    block: &SchemaBlock,
    value: &Value,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for attr in &block.attributes {
        let attr_path = path.clone().with_attribute_name(&attr.name);
        validate_attribute(attr, value.attribute(&attr.name), &attr_path, diagnostics);
    }

    for nested in &block.block_types {
        let Some(block_value) = value.attribute(&nested.type_name) else {
            continue;
        };
        let block_path = path.clone().with_attribute_name(&nested.type_name);
        validate_nested_block(nested, block_value, &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &SchemaAttribute,
    value: Option<&Value>,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let is_set = value.is_some_and(|v| !v.is_null());

    if attr.computed && !attr.optional && !attr.required {
        if is_set {
            diagnostics.push(
                Diagnostic::error("Invalid configuration for computed attribute")
                    .with_detail(format!(
                        "Value for unconfigurable attribute. Can't configure a value for {:?}: its value will be decided automatically based on the result of applying this configuration.",
                        attr.name
                    ))
                    .with_attribute(path.clone()),
            );
        }
        return;
    }

    let Some(value) = value.filter(|_| is_set) else {
        if attr.required {
            diagnostics.push(
                Diagnostic::error("Missing required argument")
                    .with_detail(format!(
                        "The argument {:?} is required, but no definition was found.",
                        attr.name
                    ))
                    .with_attribute(path.clone()),
            );
        }
        return;
    };

    if !value.is_known() {
        return;
    }

    if let Some(nested) = &attr.nested_type {
        match nested.nesting {
            ObjectNesting::Single => {
                validate_object_attributes(&nested.attributes, value, path, diagnostics);
            },
            ObjectNesting::List | ObjectNesting::Set => {
                for (i, element) in value.elements().unwrap_or_default().iter().enumerate() {
                    let element_path = element_path(path, nested.nesting == ObjectNesting::Set, i, element);
                    validate_object_attributes(&nested.attributes, element, &element_path, diagnostics);
                }
            },
            ObjectNesting::Map => {
                for (key, element) in value.entries().into_iter().flatten() {
                    let element_path = path.clone().with_element_key_string(key);
                    validate_object_attributes(&nested.attributes, element, &element_path, diagnostics);
                }
            },
            ObjectNesting::Invalid | ObjectNesting::Unrecognized(_) => {},
        }
    }
}

fn validate_object_attributes(
    attributes: &[SchemaAttribute],
    value: &Value,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if value.is_null() || !value.is_known() {
        return;
    }
    for attr in attributes {
        let attr_path = path.clone().with_attribute_name(&attr.name);
        validate_attribute(attr, value.attribute(&attr.name), &attr_path, diagnostics);
    }
}

fn validate_nested_block(
    nested: &SchemaNestedBlock,
    value: &Value,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let block = nested.block.clone().unwrap_or_default();

    match nested.nesting {
        NestedBlockNesting::Single | NestedBlockNesting::Group => {
            if value.is_null() {
                check_item_count(nested, 0, path, diagnostics);
            } else if value.is_known() {
                validate_block(&block, value, path, diagnostics);
            }
        },
        NestedBlockNesting::List | NestedBlockNesting::Set => {
            if !value.is_known() {
                return;
            }
            let elements = value.elements().unwrap_or_default();
            check_item_count(nested, elements.len(), path, diagnostics);
            let is_set = nested.nesting == NestedBlockNesting::Set;
            for (i, element) in elements.iter().enumerate() {
                if element.is_known() {
                    validate_block(&block, element, &element_path(path, is_set, i, element), diagnostics);
                }
            }
        },
        NestedBlockNesting::Map => {
            if !value.is_known() {
                return;
            }
            let entries: Vec<_> = value.entries().into_iter().flatten().collect();
            check_item_count(nested, entries.len(), path, diagnostics);
            for (key, element) in entries {
                if element.is_known() {
                    let element_path = path.clone().with_element_key_string(key);
                    validate_block(&block, element, &element_path, diagnostics);
                }
            }
        },
        NestedBlockNesting::Invalid | NestedBlockNesting::Unrecognized(_) => {},
    }
}

fn check_item_count(
    nested: &SchemaNestedBlock,
    count: usize,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let count = count as i64;
    if count < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!("Insufficient {} blocks", nested.type_name))
                .with_detail(format!(
                    "At least {} {:?} blocks are required.",
                    nested.min_items, nested.type_name
                ))
                .with_attribute(path.clone()),
        );
    }
    // 0 means unlimited
    if nested.max_items > 0 && count > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!("Too many {} blocks", nested.type_name))
                .with_detail(format!(
                    "No more than {} {:?} blocks are allowed.",
                    nested.max_items, nested.type_name
                ))
                .with_attribute(path.clone()),
        );
    }
}

fn element_path(path: &AttributePath, is_set: bool, index: usize, element: &Value) -> AttributePath {
    if is_set {
        path.clone().with_element_key_value(element.clone())
    } else {
        path.clone().with_element_key_int(index as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaObject;
    use crate::tftypes::{AttributePathStep, Type};
    use std::collections::BTreeMap;

    /// Build a known object of the given type, filling unset attributes with nulls.
    fn object(typ: &Type, attrs: Vec<(&str, Value)>) -> Value {
        let mut entries: BTreeMap<String, Value> = typ
            .attribute_types()
            .unwrap()
            .iter()
            .map(|(name, t)| (name.clone(), Value::null(t.clone())))
            .collect();
        for (name, value) in attrs {
            entries.insert(name.to_string(), value);
        }
        Value::object(typ.clone(), entries).unwrap()
    }

    fn instance_schema() -> Schema {
        Schema::new(
            0,
            SchemaBlock::new()
                .with_attribute(SchemaAttribute::required("name", Type::String))
                .with_attribute(SchemaAttribute::optional("count", Type::Number))
                .with_attribute(SchemaAttribute::computed("id", Type::String))
                .with_attribute(SchemaAttribute::optional_computed("zone", Type::String)),
        )
    }

    #[test]
    fn test_validate_required_attribute() {
        let schema = instance_schema();
        let typ = schema.value_type();

        let valid = object(&typ, vec![("name", Value::string("web"))]);
        assert!(validate(&schema, &valid).is_empty());

        let missing = object(&typ, vec![("count", Value::number(1))]);
        let diags = validate(&schema, &missing);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Missing required argument");
        assert_eq!(
            diags[0].detail,
            "The argument \"name\" is required, but no definition was found."
        );
        assert_eq!(diags[0].attribute, Some(AttributePath::root("name")));
    }

    #[test]
    fn test_validate_unknown_required_is_accepted() {
        let schema = instance_schema();
        let typ = schema.value_type();
        let config = object(&typ, vec![("name", Value::unknown(Type::String))]);
        assert!(is_valid(&schema, &config));
    }

    #[test]
    fn test_validate_computed_attribute_set() {
        let schema = instance_schema();
        let typ = schema.value_type();

        let config = object(
            &typ,
            vec![
                ("name", Value::string("web")),
                ("id", Value::string("i-123")),
                ("zone", Value::string("a")),
            ],
        );
        let diags = validate(&schema, &config);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Invalid configuration for computed attribute");
        assert_eq!(diags[0].attribute, Some(AttributePath::root("id")));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let schema = instance_schema();
        let config = Value::from_attributes([("name", Value::string("web"))]);
        let diags = validate(&schema, &config);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Value does not conform to schema");
        assert!(diags[0].attribute.is_none());
    }

    #[test]
    fn test_validate_null_and_unknown_root() {
        let schema = instance_schema();
        let typ = schema.value_type();
        assert!(is_valid(&schema, &Value::null(typ.clone())));
        assert!(is_valid(&schema, &Value::unknown(typ)));
    }

    #[test]
    fn test_validate_nested_block_list_limits() {
        let rule = SchemaBlock::new().with_attribute(SchemaAttribute::required("port", Type::Number));
        let schema = Schema::new(
            0,
            SchemaBlock::new().with_block(
                SchemaNestedBlock::list("rule", rule)
                    .with_min_items(1)
                    .with_max_items(2),
            ),
        );
        let typ = schema.value_type();
        let rule_type = typ.attribute_types().unwrap()["rule"].element_type().unwrap().clone();

        let rule_with = |port: Value| object(&rule_type, vec![("port", port)]);

        let empty = object(&typ, vec![("rule", Value::list(rule_type.clone(), vec![]).unwrap())]);
        let diags = validate(&schema, &empty);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Insufficient rule blocks");
        assert_eq!(diags[0].detail, "At least 1 \"rule\" blocks are required.");

        let three = Value::list(
            rule_type.clone(),
            vec![
                rule_with(Value::number(80)),
                rule_with(Value::number(443)),
                rule_with(Value::number(8080)),
            ],
        )
        .unwrap();
        let diags = validate(&schema, &object(&typ, vec![("rule", three)]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Too many rule blocks");

        let missing_port = Value::list(
            rule_type.clone(),
            vec![rule_with(Value::number(80)), rule_with(Value::null(Type::Number))],
        )
        .unwrap();
        let diags = validate(&schema, &object(&typ, vec![("rule", missing_port)]));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].attribute,
            Some(
                AttributePath::root("rule")
                    .with_element_key_int(1)
                    .with_attribute_name("port")
            )
        );

        let unknown = Value::unknown(Type::list(rule_type));
        assert!(is_valid(&schema, &object(&typ, vec![("rule", unknown)])));
    }

    #[test]
    fn test_validate_nested_block_single_required() {
        let timeouts = SchemaBlock::new().with_attribute(SchemaAttribute::optional("create", Type::String));
        let schema = Schema::new(
            0,
            SchemaBlock::new().with_block(SchemaNestedBlock::single("timeouts", timeouts).with_min_items(1)),
        );
        let typ = schema.value_type();
        let diags = validate(&schema, &object(&typ, vec![]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Insufficient timeouts blocks");
        assert_eq!(diags[0].attribute, Some(AttributePath::root("timeouts")));
    }

    #[test]
    fn test_validate_set_block_uses_value_keys() {
        let tag = SchemaBlock::new()
            .with_attribute(SchemaAttribute::optional("key", Type::String))
            .with_attribute(SchemaAttribute::computed("etag", Type::String));
        let schema = Schema::new(0, SchemaBlock::new().with_block(SchemaNestedBlock::set("tag", tag)));
        let typ = schema.value_type();
        let tag_type = typ.attribute_types().unwrap()["tag"].element_type().unwrap().clone();

        let element = object(
            &tag_type,
            vec![("key", Value::string("env")), ("etag", Value::string("x"))],
        );
        let tags = Value::set(tag_type, vec![element.clone()]).unwrap();
        let diags = validate(&schema, &object(&typ, vec![("tag", tags)]));
        assert_eq!(diags.len(), 1);
        let steps = diags[0].attribute.as_ref().unwrap().steps();
        assert_eq!(steps[0], AttributePathStep::AttributeName("tag".to_string()));
        assert_eq!(steps[1], AttributePathStep::ElementKeyValue(element));
        assert_eq!(steps[2], AttributePathStep::AttributeName("etag".to_string()));
    }

    #[test]
    fn test_validate_nested_attribute_map() {
        let schema = Schema::new(
            0,
            SchemaBlock::new().with_attribute(
                SchemaAttribute::nested(
                    "ports",
                    SchemaObject::map(vec![SchemaAttribute::required("number", Type::Number)]),
                )
                .with_optional(),
            ),
        );
        let typ = schema.value_type();
        let port_type = typ.attribute_types().unwrap()["ports"].element_type().unwrap().clone();

        let ports = Value::map(
            port_type.clone(),
            [
                ("http", object(&port_type, vec![("number", Value::number(80))])),
                ("https", object(&port_type, vec![])),
            ],
        )
        .unwrap();
        let diags = validate(&schema, &object(&typ, vec![("ports", ports)]));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].attribute,
            Some(
                AttributePath::root("ports")
                    .with_element_key_string("https")
                    .with_attribute_name("number")
            )
        );
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = instance_schema();
        let typ = schema.value_type();
        let config = object(&typ, vec![("id", Value::string("i-1"))]);
        let err = validate_result(&schema, &config).unwrap_err();
        let summaries: Vec<_> = err.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            ["Missing required argument", "Invalid configuration for computed attribute"]
        );
    }
}
