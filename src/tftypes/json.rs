//! JSON encoding of values.
//!
//! Used for raw state and identity upgrades and as the alternate encoding of
//! a dynamic value. Unknown values and infinities have no JSON form.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::Value as Json;

use super::{AttributePath, Error, Known, Number, Type, Value, ValueState};

/// Options for decoding JSON values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    /// Drop object attributes that the type does not declare instead of
    /// failing. Stored state written by an older schema may carry them.
    pub ignore_undefined_attributes: bool,
}

impl Value {
    /// Encode as JSON, interpreting the value through `typ`.
    pub fn to_json(&self, typ: &Type) -> Result<Vec<u8>, Error> {
        let json = to_json_value(self, typ, &AttributePath::new())?;
        Ok(serde_json::to_vec(&json)?)
    }

    /// Decode JSON bytes as a value of `typ`.
    pub fn from_json(bytes: &[u8], typ: &Type) -> Result<Value, Error> {
        Self::from_json_with(bytes, typ, JsonOptions::default())
    }

    /// Decode JSON bytes as a value of `typ` with options.
    pub fn from_json_with(bytes: &[u8], typ: &Type, options: JsonOptions) -> Result<Value, Error> {
        let json: Json = serde_json::from_slice(bytes)?;
        from_json_value(json, typ, &AttributePath::new(), options)
    }
}

fn to_json_value(value: &Value, typ: &Type, path: &AttributePath) -> Result<Json, Error> {
    if typ.is_dynamic() && !value.typ().is_dynamic() {
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(
            "value".to_string(),
            to_json_value(value, value.typ(), path)?,
        );
        wrapper.insert("type".to_string(), serde_json::to_value(value.typ())?);
        return Ok(Json::Object(wrapper));
    }

    let known = match value.state() {
        ValueState::Unknown(_) => return Err(Error::UnknownInJson(path.clone())),
        ValueState::Null => return Ok(Json::Null),
        ValueState::Known(known) => known,
    };

    if !value.typ().usable_as(typ) {
        return Err(Error::value(
            path,
            format!("{} is not usable as {}", value.typ(), typ),
        ));
    }

    match (typ, known) {
        (Type::String, Known::String(s)) => Ok(Json::String(s.clone())),
        (Type::Number, Known::Number(Number::Finite(d))) => {
            Ok(Json::Number(serde_json::Number::from_str(&d.to_string())?))
        },
        (Type::Number, Known::Number(_)) => Err(Error::value(
            path,
            "infinite numbers cannot be encoded as JSON",
        )),
        (Type::Bool, Known::Bool(b)) => Ok(Json::Bool(*b)),
        (Type::List(elem) | Type::Set(elem), Known::Sequence(elements)) => elements
            .iter()
            .enumerate()
            .map(|(i, v)| to_json_value(v, elem, &path.clone().with_element_key_int(i as i64)))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        (Type::Tuple(types), Known::Sequence(elements)) => elements
            .iter()
            .zip(types)
            .enumerate()
            .map(|(i, (v, t))| to_json_value(v, t, &path.clone().with_element_key_int(i as i64)))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        (Type::Map(elem), Known::Entries(entries)) => {
            let mut object = serde_json::Map::new();
            for (k, v) in entries {
                let item = to_json_value(v, elem, &path.clone().with_element_key_string(k.clone()))?;
                object.insert(k.clone(), item);
            }
            Ok(Json::Object(object))
        },
        (
            Type::Object {
                attribute_types, ..
            },
            Known::Entries(entries),
        ) => {
            let mut object = serde_json::Map::new();
            for (name, t) in attribute_types {
                let item = match entries.get(name) {
                    Some(v) => to_json_value(v, t, &path.clone().with_attribute_name(name.clone()))?,
                    None => Json::Null,
                };
                object.insert(name.clone(), item);
            }
            Ok(Json::Object(object))
        },
        _ => Err(Error::value(
            path,
            format!("cannot encode {} as {}", value.typ(), typ),
        )),
    }
}

fn from_json_value(
    json: Json,
    typ: &Type,
    path: &AttributePath,
    options: JsonOptions,
) -> Result<Value, Error> {
    if json.is_null() {
        return Ok(Value::null(typ.clone()));
    }

    match typ {
        Type::DynamicPseudoType => {
            let Json::Object(mut wrapper) = json else {
                return Err(Error::value(
                    path,
                    "a dynamic value must be an object with \"type\" and \"value\"",
                ));
            };
            let (Some(raw_type), Some(inner)) = (wrapper.remove("type"), wrapper.remove("value"))
            else {
                return Err(Error::value(
                    path,
                    "a dynamic value must be an object with \"type\" and \"value\"",
                ));
            };
            let concrete: Type =
                serde_json::from_value(raw_type).map_err(|e| Error::InvalidType(e.to_string()))?;
            from_json_value(inner, &concrete, path, options)
        },
        // Legacy state may hold numbers and booleans in string attributes.
        Type::String => match json {
            Json::String(s) => Ok(Value::string(s)),
            Json::Number(n) => Ok(Value::string(n.to_string())),
            Json::Bool(b) => Ok(Value::string(b.to_string())),
            other => Err(unexpected(path, typ, &other)),
        },
        Type::Number => match json {
            Json::Number(n) => Ok(Value::number(Number::parse_at(&n.to_string(), path)?)),
            Json::String(s) => Ok(Value::number(Number::parse_at(&s, path)?)),
            other => Err(unexpected(path, typ, &other)),
        },
        Type::Bool => match json {
            Json::Bool(b) => Ok(Value::bool(b)),
            Json::String(s) if s == "true" || s == "1" => Ok(Value::bool(true)),
            Json::String(s) if s == "false" || s == "0" => Ok(Value::bool(false)),
            other => Err(unexpected(path, typ, &other)),
        },
        Type::List(elem) | Type::Set(elem) => {
            let items = match json {
                Json::Array(items) => items,
                other => return Err(unexpected(path, typ, &other)),
            };
            let elements = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    from_json_value(item, elem, &path.clone().with_element_key_int(i as i64), options)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Value::new_at(typ.clone(), Known::Sequence(elements), path)
        },
        Type::Tuple(types) => {
            let items = match json {
                Json::Array(items) => items,
                other => return Err(unexpected(path, typ, &other)),
            };
            if items.len() != types.len() {
                return Err(Error::value(
                    path,
                    format!("expected {} tuple elements, found {}", types.len(), items.len()),
                ));
            }
            let elements = items
                .into_iter()
                .zip(types)
                .enumerate()
                .map(|(i, (item, t))| {
                    from_json_value(item, t, &path.clone().with_element_key_int(i as i64), options)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Value::new_at(typ.clone(), Known::Sequence(elements), path)
        },
        Type::Map(elem) => {
            let object = match json {
                Json::Object(object) => object,
                other => return Err(unexpected(path, typ, &other)),
            };
            let mut entries = BTreeMap::new();
            for (k, item) in object {
                let item_path = path.clone().with_element_key_string(k.clone());
                entries.insert(k, from_json_value(item, elem, &item_path, options)?);
            }
            Value::new_at(typ.clone(), Known::Entries(entries), path)
        },
        Type::Object {
            attribute_types, ..
        } => {
            let object = match json {
                Json::Object(object) => object,
                other => return Err(unexpected(path, typ, &other)),
            };
            let mut entries = BTreeMap::new();
            for (k, item) in object {
                let attr_path = path.clone().with_attribute_name(k.clone());
                let Some(attr_type) = attribute_types.get(&k) else {
                    if options.ignore_undefined_attributes {
                        continue;
                    }
                    return Err(Error::value(&attr_path, "unsupported attribute"));
                };
                entries.insert(k, from_json_value(item, attr_type, &attr_path, options)?);
            }
            for (name, t) in attribute_types {
                entries
                    .entry(name.clone())
                    .or_insert_with(|| Value::null(t.clone()));
            }
            Value::new_at(typ.clone(), Known::Entries(entries), path)
        },
    }
}

fn unexpected(path: &AttributePath, typ: &Type, json: &Json) -> Error {
    let found = match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    };
    Error::value(path, format!("expected {}, found {}", typ, found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value, typ: &Type) -> Value {
        let bytes = value.to_json(typ).unwrap();
        Value::from_json(&bytes, typ).unwrap()
    }

    #[test]
    fn test_object_roundtrip() {
        let typ = Type::object([
            ("name", Type::String),
            ("count", Type::Number),
            ("enabled", Type::Bool),
            ("tags", Type::map(Type::String)),
            ("zones", Type::list(Type::String)),
        ]);
        let value = Value::object(
            typ.clone(),
            [
                ("name", Value::string("web")),
                ("count", Value::number(3)),
                ("enabled", Value::null(Type::Bool)),
                (
                    "tags",
                    Value::map(Type::String, [("env", Value::string("prod"))]).unwrap(),
                ),
                (
                    "zones",
                    Value::list(Type::String, vec![Value::string("a"), Value::string("b")])
                        .unwrap(),
                ),
            ],
        )
        .unwrap();
        assert_eq!(roundtrip(&value, &typ), value);
    }

    #[test]
    fn test_encoded_shape() {
        let typ = Type::object([("id", Type::String), ("size", Type::Number)]);
        let value = Value::object(
            typ.clone(),
            [("id", Value::string("i-1")), ("size", Value::number(10))],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(value.to_json(&typ).unwrap()).unwrap(),
            r#"{"id":"i-1","size":10}"#
        );
    }

    #[test]
    fn test_precision_preserved() {
        let text = "123456789012345678901234567890.000000000000000001";
        let value = Value::from_json(text.as_bytes(), &Type::Number).unwrap();
        let expected: Number = text.parse().unwrap();
        assert_eq!(value.as_number(), Some(&expected));
        assert_eq!(roundtrip(&value, &Type::Number), value);
    }

    #[test]
    fn test_dynamic_wrapper() {
        let value = Value::list(Type::String, vec![Value::string("a")]).unwrap();
        let bytes = value.to_json(&Type::DynamicPseudoType).unwrap();
        let json: Json = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], serde_json::json!(["list", "string"]));
        assert_eq!(json["value"], serde_json::json!(["a"]));

        let decoded = Value::from_json(&bytes, &Type::DynamicPseudoType).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_dynamic_null_keeps_its_type() {
        let value = Value::null(Type::String);
        let bytes = value.to_json(&Type::DynamicPseudoType).unwrap();
        let json: Json = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({"type": "string", "value": null}));

        let decoded = Value::from_json(&bytes, &Type::DynamicPseudoType).unwrap();
        assert_eq!(decoded.typ(), &Type::String);
        assert!(decoded.is_null());

        let untyped = Value::null(Type::DynamicPseudoType);
        assert_eq!(untyped.to_json(&Type::DynamicPseudoType).unwrap(), b"null".to_vec());
    }

    #[test]
    fn test_dynamic_unknown_is_an_error() {
        let typ = Type::object([("any", Type::DynamicPseudoType)]);
        let value = Value::object(typ.clone(), [("any", Value::unknown(Type::String))]).unwrap();
        let err = value.to_json(&typ).unwrap_err();
        assert!(matches!(err, Error::UnknownInJson(path) if path == AttributePath::root("any")));
    }

    #[test]
    fn test_unknown_is_an_error() {
        let value = Value::from_attributes([("id", Value::unknown(Type::String))]);
        let err = value.to_json(value.typ()).unwrap_err();
        match err {
            Error::UnknownInJson(path) => assert_eq!(path, AttributePath::root("id")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_infinity_is_an_error() {
        let value = Value::number(Number::NegInfinity);
        assert!(value.to_json(&Type::Number).is_err());
    }

    #[test]
    fn test_undefined_attributes() {
        let typ = Type::object([("id", Type::String)]);
        let bytes = br#"{"id":"x","removed_in_v2":true}"#;

        assert!(Value::from_json(bytes, &typ).is_err());

        let options = JsonOptions {
            ignore_undefined_attributes: true,
        };
        let value = Value::from_json_with(bytes, &typ, options).unwrap();
        assert_eq!(value.attribute("id").and_then(Value::as_str), Some("x"));
    }

    #[test]
    fn test_missing_attribute_is_null() {
        let typ = Type::object([("id", Type::String), ("note", Type::String)]);
        let value = Value::from_json(br#"{"id":"x"}"#, &typ).unwrap();
        assert!(value.attribute("note").unwrap().is_null());
    }

    #[test]
    fn test_legacy_scalar_coercions() {
        let v = Value::from_json(b"42", &Type::String).unwrap();
        assert_eq!(v.as_str(), Some("42"));

        let v = Value::from_json(b"\"1.5\"", &Type::Number).unwrap();
        assert_eq!(v, Value::number("1.5".parse::<Number>().unwrap()));

        let v = Value::from_json(b"\"true\"", &Type::Bool).unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }
}
