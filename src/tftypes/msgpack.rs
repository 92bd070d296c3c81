//! MessagePack encoding of values.
//!
//! Nulls are `nil`. Unknown values are extension type 0 whose body is either
//! a placeholder byte or the encoded refinements. Values at a dynamic position
//! are a two-element array of the type's JSON and the value itself, null and
//! unknown values included.

use std::collections::BTreeMap;

use super::{AttributePath, Error, Known, Number, Refinements, Type, Value, ValueState};

/// Extension type marking an unknown value.
pub(crate) const UNKNOWN_EXTENSION: i8 = 0;

/// Extension type some hosts use for unknown values carrying refinements.
const REFINED_UNKNOWN_EXTENSION: i8 = 12;

impl Value {
    /// Encode as MessagePack, interpreting the value through `typ`.
    pub fn to_msgpack(&self, typ: &Type) -> Result<Vec<u8>, Error> {
        let raw = encode(self, typ, &AttributePath::new())?;
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &raw).map_err(|e| Error::MsgPack(e.to_string()))?;
        Ok(buf)
    }

    /// Decode MessagePack bytes as a value of `typ`.
    pub fn from_msgpack(bytes: &[u8], typ: &Type) -> Result<Value, Error> {
        let raw = rmpv::decode::read_value(&mut &bytes[..])
            .map_err(|e| Error::MsgPack(e.to_string()))?;
        decode(raw, typ, &AttributePath::new())
    }
}

pub(crate) fn number_to_msgpack(n: &Number) -> rmpv::Value {
    if let Some(i) = n.as_i64() {
        return rmpv::Value::from(i);
    }
    if let Some(u) = n.as_u64() {
        return rmpv::Value::from(u);
    }
    if let Some(f) = n.exact_f64() {
        return rmpv::Value::F64(f);
    }
    rmpv::Value::from(n.to_string())
}

pub(crate) fn number_from_msgpack(raw: &rmpv::Value, path: &AttributePath) -> Result<Number, Error> {
    match raw {
        rmpv::Value::Integer(i) => {
            if let Some(v) = i.as_i64() {
                Ok(Number::from(v))
            } else if let Some(v) = i.as_u64() {
                Ok(Number::from(v))
            } else {
                Err(Error::value(path, "integer out of range"))
            }
        },
        rmpv::Value::F32(f) => Number::from_f64_at(f64::from(*f), path),
        rmpv::Value::F64(f) => Number::from_f64_at(*f, path),
        rmpv::Value::String(s) => match s.as_str() {
            Some(s) => Number::parse_at(s, path),
            None => Err(Error::value(path, "number string is not valid UTF-8")),
        },
        other => Err(Error::value(
            path,
            format!("expected a number, found {}", describe(other)),
        )),
    }
}

fn encode(value: &Value, typ: &Type, path: &AttributePath) -> Result<rmpv::Value, Error> {
    // A concrete value at a dynamic position carries its type, even when it is
    // null or unknown. Only a value that is itself dynamic goes out bare.
    if typ.is_dynamic() && !value.typ().is_dynamic() {
        let type_json = value.typ().to_json_bytes();
        let inner = encode(value, value.typ(), path)?;
        return Ok(rmpv::Value::Array(vec![rmpv::Value::Binary(type_json), inner]));
    }

    let known = match value.state() {
        ValueState::Unknown(refinements) => return encode_unknown(refinements, typ),
        ValueState::Null => return Ok(rmpv::Value::Nil),
        ValueState::Known(known) => known,
    };

    if !value.typ().usable_as(typ) {
        return Err(Error::value(
            path,
            format!("{} is not usable as {}", value.typ(), typ),
        ));
    }

    match (typ, known) {
        (Type::String, Known::String(s)) => Ok(rmpv::Value::from(s.as_str())),
        (Type::Number, Known::Number(n)) => Ok(number_to_msgpack(n)),
        (Type::Bool, Known::Bool(b)) => Ok(rmpv::Value::Boolean(*b)),
        (Type::List(elem) | Type::Set(elem), Known::Sequence(elements)) => elements
            .iter()
            .enumerate()
            .map(|(i, v)| encode(v, elem, &path.clone().with_element_key_int(i as i64)))
            .collect::<Result<Vec<_>, _>>()
            .map(rmpv::Value::Array),
        (Type::Tuple(types), Known::Sequence(elements)) => elements
            .iter()
            .zip(types)
            .enumerate()
            .map(|(i, (v, t))| encode(v, t, &path.clone().with_element_key_int(i as i64)))
            .collect::<Result<Vec<_>, _>>()
            .map(rmpv::Value::Array),
        (Type::Map(elem), Known::Entries(entries)) => entries
            .iter()
            .map(|(k, v)| {
                let inner = encode(v, elem, &path.clone().with_element_key_string(k.clone()))?;
                Ok((rmpv::Value::from(k.as_str()), inner))
            })
            .collect::<Result<Vec<_>, Error>>()
            .map(rmpv::Value::Map),
        (
            Type::Object {
                attribute_types, ..
            },
            Known::Entries(entries),
        ) => attribute_types
            .iter()
            .map(|(name, t)| {
                let inner = match entries.get(name) {
                    Some(v) => encode(v, t, &path.clone().with_attribute_name(name.clone()))?,
                    None => rmpv::Value::Nil,
                };
                Ok((rmpv::Value::from(name.as_str()), inner))
            })
            .collect::<Result<Vec<_>, Error>>()
            .map(rmpv::Value::Map),
        _ => Err(Error::value(
            path,
            format!("cannot encode {} as {}", value.typ(), typ),
        )),
    }
}

fn encode_unknown(refinements: &Refinements, typ: &Type) -> Result<rmpv::Value, Error> {
    // Refinements are only meaningful where the schema type is concrete.
    if refinements.is_empty() || matches!(typ, Type::DynamicPseudoType) {
        return Ok(rmpv::Value::Ext(UNKNOWN_EXTENSION, vec![0]));
    }
    Ok(rmpv::Value::Ext(UNKNOWN_EXTENSION, refinements.encode()?))
}

fn decode(raw: rmpv::Value, typ: &Type, path: &AttributePath) -> Result<Value, Error> {
    match raw {
        rmpv::Value::Nil => return Ok(Value::null(typ.clone())),
        rmpv::Value::Ext(kind, body) => return decode_unknown(kind, &body, typ, path),
        _ => {},
    }

    match typ {
        Type::DynamicPseudoType => {
            let mut pair = match raw {
                rmpv::Value::Array(pair) if pair.len() == 2 => pair,
                other => {
                    return Err(Error::value(
                        path,
                        format!(
                            "expected a [type, value] pair for a dynamic value, found {}",
                            describe(&other)
                        ),
                    ));
                },
            };
            let inner = pair.pop().unwrap_or(rmpv::Value::Nil);
            let type_json = match pair.pop() {
                Some(rmpv::Value::Binary(b)) => b,
                Some(rmpv::Value::String(s)) => s.into_bytes(),
                _ => return Err(Error::value(path, "dynamic value type must be bytes")),
            };
            let concrete = Type::parse_json(&type_json)?;
            decode(inner, &concrete, path)
        },
        Type::String => match raw {
            rmpv::Value::String(s) => match s.into_str() {
                Some(s) => Ok(Value::string(s)),
                None => Err(Error::value(path, "string is not valid UTF-8")),
            },
            other => Err(unexpected(path, typ, &other)),
        },
        Type::Number => Ok(Value::number(number_from_msgpack(&raw, path)?)),
        Type::Bool => match raw {
            rmpv::Value::Boolean(b) => Ok(Value::bool(b)),
            other => Err(unexpected(path, typ, &other)),
        },
        Type::List(elem) | Type::Set(elem) => {
            let items = expect_array(raw, path, typ)?;
            let elements = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| decode(item, elem, &path.clone().with_element_key_int(i as i64)))
                .collect::<Result<Vec<_>, _>>()?;
            Value::new_at(typ.clone(), Known::Sequence(elements), path)
        },
        Type::Tuple(types) => {
            let items = expect_array(raw, path, typ)?;
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
                .map(|(i, (item, t))| decode(item, t, &path.clone().with_element_key_int(i as i64)))
                .collect::<Result<Vec<_>, _>>()?;
            Value::new_at(typ.clone(), Known::Sequence(elements), path)
        },
        Type::Map(elem) => {
            let mut entries = BTreeMap::new();
            for (key, item) in expect_map(raw, path, typ)? {
                let key = map_key(key, path)?;
                let item = decode(item, elem, &path.clone().with_element_key_string(key.clone()))?;
                entries.insert(key, item);
            }
            Value::new_at(typ.clone(), Known::Entries(entries), path)
        },
        Type::Object {
            attribute_types, ..
        } => {
            let mut entries = BTreeMap::new();
            for (key, item) in expect_map(raw, path, typ)? {
                let key = map_key(key, path)?;
                let attr_path = path.clone().with_attribute_name(key.clone());
                let Some(attr_type) = attribute_types.get(&key) else {
                    return Err(Error::value(&attr_path, "unexpected attribute"));
                };
                let item = decode(item, attr_type, &attr_path)?;
                entries.insert(key, item);
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

fn decode_unknown(
    kind: i8,
    body: &[u8],
    typ: &Type,
    path: &AttributePath,
) -> Result<Value, Error> {
    if kind != UNKNOWN_EXTENSION && kind != REFINED_UNKNOWN_EXTENSION {
        return Err(Error::UnknownExtension(kind));
    }
    if body.is_empty() || body == [0] {
        return Ok(Value::unknown(typ.clone()));
    }
    let refinements = Refinements::decode(body, typ, path)?;
    Value::unknown_refined(typ.clone(), refinements)
}

fn expect_array(raw: rmpv::Value, path: &AttributePath, typ: &Type) -> Result<Vec<rmpv::Value>, Error> {
    match raw {
        rmpv::Value::Array(items) => Ok(items),
        other => Err(unexpected(path, typ, &other)),
    }
}

fn expect_map(
    raw: rmpv::Value,
    path: &AttributePath,
    typ: &Type,
) -> Result<Vec<(rmpv::Value, rmpv::Value)>, Error> {
    match raw {
        rmpv::Value::Map(entries) => Ok(entries),
        other => Err(unexpected(path, typ, &other)),
    }
}

fn map_key(key: rmpv::Value, path: &AttributePath) -> Result<String, Error> {
    match key {
        rmpv::Value::String(s) => s
            .into_str()
            .ok_or_else(|| Error::value(path, "map key is not valid UTF-8")),
        other => Err(Error::value(
            path,
            format!("map keys must be strings, found {}", describe(&other)),
        )),
    }
}

fn unexpected(path: &AttributePath, typ: &Type, raw: &rmpv::Value) -> Error {
    Error::value(path, format!("expected {}, found {}", typ, describe(raw)))
}

fn describe(raw: &rmpv::Value) -> &'static str {
    match raw {
        rmpv::Value::Nil => "nil",
        rmpv::Value::Boolean(_) => "bool",
        rmpv::Value::Integer(_) => "integer",
        rmpv::Value::F32(_) | rmpv::Value::F64(_) => "float",
        rmpv::Value::String(_) => "string",
        rmpv::Value::Binary(_) => "binary",
        rmpv::Value::Array(_) => "array",
        rmpv::Value::Map(_) => "map",
        rmpv::Value::Ext(_, _) => "extension",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftypes::{Nullness, Refinement};

    fn roundtrip(value: &Value, typ: &Type) -> Value {
        let bytes = value.to_msgpack(typ).unwrap();
        Value::from_msgpack(&bytes, typ).unwrap()
    }

    #[test]
    fn test_primitives_roundtrip() {
        for (value, typ) in [
            (Value::string("hello"), Type::String),
            (Value::bool(true), Type::Bool),
            (Value::number(42), Type::Number),
            (Value::number("-0.125".parse::<Number>().unwrap()), Type::Number),
            (Value::null(Type::String), Type::String),
        ] {
            assert_eq!(roundtrip(&value, &typ), value);
        }
    }

    #[test]
    fn test_null_and_unknown_bytes() {
        assert_eq!(Value::null(Type::String).to_msgpack(&Type::String).unwrap(), vec![0xc0]);
        assert_eq!(
            Value::unknown(Type::String).to_msgpack(&Type::String).unwrap(),
            vec![0xd4, 0x00, 0x00]
        );
    }

    #[test]
    fn test_number_encodings() {
        let n = Value::number(7);
        assert_eq!(n.to_msgpack(&Type::Number).unwrap(), vec![0x07]);

        let precise: Number = "3.14159265358979323846264338327950288".parse().unwrap();
        let bytes = Value::number(precise.clone()).to_msgpack(&Type::Number).unwrap();
        let raw = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        assert!(raw.is_str());
        let back = Value::from_msgpack(&bytes, &Type::Number).unwrap();
        assert_eq!(back.as_number(), Some(&precise));
    }

    #[test]
    fn test_huge_exponent_encodes_as_string() {
        let huge: Number = "1e2000000".parse().unwrap();
        let bytes = Value::number(huge).to_msgpack(&Type::Number).unwrap();
        let raw = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        assert!(raw.is_str());
    }

    #[test]
    fn test_decode_accepts_any_numeric_encoding() {
        for raw in [
            rmpv::Value::from(5u64),
            rmpv::Value::F32(5.0),
            rmpv::Value::F64(5.0),
            rmpv::Value::from("5"),
        ] {
            let mut buf = Vec::new();
            rmpv::encode::write_value(&mut buf, &raw).unwrap();
            let v = Value::from_msgpack(&buf, &Type::Number).unwrap();
            assert_eq!(v, Value::number(5));
        }
    }

    #[test]
    fn test_infinity_roundtrip() {
        let v = Value::number(Number::PosInfinity);
        assert_eq!(roundtrip(&v, &Type::Number), v);
    }

    #[test]
    fn test_collections_roundtrip() {
        let typ = Type::object([
            ("tags", Type::map(Type::String)),
            ("ports", Type::list(Type::Number)),
            ("names", Type::set(Type::String)),
            ("pair", Type::tuple([Type::String, Type::Bool])),
        ]);
        let value = Value::object(
            typ.clone(),
            [
                (
                    "tags",
                    Value::map(Type::String, [("b", Value::string("2")), ("a", Value::string("1"))])
                        .unwrap(),
                ),
                (
                    "ports",
                    Value::list(Type::Number, vec![Value::number(80), Value::number(443)]).unwrap(),
                ),
                (
                    "names",
                    Value::set(Type::String, vec![Value::string("x"), Value::string("y")]).unwrap(),
                ),
                (
                    "pair",
                    Value::tuple(vec![Value::string("k"), Value::bool(false)]),
                ),
            ],
        )
        .unwrap();
        assert_eq!(roundtrip(&value, &typ), value);
    }

    #[test]
    fn test_dynamic_value_is_wrapped_with_type() {
        let typ = Type::object([("any", Type::DynamicPseudoType)]);
        let value = Value::object(typ.clone(), [("any", Value::string("x"))]).unwrap();
        let bytes = value.to_msgpack(&typ).unwrap();

        let raw = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        let pair = raw.as_map().unwrap()[0].1.as_array().unwrap().clone();
        assert_eq!(pair[0], rmpv::Value::Binary(b"\"string\"".to_vec()));
        assert_eq!(pair[1], rmpv::Value::from("x"));

        assert_eq!(Value::from_msgpack(&bytes, &typ).unwrap(), value);
    }

    #[test]
    fn test_dynamic_list_resolves_element_type() {
        let typ = Type::list(Type::DynamicPseudoType);
        let value = Value::list(Type::DynamicPseudoType, vec![Value::number(1)]).unwrap();
        let decoded = roundtrip(&value, &typ);
        assert_eq!(decoded.typ(), &Type::list(Type::Number));
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_dynamic_null_and_unknown_keep_their_type() {
        let typ = Type::object([("any", Type::DynamicPseudoType)]);
        for inner in [Value::null(Type::String), Value::unknown(Type::String)] {
            let value = Value::object(typ.clone(), [("any", inner.clone())]).unwrap();
            let bytes = value.to_msgpack(&typ).unwrap();

            let raw = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
            let pair = raw.as_map().unwrap()[0].1.as_array().unwrap().clone();
            assert_eq!(pair[0], rmpv::Value::Binary(b"\"string\"".to_vec()));

            let decoded = Value::from_msgpack(&bytes, &typ).unwrap();
            let any = decoded.attribute("any").unwrap();
            assert_eq!(any.typ(), &Type::String);
            assert_eq!(any, &inner);
        }
    }

    #[test]
    fn test_untyped_dynamic_null_is_bare() {
        let value = Value::null(Type::DynamicPseudoType);
        assert_eq!(value.to_msgpack(&Type::DynamicPseudoType).unwrap(), vec![0xc0]);
        assert_eq!(
            Value::unknown(Type::DynamicPseudoType)
                .to_msgpack(&Type::DynamicPseudoType)
                .unwrap(),
            vec![0xd4, 0x00, 0x00]
        );
    }

    #[test]
    fn test_unknown_with_refinements_roundtrip() {
        let value = Value::unknown(Type::String)
            .refine(Refinement::Nullness(Nullness::DefinitelyNotNull))
            .unwrap()
            .refine(Refinement::StringPrefix("arn:".into()))
            .unwrap();
        assert_eq!(roundtrip(&value, &Type::String), value);
    }

    #[test]
    fn test_refined_unknown_extension_accepted() {
        let body = Refinements::new()
            .with(Refinement::CollectionLengthLowerBound(2))
            .encode()
            .unwrap();
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &rmpv::Value::Ext(12, body)).unwrap();

        let typ = Type::list(Type::String);
        let value = Value::from_msgpack(&buf, &typ).unwrap();
        assert!(value.is_unknown());
        assert_eq!(value.refinements().map(Refinements::len), Some(1));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &rmpv::Value::Ext(5, vec![1])).unwrap();
        let err = Value::from_msgpack(&buf, &Type::String).unwrap_err();
        assert!(matches!(err, Error::UnknownExtension(5)));
    }

    #[test]
    fn test_invalid_utf8_string_rejected() {
        // str8 header with two bytes of invalid UTF-8
        let bytes = [0xd9, 0x02, 0xff, 0xfe];
        assert!(Value::from_msgpack(&bytes, &Type::String).is_err());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let bytes = Value::string("x").to_msgpack(&Type::String).unwrap();
        assert!(Value::from_msgpack(&bytes, &Type::Bool).is_err());
        assert!(Value::string("x").to_msgpack(&Type::Number).is_err());
    }

    #[test]
    fn test_object_missing_attribute_decodes_as_null() {
        let mut buf = Vec::new();
        let raw = rmpv::Value::Map(vec![(rmpv::Value::from("a"), rmpv::Value::from("x"))]);
        rmpv::encode::write_value(&mut buf, &raw).unwrap();

        let typ = Type::object([("a", Type::String), ("b", Type::Number)]);
        let value = Value::from_msgpack(&buf, &typ).unwrap();
        assert!(value.attribute("b").unwrap().is_null());
    }
}
