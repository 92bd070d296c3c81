use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Error;

/// A type in the closed type algebra.
///
/// Equality is structural: two object types are equal only when their
/// attribute types and their optional attribute sets are both equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A UTF-8 string.
    String,
    /// An arbitrary-precision number.
    Number,
    /// A boolean.
    Bool,
    /// A placeholder resolved by the first concrete value bound to it.
    DynamicPseudoType,
    /// An ordered sequence of elements of one type.
    List(Box<Type>),
    /// An unordered collection of unique elements of one type.
    Set(Box<Type>),
    /// A string-keyed map of elements of one type.
    Map(Box<Type>),
    /// A fixed set of named attributes, each with its own type.
    Object {
        /// Attribute name to attribute type.
        attribute_types: BTreeMap<String, Type>,
        /// Attributes that may be omitted when constructing a value.
        optional_attributes: BTreeSet<String>,
    },
    /// A fixed-length sequence with a type per position.
    Tuple(Vec<Type>),
}

impl Type {
    /// Create a list type.
    pub fn list(element_type: Type) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: Type) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: Type) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type with no optional attributes.
    pub fn object<K: Into<String>>(attributes: impl IntoIterator<Item = (K, Type)>) -> Self {
        Self::Object {
            attribute_types: attributes.into_iter().map(|(k, t)| (k.into(), t)).collect(),
            optional_attributes: BTreeSet::new(),
        }
    }

    /// Mark attributes of an object type as optional.
    ///
    /// Has no effect on other types.
    pub fn with_optional_attributes<K: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = K>,
    ) -> Self {
        if let Self::Object {
            optional_attributes,
            ..
        } = &mut self
        {
            optional_attributes.extend(names.into_iter().map(Into::into));
        }
        self
    }

    /// Create a tuple type.
    pub fn tuple(element_types: impl IntoIterator<Item = Type>) -> Self {
        Self::Tuple(element_types.into_iter().collect())
    }

    /// Whether the two types are structurally identical.
    pub fn is(&self, other: &Type) -> bool {
        self == other
    }

    /// Whether a value of this type may be assigned where `other` is expected.
    ///
    /// `DynamicPseudoType` on the receiving side accepts anything; otherwise
    /// the types must match structurally.
    pub fn usable_as(&self, other: &Type) -> bool {
        match (self, other) {
            (_, Type::DynamicPseudoType) => true,
            (Type::String, Type::String)
            | (Type::Number, Type::Number)
            | (Type::Bool, Type::Bool) => true,
            (Type::List(a), Type::List(b))
            | (Type::Set(a), Type::Set(b))
            | (Type::Map(a), Type::Map(b)) => a.usable_as(b),
            (
                Type::Object {
                    attribute_types: a, ..
                },
                Type::Object {
                    attribute_types: b, ..
                },
            ) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(name, t)| b.get(name).is_some_and(|other| t.usable_as(other)))
            },
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.usable_as(y))
            },
            _ => false,
        }
    }

    /// String, Number, or Bool.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::String | Type::Number | Type::Bool)
    }

    /// List, Set, or Map.
    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_) | Type::Map(_))
    }

    /// Exactly `DynamicPseudoType`.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::DynamicPseudoType)
    }

    /// Whether the type contains `DynamicPseudoType` anywhere.
    pub fn has_dynamic(&self) -> bool {
        match self {
            Type::DynamicPseudoType => true,
            Type::List(t) | Type::Set(t) | Type::Map(t) => t.has_dynamic(),
            Type::Object {
                attribute_types, ..
            } => attribute_types.values().any(Type::has_dynamic),
            Type::Tuple(ts) => ts.iter().any(Type::has_dynamic),
            _ => false,
        }
    }

    /// The element type of a List, Set, or Map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Set(t) | Type::Map(t) => Some(t),
            _ => None,
        }
    }

    /// The attribute types of an object type.
    pub fn attribute_types(&self) -> Option<&BTreeMap<String, Type>> {
        match self {
            Type::Object {
                attribute_types, ..
            } => Some(attribute_types),
            _ => None,
        }
    }

    /// The canonical JSON form of the type.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse the canonical JSON form of a type.
    pub fn parse_json(bytes: &[u8]) -> Result<Type, Error> {
        let raw: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::InvalidType(e.to_string()))?;
        Type::from_json_value(&raw).map_err(Error::InvalidType)
    }

    fn from_json_value(raw: &serde_json::Value) -> Result<Type, String> {
        use serde_json::Value as J;

        match raw {
            J::String(tag) => match tag.as_str() {
                "string" => Ok(Type::String),
                "number" => Ok(Type::Number),
                "bool" => Ok(Type::Bool),
                "dynamic" => Ok(Type::DynamicPseudoType),
                other => Err(format!("unknown primitive type {:?}", other)),
            },
            J::Array(parts) => {
                let kind = parts
                    .first()
                    .and_then(J::as_str)
                    .ok_or_else(|| "type array must start with a kind string".to_string())?;
                let arg = parts
                    .get(1)
                    .ok_or_else(|| format!("{} type is missing its element type", kind))?;
                match kind {
                    "list" if parts.len() == 2 => Ok(Type::list(Type::from_json_value(arg)?)),
                    "set" if parts.len() == 2 => Ok(Type::set(Type::from_json_value(arg)?)),
                    "map" if parts.len() == 2 => Ok(Type::map(Type::from_json_value(arg)?)),
                    "tuple" if parts.len() == 2 => {
                        let elems = arg
                            .as_array()
                            .ok_or_else(|| "tuple element types must be an array".to_string())?;
                        elems
                            .iter()
                            .map(Type::from_json_value)
                            .collect::<Result<Vec<_>, _>>()
                            .map(Type::Tuple)
                    },
                    "object" if parts.len() == 2 || parts.len() == 3 => {
                        let attrs = arg
                            .as_object()
                            .ok_or_else(|| "object attribute types must be an object".to_string())?;
                        let mut attribute_types = BTreeMap::new();
                        for (name, t) in attrs {
                            attribute_types.insert(name.clone(), Type::from_json_value(t)?);
                        }
                        let mut optional_attributes = BTreeSet::new();
                        if let Some(optional) = parts.get(2) {
                            let names = optional.as_array().ok_or_else(|| {
                                "optional attribute names must be an array".to_string()
                            })?;
                            for name in names {
                                let name = name.as_str().ok_or_else(|| {
                                    "optional attribute names must be strings".to_string()
                                })?;
                                if !attribute_types.contains_key(name) {
                                    return Err(format!(
                                        "optional attribute {:?} is not an attribute of the object",
                                        name
                                    ));
                                }
                                optional_attributes.insert(name.to_string());
                            }
                        }
                        Ok(Type::Object {
                            attribute_types,
                            optional_attributes,
                        })
                    },
                    other => Err(format!(
                        "unknown type kind {:?} with {} arguments",
                        other,
                        parts.len() - 1
                    )),
                }
            },
            other => Err(format!("unexpected JSON in type position: {}", other)),
        }
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Type::String => serializer.serialize_str("string"),
            Type::Number => serializer.serialize_str("number"),
            Type::Bool => serializer.serialize_str("bool"),
            Type::DynamicPseudoType => serializer.serialize_str("dynamic"),
            Type::List(t) => ("list", t).serialize(serializer),
            Type::Set(t) => ("set", t).serialize(serializer),
            Type::Map(t) => ("map", t).serialize(serializer),
            Type::Object {
                attribute_types,
                optional_attributes,
            } => {
                if optional_attributes.is_empty() {
                    ("object", attribute_types).serialize(serializer)
                } else {
                    ("object", attribute_types, optional_attributes).serialize(serializer)
                }
            },
            Type::Tuple(ts) => ("tuple", ts).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Type::from_json_value(&raw).map_err(D::Error::custom)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => f.write_str("tftypes.String"),
            Type::Number => f.write_str("tftypes.Number"),
            Type::Bool => f.write_str("tftypes.Bool"),
            Type::DynamicPseudoType => f.write_str("tftypes.DynamicPseudoType"),
            Type::List(t) => write!(f, "tftypes.List[{}]", t),
            Type::Set(t) => write!(f, "tftypes.Set[{}]", t),
            Type::Map(t) => write!(f, "tftypes.Map[{}]", t),
            Type::Object {
                attribute_types,
                optional_attributes,
            } => {
                f.write_str("tftypes.Object[")?;
                for (i, (name, t)) in attribute_types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}:{}", name, t)?;
                }
                f.write_str("]")?;
                if !optional_attributes.is_empty() {
                    let names: Vec<_> = optional_attributes.iter().collect();
                    write!(f, "?{:?}", names)?;
                }
                Ok(())
            },
            Type::Tuple(ts) => {
                f.write_str("tftypes.Tuple[")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str("]")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_json() {
        assert_eq!(Type::String.to_json_bytes(), b"\"string\"");
        assert_eq!(Type::Number.to_json_bytes(), b"\"number\"");
        assert_eq!(Type::Bool.to_json_bytes(), b"\"bool\"");
        assert_eq!(Type::DynamicPseudoType.to_json_bytes(), b"\"dynamic\"");
    }

    #[test]
    fn test_composite_json() {
        let typ = Type::list(Type::map(Type::String));
        assert_eq!(
            String::from_utf8(typ.to_json_bytes()).unwrap(),
            r#"["list",["map","string"]]"#
        );

        let typ = Type::tuple([Type::Bool, Type::set(Type::Number)]);
        assert_eq!(
            String::from_utf8(typ.to_json_bytes()).unwrap(),
            r#"["tuple",["bool",["set","number"]]]"#
        );
    }

    #[test]
    fn test_object_json_optional_only_when_present() {
        let typ = Type::object([("a", Type::String), ("b", Type::Number)]);
        assert_eq!(
            String::from_utf8(typ.to_json_bytes()).unwrap(),
            r#"["object",{"a":"string","b":"number"}]"#
        );

        let typ = typ.with_optional_attributes(["b"]);
        assert_eq!(
            String::from_utf8(typ.to_json_bytes()).unwrap(),
            r#"["object",{"a":"string","b":"number"},["b"]]"#
        );
    }

    #[test]
    fn test_parse_json() {
        let typ = Type::parse_json(br#"["object",{"id":"string","tags":["map","string"]},["tags"]]"#)
            .unwrap();
        assert_eq!(
            typ,
            Type::object([("id", Type::String), ("tags", Type::map(Type::String))])
                .with_optional_attributes(["tags"])
        );

        assert_eq!(
            Type::parse_json(br#"["list","dynamic"]"#).unwrap(),
            Type::list(Type::DynamicPseudoType)
        );
    }

    #[test]
    fn test_parse_json_errors() {
        assert!(Type::parse_json(b"\"float\"").is_err());
        assert!(Type::parse_json(br#"["list"]"#).is_err());
        assert!(Type::parse_json(br#"["object",{"a":"string"},["b"]]"#).is_err());
        assert!(Type::parse_json(b"42").is_err());
        assert!(Type::parse_json(b"not json").is_err());
    }

    #[test]
    fn test_equality_includes_optional_attributes() {
        let a = Type::object([("x", Type::String)]);
        let b = Type::object([("x", Type::String)]).with_optional_attributes(["x"]);
        assert!(!a.is(&b));
        assert!(a.is(&a.clone()));
    }

    #[test]
    fn test_usable_as() {
        assert!(Type::String.usable_as(&Type::DynamicPseudoType));
        assert!(Type::list(Type::String).usable_as(&Type::list(Type::DynamicPseudoType)));
        assert!(!Type::list(Type::String).usable_as(&Type::set(Type::String)));
        assert!(!Type::DynamicPseudoType.usable_as(&Type::String));

        let obj = Type::object([("a", Type::String)]);
        assert!(obj.usable_as(&Type::object([("a", Type::DynamicPseudoType)])));
        assert!(!obj.usable_as(&Type::object([("b", Type::String)])));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Type::list(Type::String).to_string(),
            "tftypes.List[tftypes.String]"
        );
        assert_eq!(
            Type::object([("a", Type::Bool)]).to_string(),
            "tftypes.Object[\"a\":tftypes.Bool]"
        );
    }

    #[test]
    fn test_serde_roundtrip_through_struct() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(rename = "type")]
            typ: Type,
        }

        let json = r#"{"type":["map",["tuple",["string","bool"]]]}"#;
        let parsed: Wrapper = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.typ,
            Type::map(Type::tuple([Type::String, Type::Bool]))
        );
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }
}
