use std::collections::BTreeMap;
use std::fmt;

use super::{AttributePath, AttributePathStep, Error, Number, Refinement, Refinements, Type};

/// The payload of a known value.
#[derive(Debug, Clone, PartialEq)]
pub enum Known {
    /// A string.
    String(String),
    /// A number.
    Number(Number),
    /// A boolean.
    Bool(bool),
    /// The elements of a list, set, or tuple.
    Sequence(Vec<Value>),
    /// The elements of a map or the attributes of an object.
    Entries(BTreeMap<String, Value>),
}

impl Known {
    fn kind(&self) -> &'static str {
        match self {
            Known::String(_) => "string",
            Known::Number(_) => "number",
            Known::Bool(_) => "bool",
            Known::Sequence(_) => "sequence",
            Known::Entries(_) => "mapping",
        }
    }
}

/// Whether a value is known, null, or not yet known.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueState {
    /// A concrete payload.
    Known(Known),
    /// The typed null.
    Null,
    /// Not yet known, possibly with refinements.
    Unknown(Refinements),
}

/// A typed value.
///
/// Values are immutable and always conform to their type. A known value never
/// has type `DynamicPseudoType`: the concrete type of whatever was bound
/// replaces it. Collections whose element type is dynamic take the common
/// type of their elements.
#[derive(Debug, Clone)]
pub struct Value {
    typ: Type,
    state: ValueState,
}

impl Value {
    /// Construct a known value, checking that `known` conforms to `typ`.
    ///
    /// Object attributes marked optional in `typ` may be omitted and are
    /// filled with nulls.
    pub fn new(typ: Type, known: Known) -> Result<Value, Error> {
        Self::new_at(typ, known, &AttributePath::new())
    }

    pub(crate) fn new_at(typ: Type, known: Known, path: &AttributePath) -> Result<Value, Error> {
        let mismatch = |typ: &Type, known: &Known| {
            Error::value(
                path,
                format!("a {} payload cannot be used as {}", known.kind(), typ),
            )
        };

        match known {
            Known::String(_) | Known::Number(_) | Known::Bool(_) => {
                let conforms = matches!(
                    (&typ, &known),
                    (Type::String, Known::String(_))
                        | (Type::Number, Known::Number(_))
                        | (Type::Bool, Known::Bool(_))
                );
                if !conforms {
                    return Err(mismatch(&typ, &known));
                }
                Ok(Value {
                    typ,
                    state: ValueState::Known(known),
                })
            },
            Known::Sequence(elements) => {
                let typ = match typ {
                    Type::List(elem) => {
                        let steps = indexed(&elements);
                        Type::list(resolve_element_type(*elem, steps, path)?)
                    },
                    Type::Set(elem) => {
                        let steps = elements
                            .iter()
                            .map(|v| (AttributePathStep::ElementKeyValue(v.clone()), v));
                        Type::set(resolve_element_type(*elem, steps, path)?)
                    },
                    Type::Tuple(types) => {
                        if types.len() != elements.len() {
                            return Err(Error::value(
                                path,
                                format!(
                                    "tuple has {} elements, its type declares {}",
                                    elements.len(),
                                    types.len()
                                ),
                            ));
                        }
                        for (i, (v, t)) in elements.iter().zip(&types).enumerate() {
                            if !v.typ.usable_as(t) {
                                return Err(Error::value(
                                    &path.clone().with_element_key_int(i as i64),
                                    format!("{} is not usable as {}", v.typ, t),
                                ));
                            }
                        }
                        Type::Tuple(types)
                    },
                    other => return Err(mismatch(&other, &Known::Sequence(elements))),
                };
                Ok(Value {
                    typ,
                    state: ValueState::Known(Known::Sequence(elements)),
                })
            },
            Known::Entries(mut entries) => {
                let typ = match typ {
                    Type::Map(elem) => {
                        let steps = entries
                            .iter()
                            .map(|(k, v)| (AttributePathStep::ElementKeyString(k.clone()), v));
                        Type::map(resolve_element_type(*elem, steps, path)?)
                    },
                    Type::Object {
                        attribute_types,
                        optional_attributes,
                    } => {
                        if let Some(extra) = entries.keys().find(|k| !attribute_types.contains_key(*k))
                        {
                            return Err(Error::value(
                                &path.clone().with_attribute_name(extra.clone()),
                                "unexpected attribute",
                            ));
                        }
                        for (name, t) in &attribute_types {
                            let attr_path = path.clone().with_attribute_name(name.clone());
                            match entries.get(name) {
                                Some(v) if !v.typ.usable_as(t) => {
                                    return Err(Error::value(
                                        &attr_path,
                                        format!("{} is not usable as {}", v.typ, t),
                                    ));
                                },
                                Some(_) => {},
                                None if optional_attributes.contains(name) => {
                                    entries.insert(name.clone(), Value::null(t.clone()));
                                },
                                None => {
                                    return Err(Error::value(
                                        &attr_path,
                                        "required attribute is missing",
                                    ));
                                },
                            }
                        }
                        Type::Object {
                            attribute_types,
                            optional_attributes,
                        }
                    },
                    other => return Err(mismatch(&other, &Known::Entries(entries))),
                };
                Ok(Value {
                    typ,
                    state: ValueState::Known(Known::Entries(entries)),
                })
            },
        }
    }

    /// The typed null.
    pub fn null(typ: Type) -> Value {
        Value {
            typ,
            state: ValueState::Null,
        }
    }

    /// An unknown value with no refinements.
    pub fn unknown(typ: Type) -> Value {
        Value {
            typ,
            state: ValueState::Unknown(Refinements::new()),
        }
    }

    /// An unknown value with refinements. Every refinement must apply to `typ`.
    pub fn unknown_refined(typ: Type, refinements: Refinements) -> Result<Value, Error> {
        refinements.check(&typ, &AttributePath::new())?;
        Ok(Value {
            typ,
            state: ValueState::Unknown(refinements),
        })
    }

    /// A known string.
    pub fn string(s: impl Into<String>) -> Value {
        Value {
            typ: Type::String,
            state: ValueState::Known(Known::String(s.into())),
        }
    }

    /// A known number.
    pub fn number(n: impl Into<Number>) -> Value {
        Value {
            typ: Type::Number,
            state: ValueState::Known(Known::Number(n.into())),
        }
    }

    /// A known boolean.
    pub fn bool(b: bool) -> Value {
        Value {
            typ: Type::Bool,
            state: ValueState::Known(Known::Bool(b)),
        }
    }

    /// A known list.
    pub fn list(element_type: Type, elements: Vec<Value>) -> Result<Value, Error> {
        Value::new(Type::list(element_type), Known::Sequence(elements))
    }

    /// A known set.
    pub fn set(element_type: Type, elements: Vec<Value>) -> Result<Value, Error> {
        Value::new(Type::set(element_type), Known::Sequence(elements))
    }

    /// A known map.
    pub fn map<K: Into<String>>(
        element_type: Type,
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Value, Error> {
        Value::new(
            Type::map(element_type),
            Known::Entries(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        )
    }

    /// A known object of the given object type.
    pub fn object<K: Into<String>>(
        typ: Type,
        attributes: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Value, Error> {
        Value::new(
            typ,
            Known::Entries(attributes.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        )
    }

    /// A known object whose type is taken from its attribute values.
    pub fn from_attributes<K: Into<String>>(attributes: impl IntoIterator<Item = (K, Value)>) -> Value {
        let entries: BTreeMap<String, Value> =
            attributes.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let typ = Type::object(entries.iter().map(|(k, v)| (k.clone(), v.typ.clone())));
        Value {
            typ,
            state: ValueState::Known(Known::Entries(entries)),
        }
    }

    /// A known tuple whose type is taken from its elements.
    pub fn tuple(elements: Vec<Value>) -> Value {
        let typ = Type::tuple(elements.iter().map(|v| v.typ.clone()));
        Value {
            typ,
            state: ValueState::Known(Known::Sequence(elements)),
        }
    }

    /// Return a copy of this unknown value with one more refinement.
    pub fn refine(self, refinement: Refinement) -> Result<Value, Error> {
        let root = AttributePath::new();
        match self.state {
            ValueState::Unknown(refinements) => {
                let refinements = refinements.with(refinement);
                refinements.check(&self.typ, &root)?;
                Ok(Value {
                    typ: self.typ,
                    state: ValueState::Unknown(refinements),
                })
            },
            _ => Err(Error::value(&root, "only unknown values can be refined")),
        }
    }

    /// The value's type.
    pub fn typ(&self) -> &Type {
        &self.typ
    }

    /// The value's state.
    pub fn state(&self) -> &ValueState {
        &self.state
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.state, ValueState::Null)
    }

    /// Whether the value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self.state, ValueState::Unknown(_))
    }

    /// Whether the value is known (it may still contain unknown elements).
    pub fn is_known(&self) -> bool {
        matches!(self.state, ValueState::Known(_))
    }

    /// Whether neither the value nor anything inside it is unknown.
    pub fn is_fully_known(&self) -> bool {
        match &self.state {
            ValueState::Unknown(_) => false,
            ValueState::Null => true,
            ValueState::Known(Known::Sequence(elements)) => {
                elements.iter().all(Value::is_fully_known)
            },
            ValueState::Known(Known::Entries(entries)) => {
                entries.values().all(Value::is_fully_known)
            },
            ValueState::Known(_) => true,
        }
    }

    /// The refinements of an unknown value.
    pub fn refinements(&self) -> Option<&Refinements> {
        match &self.state {
            ValueState::Unknown(r) => Some(r),
            _ => None,
        }
    }

    /// The string payload.
    pub fn as_str(&self) -> Option<&str> {
        match &self.state {
            ValueState::Known(Known::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The number payload.
    pub fn as_number(&self) -> Option<&Number> {
        match &self.state {
            ValueState::Known(Known::Number(n)) => Some(n),
            _ => None,
        }
    }

    /// The boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match &self.state {
            ValueState::Known(Known::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// The elements of a known list, set, or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match &self.state {
            ValueState::Known(Known::Sequence(elements)) => Some(elements),
            _ => None,
        }
    }

    /// The entries of a known map or object.
    pub fn entries(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.state {
            ValueState::Known(Known::Entries(entries)) => Some(entries),
            _ => None,
        }
    }

    /// An attribute of a known object.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        match self.typ {
            Type::Object { .. } => self.entries().and_then(|e| e.get(name)),
            _ => None,
        }
    }

    /// Follow a path from this value.
    pub fn at_path(&self, path: &AttributePath) -> Result<&Value, Error> {
        let mut current = self;
        for (i, step) in path.steps().iter().enumerate() {
            current = current.step(step).ok_or_else(|| {
                let here = AttributePath::from_steps(path.steps()[..=i].iter().cloned());
                Error::value(&here, format!("step does not exist in {}", current.typ))
            })?;
        }
        Ok(current)
    }

    fn step(&self, step: &AttributePathStep) -> Option<&Value> {
        match (&self.typ, step) {
            (Type::Object { .. }, AttributePathStep::AttributeName(name)) => {
                self.entries()?.get(name)
            },
            (Type::Map(_), AttributePathStep::ElementKeyString(key)) => self.entries()?.get(key),
            (Type::List(_) | Type::Tuple(_), AttributePathStep::ElementKeyInt(idx)) => {
                let idx = usize::try_from(*idx).ok()?;
                self.elements()?.get(idx)
            },
            (Type::Set(_), AttributePathStep::ElementKeyValue(v)) => {
                self.elements()?.iter().find(|e| *e == v)
            },
            _ => None,
        }
    }
}

fn indexed(elements: &[Value]) -> impl Iterator<Item = (AttributePathStep, &Value)> {
    elements
        .iter()
        .enumerate()
        .map(|(i, v)| (AttributePathStep::ElementKeyInt(i as i64), v))
}

/// Check every element against `declared` and, when `declared` is dynamic,
/// settle on the single concrete type the elements share.
fn resolve_element_type<'a>(
    declared: Type,
    elements: impl Iterator<Item = (AttributePathStep, &'a Value)>,
    path: &AttributePath,
) -> Result<Type, Error> {
    let mut resolved: Option<Type> = None;
    for (step, v) in elements {
        let elem_path = path.clone().with_step(step);
        if !v.typ.usable_as(&declared) {
            return Err(Error::value(
                &elem_path,
                format!("{} is not usable as {}", v.typ, declared),
            ));
        }
        if !declared.has_dynamic() || v.typ.has_dynamic() {
            continue;
        }
        match &resolved {
            None => resolved = Some(v.typ.clone()),
            Some(t) if *t == v.typ => {},
            Some(t) => {
                return Err(Error::value(
                    &elem_path,
                    format!("collection elements must share one type, found {} and {}", t, v.typ),
                ));
            },
        }
    }
    Ok(resolved.unwrap_or(declared))
}

fn set_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for x in a {
        match (0..b.len()).find(|&i| !used[i] && b[i] == *x) {
            Some(i) => used[i] = true,
            None => return false,
        }
    }
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.typ != other.typ {
            return false;
        }
        match (&self.state, &other.state) {
            (ValueState::Known(Known::Sequence(a)), ValueState::Known(Known::Sequence(b)))
                if matches!(self.typ, Type::Set(_)) =>
            {
                set_eq(a, b)
            },
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<", self.typ)?;
        match &self.state {
            ValueState::Null => f.write_str("null")?,
            ValueState::Unknown(_) => f.write_str("unknown")?,
            ValueState::Known(Known::String(s)) => write!(f, "{:?}", s)?,
            ValueState::Known(Known::Number(n)) => write!(f, "\"{}\"", n)?,
            ValueState::Known(Known::Bool(b)) => write!(f, "\"{}\"", b)?,
            ValueState::Known(Known::Sequence(elements)) => {
                for (i, v) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
            },
            ValueState::Known(Known::Entries(entries)) => {
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}:{}", k, v)?;
                }
            },
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftypes::Nullness;

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::string(*s)).collect()
    }

    #[test]
    fn test_primitive_conformance() {
        assert!(Value::new(Type::String, Known::String("a".into())).is_ok());
        assert!(Value::new(Type::Number, Known::String("a".into())).is_err());
        assert!(Value::new(Type::DynamicPseudoType, Known::Bool(true)).is_err());
    }

    #[test]
    fn test_list_element_type_checked() {
        let err = Value::list(Type::String, vec![Value::string("a"), Value::number(1)])
            .unwrap_err();
        match err {
            Error::Value { path, .. } => {
                assert_eq!(path, AttributePath::new().with_element_key_int(1));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dynamic_collection_takes_element_type() {
        let list = Value::list(Type::DynamicPseudoType, strings(&["a", "b"])).unwrap();
        assert_eq!(list.typ(), &Type::list(Type::String));

        let empty = Value::list(Type::DynamicPseudoType, vec![]).unwrap();
        assert_eq!(empty.typ(), &Type::list(Type::DynamicPseudoType));
    }

    #[test]
    fn test_dynamic_collection_must_be_homogeneous() {
        let result = Value::list(
            Type::DynamicPseudoType,
            vec![Value::string("a"), Value::bool(true)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_object_optional_attributes_filled_with_null() {
        let typ = Type::object([("name", Type::String), ("note", Type::String)])
            .with_optional_attributes(["note"]);
        let value = Value::object(typ, [("name", Value::string("x"))]).unwrap();
        assert!(value.attribute("note").unwrap().is_null());
        assert_eq!(value.attribute("note").unwrap().typ(), &Type::String);
    }

    #[test]
    fn test_object_missing_and_extra_attributes() {
        let typ = Type::object([("name", Type::String)]);
        assert!(Value::object(typ.clone(), Vec::<(String, Value)>::new()).is_err());
        assert!(Value::object(
            typ,
            [("name", Value::string("x")), ("other", Value::string("y"))]
        )
        .is_err());
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Value::set(Type::String, strings(&["a", "b"])).unwrap();
        let b = Value::set(Type::String, strings(&["b", "a"])).unwrap();
        assert_eq!(a, b);

        let la = Value::list(Type::String, strings(&["a", "b"])).unwrap();
        let lb = Value::list(Type::String, strings(&["b", "a"])).unwrap();
        assert_ne!(la, lb);
    }

    #[test]
    fn test_unknown_equality_uses_refinements() {
        let plain = Value::unknown(Type::String);
        let refined = Value::unknown(Type::String)
            .refine(Refinement::Nullness(Nullness::DefinitelyNotNull))
            .unwrap();
        assert_eq!(plain, Value::unknown(Type::String));
        assert_ne!(plain, refined);
        assert_ne!(Value::unknown(Type::String), Value::unknown(Type::Number));
    }

    #[test]
    fn test_refine_rejects_known_and_inapplicable() {
        assert!(Value::string("x")
            .refine(Refinement::StringPrefix("x".into()))
            .is_err());
        assert!(Value::unknown(Type::Bool)
            .refine(Refinement::StringPrefix("x".into()))
            .is_err());
        assert!(Value::unknown_refined(
            Type::Number,
            Refinements::new().with(Refinement::CollectionLengthLowerBound(1))
        )
        .is_err());
    }

    #[test]
    fn test_at_path() {
        let tags = Value::map(Type::String, [("env", Value::string("prod"))]).unwrap();
        let ports = Value::list(Type::Number, vec![Value::number(80), Value::number(443)]).unwrap();
        let names = Value::set(Type::String, strings(&["a", "b"])).unwrap();
        let root = Value::from_attributes([("tags", tags), ("ports", ports), ("names", names)]);

        let env = root
            .at_path(&AttributePath::root("tags").with_element_key_string("env"))
            .unwrap();
        assert_eq!(env.as_str(), Some("prod"));

        let port = root
            .at_path(&AttributePath::root("ports").with_element_key_int(1))
            .unwrap();
        assert_eq!(port.as_number().and_then(Number::as_i64), Some(443));

        let member = root
            .at_path(&AttributePath::root("names").with_element_key_value(Value::string("b")))
            .unwrap();
        assert_eq!(member.as_str(), Some("b"));

        let missing = AttributePath::root("ports").with_element_key_int(5);
        assert!(root.at_path(&missing).is_err());
        assert!(root.at_path(&AttributePath::root("nope")).is_err());
    }

    #[test]
    fn test_is_fully_known() {
        let partial = Value::from_attributes([
            ("id", Value::unknown(Type::String)),
            ("name", Value::string("x")),
        ]);
        assert!(partial.is_known());
        assert!(!partial.is_fully_known());
        assert!(Value::null(Type::String).is_fully_known());
    }

    #[test]
    fn test_display() {
        let v = Value::list(Type::String, strings(&["a"])).unwrap();
        assert_eq!(
            v.to_string(),
            "tftypes.List[tftypes.String]<tftypes.String<\"a\">>"
        );
        assert_eq!(Value::null(Type::Bool).to_string(), "tftypes.Bool<null>");
    }
}
