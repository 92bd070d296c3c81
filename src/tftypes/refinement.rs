//! Refinements narrow what an unknown value can eventually become.

use std::collections::BTreeMap;

use super::msgpack::{number_from_msgpack, number_to_msgpack};
use super::{AttributePath, Error, Number, Type};

/// Longest string prefix kept when encoding, in bytes.
pub const MAX_STRING_PREFIX_LENGTH: usize = 256;

/// Largest encoded refinement set, in bytes.
pub const MAX_REFINEMENTS_LENGTH: usize = 1024;

/// Wire key of each refinement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefinementKey {
    /// Whether the value will be null.
    Nullness = 1,
    /// A known leading substring.
    StringPrefix = 2,
    /// Lower bound of a number.
    NumberLowerBound = 3,
    /// Upper bound of a number.
    NumberUpperBound = 4,
    /// Lower bound of a collection's length.
    CollectionLengthLowerBound = 5,
    /// Upper bound of a collection's length.
    CollectionLengthUpperBound = 6,
}

impl RefinementKey {
    fn from_wire(key: i64) -> Option<Self> {
        match key {
            1 => Some(Self::Nullness),
            2 => Some(Self::StringPrefix),
            3 => Some(Self::NumberLowerBound),
            4 => Some(Self::NumberUpperBound),
            5 => Some(Self::CollectionLengthLowerBound),
            6 => Some(Self::CollectionLengthUpperBound),
            _ => None,
        }
    }
}

/// The nullness refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullness {
    /// The value will be null.
    DefinitelyNull,
    /// The value will not be null.
    DefinitelyNotNull,
}

/// A single constraint on an unknown value.
#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    /// Applies to every type except `DynamicPseudoType`.
    Nullness(Nullness),
    /// Applies to strings.
    StringPrefix(String),
    /// Applies to numbers.
    NumberLowerBound {
        /// The bound.
        bound: Number,
        /// Whether the bound itself is a possible value.
        inclusive: bool,
    },
    /// Applies to numbers.
    NumberUpperBound {
        /// The bound.
        bound: Number,
        /// Whether the bound itself is a possible value.
        inclusive: bool,
    },
    /// Applies to lists, sets, and maps.
    CollectionLengthLowerBound(i64),
    /// Applies to lists, sets, and maps.
    CollectionLengthUpperBound(i64),
}

impl Refinement {
    /// The wire key of this refinement.
    pub fn key(&self) -> RefinementKey {
        match self {
            Refinement::Nullness(_) => RefinementKey::Nullness,
            Refinement::StringPrefix(_) => RefinementKey::StringPrefix,
            Refinement::NumberLowerBound { .. } => RefinementKey::NumberLowerBound,
            Refinement::NumberUpperBound { .. } => RefinementKey::NumberUpperBound,
            Refinement::CollectionLengthLowerBound(_) => RefinementKey::CollectionLengthLowerBound,
            Refinement::CollectionLengthUpperBound(_) => RefinementKey::CollectionLengthUpperBound,
        }
    }

    /// Whether this refinement may be attached to an unknown of `typ`.
    pub fn applies_to(&self, typ: &Type) -> bool {
        match self {
            Refinement::Nullness(_) => !matches!(typ, Type::DynamicPseudoType),
            Refinement::StringPrefix(_) => matches!(typ, Type::String),
            Refinement::NumberLowerBound { .. } | Refinement::NumberUpperBound { .. } => {
                matches!(typ, Type::Number)
            },
            Refinement::CollectionLengthLowerBound(_)
            | Refinement::CollectionLengthUpperBound(_) => typ.is_collection(),
        }
    }

    fn to_msgpack(&self) -> rmpv::Value {
        match self {
            Refinement::Nullness(n) => rmpv::Value::Boolean(*n == Nullness::DefinitelyNull),
            Refinement::StringPrefix(prefix) => {
                rmpv::Value::from(truncate_prefix(prefix, MAX_STRING_PREFIX_LENGTH))
            },
            Refinement::NumberLowerBound { bound, inclusive }
            | Refinement::NumberUpperBound { bound, inclusive } => rmpv::Value::Array(vec![
                number_to_msgpack(bound),
                rmpv::Value::Boolean(*inclusive),
            ]),
            Refinement::CollectionLengthLowerBound(n)
            | Refinement::CollectionLengthUpperBound(n) => rmpv::Value::from(*n),
        }
    }

    fn from_msgpack(
        key: RefinementKey,
        raw: &rmpv::Value,
        path: &AttributePath,
    ) -> Result<Refinement, Error> {
        let malformed = || Error::MsgPack(format!("malformed {:?} refinement", key));
        match key {
            RefinementKey::Nullness => {
                let is_null = raw.as_bool().ok_or_else(malformed)?;
                Ok(Refinement::Nullness(if is_null {
                    Nullness::DefinitelyNull
                } else {
                    Nullness::DefinitelyNotNull
                }))
            },
            RefinementKey::StringPrefix => {
                let prefix = raw.as_str().ok_or_else(malformed)?;
                Ok(Refinement::StringPrefix(prefix.to_string()))
            },
            RefinementKey::NumberLowerBound | RefinementKey::NumberUpperBound => {
                let pair = raw.as_array().filter(|a| a.len() == 2).ok_or_else(malformed)?;
                let bound = number_from_msgpack(&pair[0], path)?;
                let inclusive = pair[1].as_bool().ok_or_else(malformed)?;
                Ok(if key == RefinementKey::NumberLowerBound {
                    Refinement::NumberLowerBound { bound, inclusive }
                } else {
                    Refinement::NumberUpperBound { bound, inclusive }
                })
            },
            RefinementKey::CollectionLengthLowerBound => Ok(
                Refinement::CollectionLengthLowerBound(raw.as_i64().ok_or_else(malformed)?),
            ),
            RefinementKey::CollectionLengthUpperBound => Ok(
                Refinement::CollectionLengthUpperBound(raw.as_i64().ok_or_else(malformed)?),
            ),
        }
    }
}

/// The refinements attached to an unknown value, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinements(BTreeMap<RefinementKey, Refinement>);

impl Refinements {
    /// An empty refinement set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a refinement, replacing any existing one of the same kind.
    pub fn with(mut self, refinement: Refinement) -> Self {
        self.insert(refinement);
        self
    }

    /// Add a refinement, returning the one it replaced.
    pub fn insert(&mut self, refinement: Refinement) -> Option<Refinement> {
        self.0.insert(refinement.key(), refinement)
    }

    /// The refinement of the given kind.
    pub fn get(&self, key: RefinementKey) -> Option<&Refinement> {
        self.0.get(&key)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Refinement> {
        self.0.values()
    }

    /// Number of refinements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no refinements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nullness refinement, if present.
    pub fn nullness(&self) -> Option<Nullness> {
        match self.get(RefinementKey::Nullness) {
            Some(Refinement::Nullness(n)) => Some(*n),
            _ => None,
        }
    }

    /// The string prefix refinement, if present.
    pub fn string_prefix(&self) -> Option<&str> {
        match self.get(RefinementKey::StringPrefix) {
            Some(Refinement::StringPrefix(p)) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn check(&self, typ: &Type, path: &AttributePath) -> Result<(), Error> {
        match self.iter().find(|r| !r.applies_to(typ)) {
            Some(r) => Err(Error::value(
                path,
                format!("{:?} refinement cannot be applied to {}", r.key(), typ),
            )),
            None => Ok(()),
        }
    }

    /// Encode as the body of an unknown-value extension.
    ///
    /// The string prefix is truncated to [`MAX_STRING_PREFIX_LENGTH`]. When the
    /// result is still over [`MAX_REFINEMENTS_LENGTH`], refinements are dropped
    /// in key order, starting with the prefix, until it fits.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut working = self.clone();
        let mut bytes = working.write()?;
        for key in [
            RefinementKey::StringPrefix,
            RefinementKey::NumberLowerBound,
            RefinementKey::NumberUpperBound,
            RefinementKey::CollectionLengthLowerBound,
            RefinementKey::CollectionLengthUpperBound,
        ] {
            if bytes.len() <= MAX_REFINEMENTS_LENGTH {
                break;
            }
            if working.0.remove(&key).is_some() {
                bytes = working.write()?;
            }
        }
        if bytes.len() > MAX_REFINEMENTS_LENGTH {
            return Err(Error::RefinementsTooLarge {
                size: bytes.len(),
                limit: MAX_REFINEMENTS_LENGTH,
            });
        }
        Ok(bytes)
    }

    fn write(&self) -> Result<Vec<u8>, Error> {
        let entries = self
            .0
            .iter()
            .map(|(key, r)| (rmpv::Value::from(*key as i64), r.to_msgpack()))
            .collect();
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &rmpv::Value::Map(entries))
            .map_err(|e| Error::MsgPack(e.to_string()))?;
        Ok(buf)
    }

    /// Decode an unknown-value extension body.
    ///
    /// Unrecognized keys and refinements that do not apply to `typ` are
    /// skipped.
    pub(crate) fn decode(
        body: &[u8],
        typ: &Type,
        path: &AttributePath,
    ) -> Result<Refinements, Error> {
        if body.len() > MAX_REFINEMENTS_LENGTH {
            return Err(Error::RefinementsTooLarge {
                size: body.len(),
                limit: MAX_REFINEMENTS_LENGTH,
            });
        }
        let raw = rmpv::decode::read_value(&mut &body[..])
            .map_err(|e| Error::MsgPack(e.to_string()))?;
        let entries = match raw {
            rmpv::Value::Map(entries) => entries,
            _ => return Err(Error::MsgPack("unknown value refinements must be a map".into())),
        };

        let mut refinements = Refinements::new();
        for (k, v) in &entries {
            let Some(key) = k.as_i64().and_then(RefinementKey::from_wire) else {
                continue;
            };
            let refinement = Refinement::from_msgpack(key, v, path)?;
            if refinement.applies_to(typ) {
                refinements.insert(refinement);
            }
        }
        Ok(refinements)
    }
}

impl FromIterator<Refinement> for Refinements {
    fn from_iter<I: IntoIterator<Item = Refinement>>(iter: I) -> Self {
        let mut refinements = Refinements::new();
        for r in iter {
            refinements.insert(r);
        }
        refinements
    }
}

fn truncate_prefix(prefix: &str, limit: usize) -> &str {
    if prefix.len() <= limit {
        return prefix;
    }
    let mut end = limit;
    while !prefix.is_char_boundary(end) {
        end -= 1;
    }
    &prefix[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applicability() {
        let prefix = Refinement::StringPrefix("ab".into());
        assert!(prefix.applies_to(&Type::String));
        assert!(!prefix.applies_to(&Type::Number));

        let len = Refinement::CollectionLengthLowerBound(1);
        assert!(len.applies_to(&Type::list(Type::String)));
        assert!(len.applies_to(&Type::map(Type::String)));
        assert!(!len.applies_to(&Type::tuple([Type::String])));

        let nullness = Refinement::Nullness(Nullness::DefinitelyNotNull);
        assert!(nullness.applies_to(&Type::Bool));
        assert!(!nullness.applies_to(&Type::DynamicPseudoType));
    }

    #[test]
    fn test_encode_decode() {
        let refinements = Refinements::new()
            .with(Refinement::Nullness(Nullness::DefinitelyNotNull))
            .with(Refinement::NumberLowerBound {
                bound: Number::from(1i64),
                inclusive: true,
            })
            .with(Refinement::NumberUpperBound {
                bound: "9.5".parse().unwrap(),
                inclusive: false,
            });
        let bytes = refinements.encode().unwrap();
        let decoded = Refinements::decode(&bytes, &Type::Number, &AttributePath::new()).unwrap();
        assert_eq!(decoded, refinements);
    }

    #[test]
    fn test_prefix_truncated_to_limit() {
        let long = "x".repeat(600);
        let refinements = Refinements::new().with(Refinement::StringPrefix(long));
        let bytes = refinements.encode().unwrap();
        let decoded = Refinements::decode(&bytes, &Type::String, &AttributePath::new()).unwrap();
        assert_eq!(decoded.string_prefix().map(str::len), Some(MAX_STRING_PREFIX_LENGTH));
    }

    #[test]
    fn test_prefix_truncation_respects_char_boundaries() {
        // Each snowman is three bytes; 256 is not a multiple of three.
        let long = "\u{2603}".repeat(100);
        assert_eq!(truncate_prefix(&long, MAX_STRING_PREFIX_LENGTH).len(), 255);
        assert_eq!(truncate_prefix("short", MAX_STRING_PREFIX_LENGTH), "short");
    }

    #[test]
    fn test_oversized_bounds_are_dropped() {
        let huge: Number = "9".repeat(1100).parse().unwrap();
        let refinements = Refinements::new()
            .with(Refinement::Nullness(Nullness::DefinitelyNotNull))
            .with(Refinement::NumberLowerBound {
                bound: huge,
                inclusive: true,
            });
        let bytes = refinements.encode().unwrap();
        assert!(bytes.len() <= MAX_REFINEMENTS_LENGTH);

        let decoded = Refinements::decode(&bytes, &Type::Number, &AttributePath::new()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.nullness(), Some(Nullness::DefinitelyNotNull));
    }

    #[test]
    fn test_decode_rejects_oversized_body() {
        let body = vec![0u8; MAX_REFINEMENTS_LENGTH + 1];
        let err = Refinements::decode(&body, &Type::String, &AttributePath::new()).unwrap_err();
        assert!(matches!(err, Error::RefinementsTooLarge { .. }));
    }

    #[test]
    fn test_decode_skips_inapplicable_and_unknown_keys() {
        let raw = rmpv::Value::Map(vec![
            (rmpv::Value::from(2), rmpv::Value::from("pre")),
            (rmpv::Value::from(5), rmpv::Value::from(3)),
            (rmpv::Value::from(99), rmpv::Value::from(true)),
        ]);
        let mut body = Vec::new();
        rmpv::encode::write_value(&mut body, &raw).unwrap();

        let decoded = Refinements::decode(&body, &Type::String, &AttributePath::new()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.string_prefix(), Some("pre"));
    }

    #[test]
    fn test_check_rejects_inapplicable() {
        let refinements = Refinements::new().with(Refinement::StringPrefix("a".into()));
        assert!(refinements
            .check(&Type::Number, &AttributePath::new())
            .is_err());
        assert!(refinements
            .check(&Type::String, &AttributePath::new())
            .is_ok());
    }
}
