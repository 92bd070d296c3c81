//! Types shared by every operation family.
//!
//! These are the public counterparts of the small wire messages that appear
//! in many requests and responses: encoded values, raw state, identity data,
//! deferral signals, and capability records.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tftypes::{AttributePath, Error, JsonOptions, Type, Value};

/// An opaque encoded value, carried as MessagePack or JSON.
///
/// Wire messages always carry both byte fields; an empty field means the
/// encoding is absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DynamicValue {
    /// MessagePack encoding.
    pub msgpack: Option<Vec<u8>>,
    /// JSON encoding.
    pub json: Option<Vec<u8>>,
}

impl DynamicValue {
    /// Encode `value` as MessagePack for the schema type `typ`.
    pub fn new(value: &Value, typ: &Type) -> Result<Self, Error> {
        Ok(Self::from_msgpack(value.to_msgpack(typ)?))
    }

    /// Wrap MessagePack bytes.
    pub fn from_msgpack(bytes: Vec<u8>) -> Self {
        Self {
            msgpack: Some(bytes),
            json: None,
        }
    }

    /// Wrap JSON bytes.
    pub fn from_json(bytes: Vec<u8>) -> Self {
        Self {
            msgpack: None,
            json: Some(bytes),
        }
    }

    /// Whether neither encoding is present.
    pub fn is_empty(&self) -> bool {
        self.msgpack.is_none() && self.json.is_none()
    }

    /// Decode into a [`Value`] of type `typ`, preferring MessagePack.
    pub fn unmarshal(&self, typ: &Type) -> Result<Value, Error> {
        if let Some(msgpack) = &self.msgpack {
            return Value::from_msgpack(msgpack, typ);
        }
        if let Some(json) = &self.json {
            return Value::from_json(json, typ);
        }
        Err(Error::value(
            &AttributePath::new(),
            "DynamicValue has no MessagePack or JSON payload",
        ))
    }
}

/// State as stored by an older provider version, awaiting upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawState {
    /// JSON-encoded state.
    pub json: Option<Vec<u8>>,
    /// Legacy flatmap-encoded state.
    pub flatmap: HashMap<String, String>,
}

impl RawState {
    /// Decode the JSON state against `typ`.
    pub fn unmarshal(&self, typ: &Type) -> Result<Value, Error> {
        self.unmarshal_with_opts(typ, JsonOptions::default())
    }

    /// Decode the JSON state against `typ` with decoding options.
    ///
    /// Older states often contain attributes a newer schema removed; set
    /// [`JsonOptions::ignore_undefined_attributes`] to drop them.
    pub fn unmarshal_with_opts(&self, typ: &Type, opts: JsonOptions) -> Result<Value, Error> {
        match &self.json {
            Some(json) => Value::from_json_with(json, typ, opts),
            None if !self.flatmap.is_empty() => Err(Error::value(
                &AttributePath::new(),
                "flatmap states cannot be unmarshaled, only JSON states",
            )),
            None => Err(Error::value(&AttributePath::new(), "RawState has no JSON payload")),
        }
    }
}

/// Identity data of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceIdentityData {
    /// The encoded identity object.
    pub identity_data: Option<DynamicValue>,
}

/// Why a response was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeferredReason {
    /// No reason given.
    #[default]
    Unknown,
    /// The resource configuration contains unknown values.
    ResourceConfigUnknown,
    /// The provider configuration contains unknown values.
    ProviderConfigUnknown,
    /// A prerequisite for the operation is not yet available.
    AbsentPrereq,
    /// A reason this library does not know, kept by its wire value.
    Unrecognized(i32),
}

impl From<i32> for DeferredReason {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::ResourceConfigUnknown,
            2 => Self::ProviderConfigUnknown,
            3 => Self::AbsentPrereq,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<DeferredReason> for i32 {
    fn from(reason: DeferredReason) -> Self {
        match reason {
            DeferredReason::Unknown => 0,
            DeferredReason::ResourceConfigUnknown => 1,
            DeferredReason::ProviderConfigUnknown => 2,
            DeferredReason::AbsentPrereq => 3,
            DeferredReason::Unrecognized(other) => other,
        }
    }
}

impl fmt::Display for DeferredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("UNKNOWN"),
            Self::ResourceConfigUnknown => f.write_str("RESOURCE_CONFIG_UNKNOWN"),
            Self::ProviderConfigUnknown => f.write_str("PROVIDER_CONFIG_UNKNOWN"),
            Self::AbsentPrereq => f.write_str("ABSENT_PREREQ"),
            Self::Unrecognized(other) => write!(f, "{}", other),
        }
    }
}

/// A signal that the operation cannot complete until more is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deferred {
    /// Why the operation was deferred.
    pub reason: DeferredReason,
}

impl Deferred {
    /// Create a deferral with a reason.
    pub fn new(reason: DeferredReason) -> Self {
        Self { reason }
    }
}

/// Features the host announces it supports for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// The host accepts deferred responses.
    pub deferral_allowed: bool,
    /// The host supports write-only attributes.
    pub write_only_attributes_allowed: bool,
}

/// Optional protocol features the provider supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// The host may skip GetProviderSchema when it has a cached schema.
    pub get_provider_schema_optional: bool,
    /// The provider implements MoveResourceState.
    pub move_resource_state: bool,
    /// The provider wants to plan resource destruction.
    pub plan_destroy: bool,
}

/// Environment variable the host sets to prove it launched the plugin.
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";

/// Value of [`MAGIC_COOKIE_KEY`] the host sets.
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Environment variable carrying the debug-reattach configuration.
pub const REATTACH_PROVIDERS_ENV: &str = "TF_REATTACH_PROVIDERS";

/// Protocol version announced during the plugin handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Major protocol version (5 or 6).
    pub protocol_version_major: u32,
    /// Minor protocol version, tracking the `.proto` file.
    pub protocol_version_minor: u32,
}

impl HandshakeConfig {
    /// The handshake line fragment `major.minor`.
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.protocol_version_major, self.protocol_version_minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_value_prefers_msgpack() {
        let typ = Type::String;
        let mut dv = DynamicValue::new(&Value::string("from msgpack"), &typ).unwrap();
        dv.json = Some(br#""from json""#.to_vec());

        assert_eq!(dv.unmarshal(&typ).unwrap(), Value::string("from msgpack"));

        dv.msgpack = None;
        assert_eq!(dv.unmarshal(&typ).unwrap(), Value::string("from json"));
    }

    #[test]
    fn test_dynamic_value_empty() {
        let dv = DynamicValue::default();
        assert!(dv.is_empty());
        assert!(dv.unmarshal(&Type::String).is_err());
    }

    #[test]
    fn test_raw_state_ignores_undefined_attributes() {
        let typ = Type::object([("id", Type::String)]);
        let raw = RawState {
            json: Some(br#"{"id":"abc","removed":true}"#.to_vec()),
            flatmap: HashMap::new(),
        };

        assert!(raw.unmarshal(&typ).is_err());

        let value = raw
            .unmarshal_with_opts(
                &typ,
                JsonOptions {
                    ignore_undefined_attributes: true,
                },
            )
            .unwrap();
        assert_eq!(value.attribute("id"), Some(&Value::string("abc")));
    }

    #[test]
    fn test_raw_state_flatmap_rejected() {
        let raw = RawState {
            json: None,
            flatmap: HashMap::from([("id".to_string(), "abc".to_string())]),
        };
        let err = raw.unmarshal(&Type::object([("id", Type::String)])).unwrap_err();
        assert!(err.to_string().contains("flatmap"));
    }

    #[test]
    fn test_deferred_reason_names() {
        assert_eq!(
            DeferredReason::ProviderConfigUnknown.to_string(),
            "PROVIDER_CONFIG_UNKNOWN"
        );
        assert_eq!(DeferredReason::AbsentPrereq.to_string(), "ABSENT_PREREQ");
        assert_eq!(DeferredReason::from(42), DeferredReason::Unrecognized(42));
        assert_eq!(i32::from(DeferredReason::Unrecognized(42)), 42);
        assert_eq!(i32::from(DeferredReason::ResourceConfigUnknown), 1);
    }

    #[test]
    fn test_handshake_constants() {
        assert_eq!(MAGIC_COOKIE_KEY, "TF_PLUGIN_MAGIC_COOKIE");
        assert_eq!(MAGIC_COOKIE_VALUE.len(), 64);
        let handshake = HandshakeConfig {
            protocol_version_major: 6,
            protocol_version_minor: 10,
        };
        assert_eq!(handshake.version_string(), "6.10");
    }
}
