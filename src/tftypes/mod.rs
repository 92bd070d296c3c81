//! The value layer shared by both protocol versions.
//!
//! Configuration, state, plans, and function arguments cross the protocol
//! boundary as opaque bytes. This module gives those bytes a shape:
//!
//! - [`Type`]: the closed type algebra (primitives, collections, structural
//!   types, and the dynamic pseudo-type) with its canonical JSON form.
//! - [`Value`]: a typed value that is known, null, or unknown. Unknown values
//!   may carry [`Refinements`] narrowing what they can become.
//! - [`AttributePath`]: an address into a value tree, used to anchor
//!   diagnostics and to request replacement during planning.
//! - Codecs: [`Value::to_msgpack`] / [`Value::from_msgpack`] and
//!   [`Value::to_json`] / [`Value::from_json`]. Both take the schema type the
//!   payload is interpreted with, because dynamic positions are encoded
//!   differently from static ones.
//!
//! # Example
//!
//! ```
//! use tf_provider_protocol::tftypes::{Type, Value};
//!
//! let typ = Type::object([("name", Type::String), ("port", Type::Number)]);
//! let value = Value::from_attributes([
//!     ("name", Value::string("web")),
//!     ("port", Value::number(8080)),
//! ]);
//!
//! let bytes = value.to_msgpack(&typ).unwrap();
//! let decoded = Value::from_msgpack(&bytes, &typ).unwrap();
//! assert_eq!(decoded, value);
//! ```

mod error;
mod json;
mod msgpack;
mod number;
mod path;
mod refinement;
mod types;
mod value;

pub use error::Error;
pub use json::JsonOptions;
pub use number::Number;
pub use path::{AttributePath, AttributePathStep};
pub use refinement::{
    Nullness, Refinement, RefinementKey, Refinements, MAX_REFINEMENTS_LENGTH,
    MAX_STRING_PREFIX_LENGTH,
};
pub use types::Type;
pub use value::{Known, Value, ValueState};
