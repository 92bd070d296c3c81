//! Terraform plugin protocol version 6.
//!
//! Hosts that speak protocol 6 see nested attribute types, actions and state
//! stores. The wire messages live in [`generated`]; [`Server`] translates
//! them to the version-independent request types and back.

#[allow(missing_docs, clippy::all)]
pub mod generated;

mod fromproto;
mod toproto;

pub mod server;

pub use server::Server;

use crate::types::HandshakeConfig;

/// Major protocol version.
pub const PROTOCOL_VERSION_MAJOR: u32 = 6;

/// Minor protocol version of `tfplugin6.proto`.
pub const PROTOCOL_VERSION_MINOR: u32 = 10;

/// Full protocol version, as logged in `tf_proto_version`.
pub const PROTOCOL_VERSION: &str = "6.10";

/// The handshake announcement for this protocol version.
pub fn handshake() -> HandshakeConfig {
    HandshakeConfig {
        protocol_version_major: PROTOCOL_VERSION_MAJOR,
        protocol_version_minor: PROTOCOL_VERSION_MINOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_string() {
        assert_eq!(PROTOCOL_VERSION, handshake().version_string());
    }

    #[test]
    fn test_handshake_matches_proto() {
        let proto = include_str!("../../proto/tfplugin6.proto");
        let header = format!(
            "Terraform Plugin RPC protocol version {}",
            handshake().version_string()
        );
        assert!(proto.contains(&header));
    }
}
