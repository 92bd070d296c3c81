//! Provider side of the Terraform plugin protocol
//!
//! This crate provides the value layer, the public request/response model, and
//! the per-version servers needed to answer a Terraform host over protocol
//! versions 5 and 6. It follows the pattern established by
//! [terraform-plugin-go](https://github.com/hashicorp/terraform-plugin-go).
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Values**: [`tftypes`] types, values, refinements, attribute paths, and
//!   the MessagePack and JSON codecs
//! - **Schema types**: Blocks, attributes, nested blocks, and identity schemas
//! - **ProviderService trait**: One async method per protocol operation
//! - **Version servers**: [`tfprotov5::Server`] and [`tfprotov6::Server`]
//!   implement the generated gRPC `Provider` traits: they translate wire
//!   messages, log each request, and call the provider
//! - **Streams**: ListResource results, InvokeAction events with enforced
//!   ordering, and chunked state store transfers
//! - **Logging**: A `tracing` layer writing the SDK's JSON log records
//!
//! # Quick Start
//!
//! ```ignore
//! use tf_provider_protocol::{
//!     async_trait, ProviderError, ProviderService, ServeOptions,
//!     provider::*, resource::*,
//!     schema::{Schema, SchemaAttribute, SchemaBlock},
//!     tftypes::Type,
//! };
//!
//! struct ExampleProvider;
//!
//! #[async_trait]
//! impl ProviderService for ExampleProvider {
//!     async fn get_provider_schema(
//!         &self,
//!         _req: GetProviderSchemaRequest,
//!     ) -> Result<GetProviderSchemaResponse, ProviderError> {
//!         let instance = SchemaBlock::new()
//!             .with_attribute(SchemaAttribute::required("name", Type::String))
//!             .with_attribute(SchemaAttribute::computed("id", Type::String));
//!         Ok(GetProviderSchemaResponse::new(Schema::new(0, SchemaBlock::new()))
//!             .with_resource("example_instance", Schema::new(0, instance)))
//!     }
//!
//!     async fn configure_provider(
//!         &self,
//!         _req: ConfigureProviderRequest,
//!     ) -> Result<ConfigureProviderResponse, ProviderError> {
//!         Ok(ConfigureProviderResponse::default())
//!     }
//!
//!     async fn read_resource(
//!         &self,
//!         req: ReadResourceRequest,
//!     ) -> Result<ReadResourceResponse, ProviderError> {
//!         Ok(ReadResourceResponse {
//!             new_state: req.current_state,
//!             ..Default::default()
//!         })
//!     }
//!
//!     // plan_resource_change and apply_resource_change ...
//! }
//!
//! let options = ServeOptions::from_env("registry.terraform.io/example/example")?;
//! options.check_magic_cookie()?;
//! let server = tf_provider_protocol::tfprotov6::Server::new(ExampleProvider, options);
//! let service = tf_provider_protocol::tfprotov6::generated::provider_server::ProviderServer::new(server);
//! tonic::transport::Server::builder()
//!     .add_service(service)
//!     .serve_with_incoming(incoming)
//!     .await?;
//! ```
//!
//! # Handshake
//!
//! The process-launch handshake and the listener are left to the binary. This
//! crate supplies the pieces it needs: [`types::MAGIC_COOKIE_KEY`] and
//! [`types::MAGIC_COOKIE_VALUE`], the reattach configuration read by
//! [`ServeOptions::from_env`], and the protocol version of each module
//! through `tfprotov5::handshake()` and `tfprotov6::handshake()`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod data_source;
pub mod diagnostic;
pub mod ephemeral;
pub mod error;
pub mod function;
pub mod list_resource;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod server;
pub mod state_store;
pub mod stream;
pub mod testing;
pub mod tfprotov5;
pub mod tfprotov6;
pub mod tftypes;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use diagnostic::{Diagnostic, DiagnosticSeverity, DiagnosticsExt};
pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging};
pub use server::{ProviderService, ServeOptions};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use tonic;
pub use tracing;
