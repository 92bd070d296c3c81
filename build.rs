//! Build script for proto compilation.
//!
//! This is used during development to regenerate the wire types for both
//! protocol versions. The generated code is committed to the repository, so
//! this only needs to run when a proto file changes.
//!
//! To regenerate: `cargo build --features regenerate-proto`
//!
//! The generated files are placed in `src/tfprotov5/generated.rs` and
//! `src/tfprotov6/generated.rs`. Each holds the message types and the
//! `provider_server` module; no client is generated.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only regenerate if the feature is enabled
    #[cfg(feature = "regenerate-proto")]
    {
        for (package, module) in [("tfplugin5", "tfprotov5"), ("tfplugin6", "tfprotov6")] {
            let out_dir = std::path::PathBuf::from("src").join(module);
            tonic_prost_build::configure()
                .build_server(true)
                .build_client(false)
                .out_dir(&out_dir)
                .compile_protos(&[format!("proto/{package}.proto")], &["proto"])?;

            // Rename the generated file
            let generated = out_dir.join(format!("{package}.rs"));
            let target = out_dir.join("generated.rs");
            if generated.exists() {
                std::fs::rename(generated, target)?;
            }
        }
    }

    // Always rerun if a proto changes
    println!("cargo:rerun-if-changed=proto/tfplugin5.proto");
    println!("cargo:rerun-if-changed=proto/tfplugin6.proto");

    Ok(())
}
