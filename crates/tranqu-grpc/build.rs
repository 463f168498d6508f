//! Build script: compile the TranspilerService proto and emit the encoded
//! descriptor set used by gRPC reflection.

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let proto = "proto/tranqu_server/proto/v1/tranqu.proto";

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("tranqu_descriptor.bin"))
        .compile_protos(&[proto], &["proto"])?;

    println!("cargo:rerun-if-changed={proto}");
    Ok(())
}
