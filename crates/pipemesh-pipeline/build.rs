fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/pipeline.proto");
    tonic_build::compile_protos("proto/pipeline.proto")?;
    Ok(())
}
