fn main() {
    let crate_dir = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };

    // Header generation is best effort; a cbindgen hiccup must not fail the
    // build.
    if let Ok(bindings) = cbindgen::generate(&crate_dir) {
        bindings.write_to_file(format!("{crate_dir}/include/wasi_http.h"));
    }

    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");
    println!("cargo:rerun-if-changed=src/host.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
}
