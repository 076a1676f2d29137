fn main() {
    // libtorch is only linked for the TorchScript detector
    if std::env::var("CARGO_FEATURE_TORCH").is_err() {
        return;
    }

    let libtorch_path = std::env::var("LIBTORCH").unwrap_or_else(|_| {
        let path = std::path::PathBuf::from("libtorch");
        path.to_string_lossy().into_owned()
    });

    println!("cargo:rerun-if-env-changed=LIBTORCH");
    println!("cargo:rustc-link-search=native={}/lib", libtorch_path);
    println!("cargo:rustc-link-lib=dylib=torch");
    println!("cargo:rustc-link-lib=dylib=c10");

    println!("cargo:include={}/include", libtorch_path);
    println!("cargo:include={}/include/torch/csrc/api/include", libtorch_path);
}
