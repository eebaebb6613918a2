fn main() {
    for (var, exported) in [
        ("TARGET", "SERIALMUX_BUILD_TARGET"),
        ("PROFILE", "SERIALMUX_BUILD_PROFILE"),
    ] {
        println!("cargo:rerun-if-env-changed={var}");
        if let Ok(value) = std::env::var(var) {
            println!("cargo:rustc-env={exported}={value}");
        }
    }
}
