fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Packaged builds have no .git directory; they pass the hash in instead
    println!("cargo:rerun-if-env-changed=CLA_BOT_GIT_HASH");
    if let Ok(hash) = std::env::var("CLA_BOT_GIT_HASH") {
        println!("cargo:rustc-env=CLA_BOT_GIT_HASH={}", hash);
    }
}
