//! Embeds the three guest images into the host binary.
//!
//! Images are read from `memdata/` (or `$RINGVM_MEMDATA`). A missing image is
//! embedded as an empty slice; the controller rejects it at startup.

use std::env;
use std::fs;
use std::path::PathBuf;

const IMAGES: [(&str, &str); 3] = [
    ("BIOS_IMAGE", "bios.bin"),
    ("KERNEL_IMAGE", "kernel.bin"),
    ("USER_IMAGE", "user.bin"),
];

fn main() {
    println!("cargo:rerun-if-env-changed=RINGVM_MEMDATA");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let memdata = env::var_os("RINGVM_MEMDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("memdata"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let mut generated = String::new();
    for (constant, file) in IMAGES {
        let path = memdata.join(file);
        println!("cargo:rerun-if-changed={}", path.display());

        if path.is_file() {
            generated.push_str(&format!(
                "pub const {}: &[u8] = include_bytes!({:?});\n",
                constant,
                path.display().to_string()
            ));
        } else {
            generated.push_str(&format!("pub const {}: &[u8] = &[];\n", constant));
        }
    }

    fs::write(out_dir.join("images.rs"), generated).unwrap();
}
