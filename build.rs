//! Build script stamping the source commit into the binaries

use std::process::Command;

fn main() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=CONVOY_BUILD_COMMIT={commit}");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
