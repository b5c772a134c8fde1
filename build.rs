//! Build script for voteatron - embeds a human-readable build string.
//!
//! The string is `{CARGO_PKG_VERSION} ({git describe}) {rustc --version}`,
//! with any part that cannot be determined left out. It is exposed to the
//! crate as `BUILD_INFO_HUMAN` and shown by `--version`.

use std::{env, process::Command};

fn main() {
    ["src", "build.rs", "Cargo.toml", "Cargo.lock"]
        .iter()
        .for_each(|path| println!("cargo:rerun-if-changed={path}"));

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", build_info());
}

/// Runs a command and returns its trimmed stdout, if it succeeded and was
/// non-empty.
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn build_info() -> String {
    let version = env::var("CARGO_PKG_VERSION").ok();
    let git = command_output("git", &["describe", "--tags", "--always", "--dirty"])
        .map(|desc| format!("({desc})"));
    let rustc = command_output("rustc", &["--version"]);

    [version, git, rustc]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
}
