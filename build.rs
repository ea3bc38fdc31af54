//! Build script for autoretest - embeds version information.
//!
//! `BUILD_INFO_HUMAN` is shown by `autoretest --version` and has the shape
//! `{CARGO_PKG_VERSION} ({describe}) {rustc --version}`, where `describe` is
//! `git describe --tags --always --dirty` when a tag is reachable and a
//! pseudo-version `v{CARGO_PKG_VERSION}-{timestamp}-{commit}[+dirty]`
//! otherwise. Builds outside a git checkout fall back to the build time.

use std::process::Command;

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let components = [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        Some(format!("({})", describe())),
        run("rustc", &["--version"]),
    ];
    let build_info = components.into_iter().flatten().collect::<Vec<_>>().join(" ");

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={build_info}");
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn git(args: &[&str]) -> Option<String> {
    run("git", args)
}

/// `None` when git is unavailable. `.cargo-ok` is written by
/// `cargo install --git` and does not count as a local change.
fn is_dirty() -> Option<bool> {
    git(&["status", "--porcelain"])
        .map(|output| output.lines().any(|line| line.get(3..) != Some(".cargo-ok")))
        .or_else(|| git(&["rev-parse", "HEAD"]).map(|_| false))
}

fn describe() -> String {
    match git(&["describe", "--tags", "--always", "--dirty"]) {
        Some(desc) if desc.contains('v') || desc.contains("-g") => desc,
        _ => pseudo_version(),
    }
}

fn pseudo_version() -> String {
    let commit = git(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let dirty = is_dirty();

    // Clean trees use the commit time so identical sources produce identical
    // versions; anything else uses the build time.
    let timestamp = match dirty {
        Some(false) => git(&["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
    .unwrap_or_else(Utc::now)
    .format(TIMESTAMP_FORMAT);

    let suffix = if dirty == Some(true) { "+dirty" } else { "" };
    format!("v{}-{timestamp}-{commit}{suffix}", env!("CARGO_PKG_VERSION"))
}
