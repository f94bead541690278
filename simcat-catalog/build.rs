//! Stamps the binary with the commit and build time shown by `GET /health`
//! and the startup log.
//!
//! Honors `SOURCE_DATE_EPOCH` so packaged builds are reproducible.

use std::process::Command;

use chrono::{DateTime, SecondsFormat, Utc};

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_string()).filter(|s| !s.is_empty())
}

fn build_time() -> DateTime<Utc> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|secs| secs.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

fn main() {
    let mut commit = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".into());
    if git(&["status", "--porcelain", "--untracked-files=no"]).is_some() {
        commit.push_str("-dirty");
    }

    println!("cargo:rustc-env=GIT_HASH={}", commit);
    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        build_time().to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    // Restamp when the checked-out commit moves
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    let branch = git(&["symbolic-ref", "-q", "HEAD"]);
    for name in std::iter::once("HEAD").chain(branch.as_deref()) {
        if let Some(path) = git(&["rev-parse", "--git-path", name]) {
            println!("cargo:rerun-if-changed={}", path);
        }
    }
    println!("cargo:rerun-if-changed=build.rs");
}
