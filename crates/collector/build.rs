use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    if let Err(err) = write_version() {
        panic!("failed to write version.rs: {err}");
    }

    println!("cargo:rerun-if-env-changed=SAPWATCH_GIT_SHA");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}

fn write_version() -> anyhow::Result<()> {
    let pkg_version = env::var("CARGO_PKG_VERSION")?;
    let git_sha = env::var("SAPWATCH_GIT_SHA")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(git_short_sha)
        .unwrap_or_else(|| "unknown".to_string());
    let git_dirty = git_dirty().unwrap_or(false);
    let build_timestamp = build_timestamp();

    let dest = PathBuf::from(env::var("OUT_DIR")?).join("version.rs");
    let contents = format!(
        "pub const VERSION: &str = \"{pkg_version}\";\n\
         pub const GIT_SHA: &str = \"{git_sha}\";\n\
         pub const GIT_DIRTY: bool = {git_dirty};\n\
         pub const BUILD_TIMESTAMP: &str = \"{build_timestamp}\";\n"
    );
    fs::write(dest, contents)?;
    Ok(())
}

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn git_dirty() -> Option<bool> {
    Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .map(|output| !output.stdout.is_empty())
}

fn build_timestamp() -> String {
    let now = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(chrono::Utc::now);
    now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
