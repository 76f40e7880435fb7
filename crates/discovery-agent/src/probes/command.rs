use std::{process::Stdio, time::Duration};

use anyhow::Context;
use tokio::process::Command;

/// Runs `program` and returns its stdout, failing on spawn errors, a non-zero
/// exit or when `timeout` elapses (the child is killed).
pub async fn run(program: &str, args: &[&str], timeout: Duration) -> anyhow::Result<Vec<u8>> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to execute {program}"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("{program} timed out after {}s", timeout.as_secs()))?
        .with_context(|| format!("failed to wait for {program}"))?;

    if !output.status.success() {
        anyhow::bail!(
            "{program} {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output.stdout)
}
