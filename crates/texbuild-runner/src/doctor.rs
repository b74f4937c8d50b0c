use std::process::Command;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::Config;

/// Whether one configured tool can be started.
#[derive(Clone, Debug, Serialize)]
pub struct ToolCheck {
    pub runner: String,
    pub executable: String,
    pub found: bool,
    /// First line the tool printed for `--version`.
    pub version: Option<String>,
}

fn check_tool(runner: &str, executable: &str) -> ToolCheck {
    // some tools (makeindex) exit non-zero on --version, so being able to spawn counts
    let version = Command::new(executable).arg("--version").output().ok().map(|o| {
        let text = if o.stdout.is_empty() { o.stderr } else { o.stdout };
        String::from_utf8_lossy(&text).lines().next().unwrap_or("").trim().to_string()
    });
    ToolCheck {
        runner: runner.to_string(),
        executable: executable.to_string(),
        found: version.is_some(),
        version: version.filter(|v| !v.is_empty()),
    }
}

/// Checks the configured core tool and every auxiliary runner. A missing core tool is an error;
/// missing auxiliary tools are only reported, most documents never need all of them.
pub fn doctor(cfg: &Config) -> Result<Vec<ToolCheck>> {
    let registry = cfg.registry();
    let core = registry
        .get(&cfg.build.core_runner)
        .ok_or_else(|| anyhow!("unknown core runner {}", cfg.build.core_runner))?;
    let core_check = check_tool(core.id.as_str(), &core.executable);
    if !core_check.found {
        return Err(anyhow!("{} not found on PATH; install a TeX distribution or set [runners.{}] executable", core.executable, core.id));
    }
    let mut checks = vec![core_check];
    for runner in registry.iter().filter(|r| !r.core) {
        checks.push(check_tool(runner.id.as_str(), &runner.executable));
    }
    Ok(checks)
}
