//! `compose` command: run docker-compose against the managed compose file

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

use mt_core::config::ComposeConfig;

/// Compose file name inside the data directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// A fully resolved docker-compose call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
}

impl fmt::Display for ComposeInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Resolve the call for `args`
pub fn compose_invocation(config: &ComposeConfig, args: &[String]) -> ComposeInvocation {
    let dir = config.data_dir();
    let mut full_args = vec![
        "-f".to_string(),
        dir.join(COMPOSE_FILE).display().to_string(),
    ];
    full_args.extend(args.iter().cloned());

    ComposeInvocation {
        program: config.program().to_string(),
        args: full_args,
        dir,
    }
}

/// Run docker-compose with `args`, inheriting the terminal
pub async fn compose_command(config: &ComposeConfig, args: &[String]) -> Result<()> {
    let invocation = compose_invocation(config, args);
    tracing::debug!(dir = %invocation.dir.display(), "running `{}`", invocation);

    let status = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("running `{}`", invocation))?;

    if !status.success() {
        bail!("`{}` failed: {}", invocation, status);
    }
    Ok(())
}
