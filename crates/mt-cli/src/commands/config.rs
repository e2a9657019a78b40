//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};
use mt_core::config::{self, ConfigFile};

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Print the path the configuration is read from
pub fn config_path(config_path: Option<&Path>) {
    println!("{}", resolve_path(config_path).display());
}

/// Print the effective configuration, defaults filled in
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_path(config_path);
    if !path.exists() {
        print_info(&format!(
            "No configuration file at {}, showing defaults",
            path.display()
        ));
    }

    let config = ConfigFile::load_or_default(config_path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default configuration
///
/// An existing file is only replaced with `force`.
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {}", path.display()));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &ConfigFile::default())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    print_success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}
