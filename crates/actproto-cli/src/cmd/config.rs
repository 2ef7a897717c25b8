use crate::config_path::resolve_config_path;
use crate::output::print_json;
use actproto_core::config::{WarnLevel, CONFIG_FILE};
use actproto_core::ProtocolConfig;
use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a default .actproto.yaml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(explicit: Option<&Path>, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(explicit, json),
        ConfigSubcommand::Validate => validate(explicit, json),
        ConfigSubcommand::Init { force } => init(explicit, force, json),
    }
}

/// Read without rejecting error-level findings, so they can be reported.
fn read_effective(explicit: Option<&Path>) -> anyhow::Result<(Option<PathBuf>, ProtocolConfig)> {
    match resolve_config_path(explicit) {
        Some(path) => {
            let config = ProtocolConfig::read(&path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Ok((Some(path), config))
        }
        None => Ok((None, ProtocolConfig::default())),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(explicit: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (path, config) = read_effective(explicit)?;
    if json {
        let value = serde_json::json!({
            "path": path.as_ref().map(|p| p.display().to_string()),
            "config": config,
        });
        return print_json(&value);
    }
    match &path {
        Some(p) => println!("# source: {}", p.display()),
        None => println!("# source: built-in defaults"),
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(explicit: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (_, config) = read_effective(explicit)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(explicit: Option<&Path>, force: bool, json: bool) -> anyhow::Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()
            .context("failed to determine current directory")?
            .join(CONFIG_FILE),
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ProtocolConfig::default()
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({ "path": path.display().to_string() }))
    } else {
        println!("Wrote {}", path.display());
        Ok(())
    }
}
