use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use forge_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config (defaults filled in)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a config file with every default spelled out
    Init,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Init => init(root),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    println!(
        "api_base_url:            {}",
        config.api_base_url.as_deref().unwrap_or("(local org seed)")
    );
    println!("cache_ttl_seconds:       {}", config.cache_ttl_seconds);
    println!("on_entitlement_error:    {}", config.on_entitlement_error);
    println!("request_timeout_seconds: {}", config.request_timeout_seconds);
    println!(
        "refresh:                 api usage every {}s, health every {}s",
        config.refresh.api_usage_seconds, config.refresh.health_seconds
    );
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
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

fn init(root: &Path) -> anyhow::Result<()> {
    let path = forge_core::paths::config_path(root);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    Config::default()
        .save(root)
        .context("failed to write config")?;
    println!("Wrote {}", path.display());
    Ok(())
}
