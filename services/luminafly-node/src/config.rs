use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use luminafly_core::Config;

/// Load the node configuration.
///
/// Reads `--config <path>` when given, otherwise starts from defaults, then
/// applies `LUMINAFLY_SEED`, `LUMINAFLY_LISTEN_ADDR` and `LUMINAFLY_DATABASE`.
pub fn load(args: &[String]) -> anyhow::Result<Config> {
    let mut config = match parse_config_path(args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default_config(),
    };
    apply_env(&mut config, |key| env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config was provided without a path");
        }
    }
    Ok(None)
}

fn apply_env(config: &mut Config, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    if let Some(seed) = var("LUMINAFLY_SEED") {
        let seed = seed
            .parse()
            .with_context(|| format!("LUMINAFLY_SEED is not a u64: {}", seed))?;
        config.simulation.seed = Some(seed);
    }
    if let Some(addr) = var("LUMINAFLY_LISTEN_ADDR") {
        config.node.listen_addr = addr;
    }
    if let Some(path) = var("LUMINAFLY_DATABASE") {
        config.node.database_path = Some(path);
    }
    Ok(())
}
