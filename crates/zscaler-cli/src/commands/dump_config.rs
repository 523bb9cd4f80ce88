use std::path::Path;

use anyhow::Context;
use zscaler_config::ZscalerConfig;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    print!("{}", render(config_path)?);
    Ok(())
}

/// Load and validate `config_path`, then render it back as TOML.
pub fn render(config_path: &Path) -> anyhow::Result<String> {
    let config = ZscalerConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    Ok(config.to_toml_string()?)
}
