use anyhow::{Context, Result};

use orderflow_infra::EngineConfig;

/// Defaults, then `path` if given, then `ORDERFLOW_*` environment overrides.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let base = match path {
        Some(p) => EngineConfig::from_file(p).with_context(|| format!("load config {p}"))?,
        None => EngineConfig::default(),
    };
    let config = base
        .with_env_overrides()
        .context("apply environment overrides")?;
    tracing::debug!(?config, "effective engine config");
    Ok(config)
}

pub fn render_config(config: &EngineConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_config_lists_every_key() {
        let out = render_config(&EngineConfig::default()).unwrap();
        for key in [
            "edit_grant_ttl_minutes",
            "timeline_gap_millis",
            "min_observation_chars",
            "min_discount_reason_chars",
        ] {
            assert!(out.contains(key), "missing {key} in {out}");
        }
    }

    #[test]
    fn missing_config_file_is_reported_with_its_path() {
        let err = load_config(Some("/nonexistent/orderflow.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/orderflow.toml"));
    }
}
