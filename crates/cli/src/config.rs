//! Engine configuration for the CLI: an optional TOML file plus environment
//! overrides.

use std::path::Path;
use std::str::FromStr;

use courseplan_engine::EngineConfig;
use rust_decimal::Decimal;

/// Overrides `default_units` when set.
pub(crate) const DEFAULT_UNITS_ENV: &str = "COURSEPLAN_DEFAULT_UNITS";

/// Read the engine config from `path` (defaults when `None`) and apply
/// environment overrides.
///
/// Returns a human-readable error string on failure.
pub(crate) fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => EngineConfig::default(),
    };
    if let Ok(value) = std::env::var(DEFAULT_UNITS_ENV) {
        config.default_units = parse_units(&value)
            .map_err(|e| format!("invalid {} '{}': {}", DEFAULT_UNITS_ENV, value, e))?;
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<EngineConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

fn parse_units(value: &str) -> Result<Decimal, String> {
    let units = Decimal::from_str(value.trim()).map_err(|e| e.to_string())?;
    if units.is_sign_negative() {
        return Err("units cannot be negative".to_string());
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_named_keys() {
        let config: EngineConfig = toml::from_str("max_minors = 1\ndefault_units = \"2.5\"\n").unwrap();
        assert_eq!(config.max_minors, 1);
        assert_eq!(config.default_units, Decimal::new(25, 1));
        assert_eq!(config.max_attributions, 2);
    }

    #[test]
    fn empty_file_is_the_default_config() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn units_must_be_a_non_negative_decimal() {
        assert_eq!(parse_units(" 3 ").unwrap(), Decimal::from(3));
        assert!(parse_units("-1").is_err());
        assert!(parse_units("four").is_err());
    }
}
