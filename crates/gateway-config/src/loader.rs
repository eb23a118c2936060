//! Configuration loading: defaults, then file, then environment, then
//! validation.

use crate::config::{GatewayConfig, PeriodCeilings, WindowLimits};
use crate::env::apply_env_overrides;
use crate::error::{ConfigError, ConfigResult};
use gateway_core::{BudgetPeriod, WindowKind};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Keyword categories accepted under `guardrails.extra_keywords`
pub const KEYWORD_CATEGORIES: [&str; 4] = ["toxic", "hate", "violence", "sexual"];

/// Load configuration using the process environment for overrides
pub fn load_config(path: Option<&Path>) -> ConfigResult<GatewayConfig> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// Load configuration with an explicit environment lookup
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let config = parse_file(path)?;
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a config file, choosing the format by extension
pub fn parse_file(path: &Path) -> ConfigResult<GatewayConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string())),
        "toml" => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Field ranges plus the cross-field rules the derive cannot express
pub fn validate_config(config: &GatewayConfig) -> ConfigResult<()> {
    config.validate()?;

    let t = &config.budgets.thresholds;
    if !(t.warning > Decimal::ZERO
        && t.warning <= t.critical
        && t.critical <= t.emergency
        && t.emergency <= Decimal::ONE)
    {
        return Err(ConfigError::validation(format!(
            "budget thresholds must satisfy 0 < warning <= critical <= emergency <= 1 \
             (got {}, {}, {})",
            t.warning, t.critical, t.emergency
        )));
    }

    check_ceilings("budgets.global", &config.budgets.global)?;
    check_ceilings("budgets.per_principal", &config.budgets.per_principal)?;
    for (id, ceilings) in &config.budgets.principals {
        check_ceilings(&format!("budgets.principals.{id}"), ceilings)?;
    }
    for (model, ceilings) in &config.budgets.models {
        if config.model(model).is_none() {
            return Err(ConfigError::validation(format!(
                "budgets.models.{model} refers to a model missing from the price table"
            )));
        }
        check_ceilings(&format!("budgets.models.{model}"), ceilings)?;
    }

    let mut seen = HashSet::new();
    for model in &config.models {
        if model.name.trim().is_empty() {
            return Err(ConfigError::validation("model name cannot be empty"));
        }
        if !seen.insert(model.name.as_str()) {
            return Err(ConfigError::validation(format!(
                "model '{}' is listed more than once",
                model.name
            )));
        }
        if model.input_cost_per_1k.is_sign_negative() || model.output_cost_per_1k.is_sign_negative()
        {
            return Err(ConfigError::validation(format!(
                "model '{}' has a negative price",
                model.name
            )));
        }
        check_windows(&format!("models.{}.rate_limits", model.name), &model.rate_limits)?;
    }

    let rl = &config.rate_limits;
    check_windows("rate_limits.global", &rl.global)?;
    if rl.per_principal.max_concurrent == Some(0) {
        return Err(ConfigError::validation(
            "rate_limits.per_principal.max_concurrent must be at least 1",
        ));
    }
    for (id, limits) in &rl.principals {
        if limits.max_concurrent == Some(0) {
            return Err(ConfigError::validation(format!(
                "rate_limits.principals.{id}.max_concurrent must be at least 1"
            )));
        }
    }

    if config.server.body_limit_bytes <= config.guardrails.max_request_size {
        return Err(ConfigError::validation(
            "server.body_limit_bytes must exceed guardrails.max_request_size",
        ));
    }

    for category in config.guardrails.extra_keywords.keys() {
        if !KEYWORD_CATEGORIES.contains(&category.as_str()) {
            return Err(ConfigError::validation(format!(
                "unknown keyword category '{category}'"
            )));
        }
    }

    Ok(())
}

fn check_ceilings(path: &str, ceilings: &PeriodCeilings) -> ConfigResult<()> {
    for period in BudgetPeriod::ALL {
        if let Some(ceiling) = ceilings.ceiling(period) {
            if ceiling <= Decimal::ZERO {
                return Err(ConfigError::validation(format!(
                    "{path}: {period} ceiling must be positive"
                )));
            }
        }
    }
    Ok(())
}

fn check_windows(path: &str, limits: &WindowLimits) -> ConfigResult<()> {
    for kind in WindowKind::ALL {
        if limits.limit(kind) == Some(0) {
            return Err(ConfigError::validation(format!(
                "{path}: per-{kind} limit must be at least 1 (omit it to disable)"
            )));
        }
    }
    Ok(())
}
