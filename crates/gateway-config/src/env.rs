//! Environment variable overrides.
//!
//! Applied after the config file. The lookup is passed in so overrides can be
//! tested without touching the process environment.

use crate::config::{GatewayConfig, LogFormat};
use crate::error::{ConfigError, ConfigResult};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Apply every recognised variable found by `lookup` to `config`
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| {
        let value = lookup(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if value.is_some() {
            debug!(var, "Applying environment override");
        }
        value
    };

    // Server & auth
    if let Some(v) = get("GATEWAY_HOST") {
        config.server.host = v;
    }
    if let Some(v) = get("GATEWAY_PORT") {
        config.server.port = parse("GATEWAY_PORT", &v)?;
    }
    if let Some(v) = get("GATEWAY_MASTER_KEY") {
        config.auth.master_key = Some(SecretString::new(v));
    }
    if let Some(v) = get("GATEWAY_PIN_PRINCIPAL") {
        config.auth.pin_principal_to_key = parse_bool("GATEWAY_PIN_PRINCIPAL", &v)?;
    }

    // Upstream
    if let Some(v) = get("UPSTREAM_BASE_URL") {
        config.upstream.base_url = v;
    }
    if let Some(v) = get("UPSTREAM_API_KEY") {
        config.upstream.api_key = Some(SecretString::new(v));
    }
    if let Some(v) = get("UPSTREAM_TIMEOUT_SECS") {
        config.upstream.timeout = Duration::from_secs(parse("UPSTREAM_TIMEOUT_SECS", &v)?);
    }

    // Budgets
    if let Some(v) = get("DAILY_BUDGET") {
        config.budgets.global.daily = Some(parse_money("DAILY_BUDGET", &v)?);
    }
    if let Some(v) = get("WEEKLY_BUDGET") {
        config.budgets.global.weekly = Some(parse_money("WEEKLY_BUDGET", &v)?);
    }
    if let Some(v) = get("MONTHLY_BUDGET") {
        config.budgets.global.monthly = Some(parse_money("MONTHLY_BUDGET", &v)?);
    }
    if let Some(v) = get("COST_ALERT_WARNING") {
        config.budgets.thresholds.warning = parse_percent("COST_ALERT_WARNING", &v)?;
    }
    if let Some(v) = get("COST_ALERT_CRITICAL") {
        config.budgets.thresholds.critical = parse_percent("COST_ALERT_CRITICAL", &v)?;
    }
    if let Some(v) = get("COST_ALERT_EMERGENCY") {
        config.budgets.thresholds.emergency = parse_percent("COST_ALERT_EMERGENCY", &v)?;
    }

    // Guardrails
    let guardrails = &mut config.guardrails;
    for (var, flag) in [
        ("GUARDRAILS_ENABLED", &mut guardrails.enabled),
        ("BLOCK_PII", &mut guardrails.block_pii),
        ("BLOCK_TOXIC", &mut guardrails.block_toxic),
        ("BLOCK_HATE", &mut guardrails.block_hate),
        ("BLOCK_VIOLENCE", &mut guardrails.block_violence),
        ("BLOCK_SEXUAL", &mut guardrails.block_sexual),
        ("SCAN_FOR_SECRETS", &mut guardrails.scan_for_secrets),
    ] {
        if let Some(v) = get(var) {
            *flag = parse_bool(var, &v)?;
        }
    }
    if let Some(v) = get("MAX_INPUT_TOKENS") {
        guardrails.max_input_tokens = parse("MAX_INPUT_TOKENS", &v)?;
    }
    if let Some(v) = get("MAX_OUTPUT_TOKENS") {
        guardrails.max_output_tokens = parse("MAX_OUTPUT_TOKENS", &v)?;
    }
    if let Some(v) = get("MAX_REQUEST_SIZE") {
        guardrails.max_request_size = parse("MAX_REQUEST_SIZE", &v)?;
    }

    // Telemetry
    if let Some(v) = get("LOG_LEVEL") {
        config.telemetry.log_level = v.to_ascii_lowercase();
    }
    if let Some(v) = get("LOG_FORMAT") {
        config.telemetry.log_format =
            LogFormat::from_str(&v).map_err(|e| ConfigError::env("LOG_FORMAT", e))?;
    }

    Ok(())
}

fn parse<T>(var: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::env(var, format!("'{value}': {e}")))
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(var, format!("'{value}' is not a boolean"))),
    }
}

fn parse_money(var: &str, value: &str) -> ConfigResult<Decimal> {
    let amount: Decimal = parse(var, value)?;
    if amount.is_sign_negative() {
        return Err(ConfigError::env(var, "budget cannot be negative"));
    }
    Ok(amount)
}

/// Percentages like `75` become fractions like `0.75`
fn parse_percent(var: &str, value: &str) -> ConfigResult<Decimal> {
    let pct: Decimal = parse(var, value)?;
    Ok(pct / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_budget_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("DAILY_BUDGET", "50"),
                ("MONTHLY_BUDGET", "1500.50"),
                ("COST_ALERT_WARNING", "80"),
                ("COST_ALERT_EMERGENCY", "99.5"),
            ]),
        )
        .expect("overrides");

        assert_eq!(config.budgets.global.daily, Some(dec!(50)));
        assert_eq!(config.budgets.global.weekly, Some(dec!(500)));
        assert_eq!(config.budgets.global.monthly, Some(dec!(1500.50)));
        assert_eq!(config.budgets.thresholds.warning, dec!(0.80));
        assert_eq!(config.budgets.thresholds.critical, dec!(0.90));
        assert_eq!(config.budgets.thresholds.emergency, dec!(0.995));
    }

    #[test]
    fn test_guardrail_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("BLOCK_PII", "false"),
                ("BLOCK_SEXUAL", "0"),
                ("MAX_INPUT_TOKENS", "100"),
                ("SCAN_FOR_SECRETS", "FALSE"),
            ]),
        )
        .expect("overrides");

        assert!(!config.guardrails.block_pii);
        assert!(!config.guardrails.block_sexual);
        assert!(config.guardrails.block_toxic);
        assert!(!config.guardrails.scan_for_secrets);
        assert_eq!(config.guardrails.max_input_tokens, 100);
    }

    #[test]
    fn test_secret_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("GATEWAY_MASTER_KEY", "sk-master"),
                ("GATEWAY_PIN_PRINCIPAL", "true"),
                ("UPSTREAM_TIMEOUT_SECS", "5"),
            ]),
        )
        .expect("overrides");

        assert!(config.auth.pin_principal_to_key);

        let key = config.auth.master_key.expect("key set");
        assert_eq!(key.expose_secret(), "sk-master");
        assert_eq!(config.upstream.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, lookup(&[("GATEWAY_PORT", "  ")])).expect("overrides");
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = GatewayConfig::default();
        let err = apply_env_overrides(&mut config, lookup(&[("BLOCK_TOXIC", "maybe")]))
            .expect_err("bad bool");
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "BLOCK_TOXIC"));

        let err = apply_env_overrides(&mut config, lookup(&[("DAILY_BUDGET", "-1")]))
            .expect_err("negative");
        assert!(matches!(err, ConfigError::Env { .. }));

        let err = apply_env_overrides(&mut config, lookup(&[("GATEWAY_PORT", "http")]))
            .expect_err("bad port");
        assert!(err.to_string().contains("GATEWAY_PORT"));
    }
}
