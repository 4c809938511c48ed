// src/config/validate.rs

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::model::{BatchConfig, ExperimentConfig, RawBatchConfig, builtin_experiments};
use crate::errors::{BatchError, Result};
use crate::units::YearMonth;
use crate::units::year_month::parse_month_label;

impl TryFrom<RawBatchConfig> for BatchConfig {
    type Error = crate::errors::BatchError;

    fn try_from(raw: RawBatchConfig) -> std::result::Result<Self, Self::Error> {
        validate_batch_section(&raw)?;
        validate_retry_section(&raw)?;
        let months = parse_months(&raw)?;
        let experiments = resolve_experiments(&raw)?;
        validate_endpoints(&raw)?;
        let chain_origin = parse_chain_origin(&raw)?;
        warn_unknown_experiments(&raw, &experiments);

        Ok(BatchConfig::new_unchecked(
            raw,
            experiments,
            months,
            chain_origin,
        ))
    }
}

fn config_error(message: impl Into<String>) -> BatchError {
    BatchError::ConfigError(message.into())
}

fn validate_batch_section(cfg: &RawBatchConfig) -> Result<()> {
    if cfg.batch.bucket.trim().is_empty() {
        return Err(config_error("[batch].bucket cannot be empty"));
    }

    if cfg.batch.basins.is_empty() {
        return Err(config_error("[batch].basins must list at least one basin"));
    }
    if let Some(blank) = cfg.batch.basins.iter().find(|b| b.trim().is_empty()) {
        return Err(config_error(format!(
            "[batch].basins contains an empty basin id ({blank:?})"
        )));
    }

    if cfg.batch.start_year > cfg.batch.end_year {
        return Err(config_error(format!(
            "[batch].start_year ({}) must not be after end_year ({})",
            cfg.batch.start_year, cfg.batch.end_year
        )));
    }

    if cfg.batch.arch.trim().is_empty() {
        return Err(config_error("[batch].arch cannot be empty"));
    }

    Ok(())
}

fn validate_retry_section(cfg: &RawBatchConfig) -> Result<()> {
    if cfg.retry.max_attempts == 0 {
        return Err(config_error(
            "[retry].max_attempts must be >= 1 (got 0)",
        ));
    }
    if cfg.retry.unit_attempts == 0 {
        return Err(config_error(
            "[retry].unit_attempts must be >= 1 (got 0)",
        ));
    }
    if let Some(0) = cfg.retry.max_passes {
        return Err(config_error("[retry].max_passes must be >= 1 when set"));
    }
    Ok(())
}

fn parse_months(cfg: &RawBatchConfig) -> Result<Vec<u8>> {
    if cfg.batch.months.is_empty() {
        return Err(config_error("[batch].months must list at least one month"));
    }

    let mut months = Vec::with_capacity(cfg.batch.months.len());
    for label in cfg.batch.months.iter() {
        let month = parse_month_label(label).map_err(|e| config_error(format!("[batch].months: {e}")))?;
        if months.contains(&month) {
            return Err(config_error(format!(
                "[batch].months lists month {month:02} more than once"
            )));
        }
        months.push(month);
    }
    Ok(months)
}

/// An explicitly configured experiment must name at least one model and
/// one step; an empty set there is an invalid combination, not a skip.
fn resolve_experiments(cfg: &RawBatchConfig) -> Result<BTreeMap<String, ExperimentConfig>> {
    if cfg.experiment.is_empty() {
        return Ok(builtin_experiments());
    }

    for (name, exp) in cfg.experiment.iter() {
        if exp.models.is_empty() || exp.models.iter().any(|m| m.trim().is_empty()) {
            return Err(config_error(format!(
                "experiment '{name}' must list at least one non-empty model"
            )));
        }
        if exp.steps.is_empty() || exp.steps.iter().any(|s| s.trim().is_empty()) {
            return Err(config_error(format!(
                "experiment '{name}' must list at least one non-empty step"
            )));
        }
    }

    Ok(cfg.experiment.clone())
}

fn validate_endpoints(cfg: &RawBatchConfig) -> Result<()> {
    for (arch, endpoint) in cfg.endpoints.iter() {
        if endpoint.target.trim().is_empty() {
            return Err(config_error(format!(
                "[endpoints.{arch}].target cannot be empty"
            )));
        }
    }

    if !cfg.endpoints.is_empty() && !cfg.endpoints.contains_key(&cfg.batch.arch) {
        let known: Vec<&str> = cfg.endpoints.keys().map(String::as_str).collect();
        return Err(config_error(format!(
            "unsupported architecture '{}' (configured endpoints: {:?})",
            cfg.batch.arch, known
        )));
    }

    Ok(())
}

fn parse_chain_origin(cfg: &RawBatchConfig) -> Result<Option<YearMonth>> {
    match cfg.chain.origin.as_deref() {
        None => Ok(None),
        Some(label) => label
            .parse::<YearMonth>()
            .map(Some)
            .map_err(|e| config_error(format!("[chain].origin: {e}"))),
    }
}

fn warn_unknown_experiments(cfg: &RawBatchConfig, experiments: &BTreeMap<String, ExperimentConfig>) {
    for name in cfg.batch.experiments.iter() {
        if !experiments.contains_key(name) {
            warn!(
                experiment = %name,
                "experiment has no model/step mapping; it will be skipped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<BatchConfig> {
        let raw: RawBatchConfig = toml::from_str(toml_text)?;
        BatchConfig::try_from(raw)
    }

    const MINIMAL: &str = r#"
[batch]
bucket = "currnt-data"
basins = ["74"]
start_year = 1980
end_year = 1980
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(MINIMAL).expect("valid config");
        assert_eq!(cfg.months().len(), 12);
        assert_eq!(cfg.months()[0], 1);
        assert_eq!(cfg.retry.max_attempts, 25);
        assert_eq!(cfg.retry.interval_secs, 10);
        assert_eq!(cfg.retry.rescan_interval_secs, 1200);
        assert_eq!(cfg.batch.experiments, vec!["GLDAS".to_string()]);
        assert_eq!(cfg.experiments["NLDAS"].steps, vec!["H", "M"]);
        assert!(cfg.chain_origin().is_none());
        assert!(cfg.endpoint().is_none());
    }

    #[test]
    fn rejects_inverted_year_range() {
        let err = parse(
            r#"
[batch]
bucket = "b"
basins = ["74"]
start_year = 1981
end_year = 1980
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::ConfigError(msg) if msg.contains("start_year")));
    }

    #[test]
    fn rejects_month_thirteen() {
        let err = parse(
            r#"
[batch]
bucket = "b"
basins = ["74"]
start_year = 1980
end_year = 1980
months = ["12", "13"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::ConfigError(msg) if msg.contains("months")));
    }

    #[test]
    fn rejects_experiment_without_steps() {
        let err = parse(&format!(
            "{MINIMAL}\n[experiment.GLDAS]\nmodels = [\"VIC\"]\nsteps = []\n"
        ))
        .unwrap_err();
        assert!(matches!(err, BatchError::ConfigError(msg) if msg.contains("step")));
    }

    #[test]
    fn rejects_arch_missing_from_endpoints() {
        let err = parse(
            r#"
[batch]
bucket = "b"
basins = ["74"]
start_year = 1980
end_year = 1980
arch = "riscv"

[endpoints.x86_64]
kind = "sqs"
target = "https://sqs.us-west-2.amazonaws.com/1/q.fifo"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::ConfigError(msg) if msg.contains("riscv")));
    }

    #[test]
    fn resolves_endpoint_for_arch() {
        let cfg = parse(
            r#"
[batch]
bucket = "b"
basins = ["74"]
start_year = 1980
end_year = 1980
arch = "arm64"

[endpoints.arm64]
kind = "lambda"
target = "rapid-arm64"
"#,
        )
        .expect("valid config");
        let endpoint = cfg.endpoint().expect("endpoint for arm64");
        assert_eq!(endpoint.target, "rapid-arm64");
        assert_eq!(endpoint.message_group_id, "default-group");
    }

    #[test]
    fn unknown_batch_experiment_is_not_an_error() {
        let cfg = parse(
            r#"
[batch]
bucket = "b"
basins = ["74"]
start_year = 1980
end_year = 1980
experiments = ["GLDAS", "ERA5"]
"#,
        )
        .expect("unknown experiments are skipped, not rejected");
        assert!(!cfg.experiments.contains_key("ERA5"));
    }

    #[test]
    fn rejects_bad_chain_origin() {
        let err = parse(&format!("{MINIMAL}\n[chain]\norigin = \"1979-13\"\n")).unwrap_err();
        assert!(matches!(err, BatchError::ConfigError(msg) if msg.contains("origin")));
    }
}
