//! Configuration loading.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use accredit_core::attainment::AttainmentPolicy;
use accredit_core::engine::{WorkflowConfig, WorkflowEngine};
use accredit_core::grading::GradingPolicy;
use accredit_core::traits::{CatalogRepository, Clock, MarkRepository};
use accredit_core::validator::{MarkValidator, ValidationRules};

/// Top-level accredit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccreditConfig {
    /// Edit window and batch settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Internal combination, pass mark, and grade scale.
    #[serde(default)]
    pub grading: GradingPolicy,
    /// Direct / indirect blend for PO attainment.
    #[serde(default)]
    pub attainment: AttainmentPolicy,
    /// Extra mark entry rules.
    #[serde(default)]
    pub validation: ValidationRules,
}

impl AccreditConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.batch_size == 0 {
            anyhow::bail!("workflow.batch_size must be at least 1");
        }
        if self.workflow.batch_parallelism == 0 {
            anyhow::bail!("workflow.batch_parallelism must be at least 1");
        }
        if self.workflow.edit_window_days < 0 {
            anyhow::bail!("workflow.edit_window_days must not be negative");
        }
        if let Some(step) = self.validation.mark_step {
            if step.is_nan() || step <= 0.0 {
                anyhow::bail!("validation.mark_step must be positive");
            }
        }
        self.grading.validate().context("invalid [grading] section")?;
        self.attainment
            .validate()
            .context("invalid [attainment] section")?;
        Ok(())
    }

    /// Validator applying the `[validation]` rules.
    pub fn mark_validator(&self) -> MarkValidator {
        MarkValidator::new(self.validation.clone())
    }

    /// Workflow engine using the `[workflow]` settings and `[validation]` rules.
    pub fn workflow_engine(
        &self,
        marks: Arc<dyn MarkRepository>,
        catalog: Arc<dyn CatalogRepository>,
        clock: Arc<dyn Clock>,
    ) -> WorkflowEngine {
        WorkflowEngine::new(marks, catalog, clock, self.workflow.clone())
            .with_validator(self.mark_validator())
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `accredit.toml` in the current directory
/// 2. `~/.config/accredit/config.toml`
///
/// Environment variable overrides: `ACCREDIT_EDIT_WINDOW_DAYS`,
/// `ACCREDIT_BATCH_SIZE`, `ACCREDIT_PASS_PERCENTAGE`, `ACCREDIT_INTERNAL_METHOD`.
pub fn load_config() -> Result<AccreditConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AccreditConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("accredit.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AccreditConfig::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    match &config_path {
        Some(path) => tracing::debug!("loaded config from {}", path.display()),
        None => tracing::debug!("no config file found, using defaults"),
    }
    Ok(config)
}

/// Parse a TOML config string.
pub fn parse_config(content: &str) -> Result<AccreditConfig> {
    Ok(toml::from_str(content)?)
}

/// Apply overrides from `lookup` (normally the process environment).
pub fn apply_overrides(
    config: &mut AccreditConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup("ACCREDIT_EDIT_WINDOW_DAYS") {
        config.workflow.edit_window_days = v
            .trim()
            .parse()
            .with_context(|| format!("ACCREDIT_EDIT_WINDOW_DAYS is not an integer: {v}"))?;
    }
    if let Some(v) = lookup("ACCREDIT_BATCH_SIZE") {
        config.workflow.batch_size = v
            .trim()
            .parse()
            .with_context(|| format!("ACCREDIT_BATCH_SIZE is not an integer: {v}"))?;
    }
    if let Some(v) = lookup("ACCREDIT_PASS_PERCENTAGE") {
        config.grading.pass_percentage = v
            .trim()
            .parse()
            .with_context(|| format!("ACCREDIT_PASS_PERCENTAGE is not a number: {v}"))?;
    }
    if let Some(v) = lookup("ACCREDIT_INTERNAL_METHOD") {
        config.grading.internal_method = v
            .parse()
            .map_err(|e: String| anyhow::anyhow!("ACCREDIT_INTERNAL_METHOD: {e}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("accredit"))
}
