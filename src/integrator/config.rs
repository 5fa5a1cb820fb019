//! Sampler configuration.
//!
//! Defaults match the values the integrators have always shipped with:
//! a uniform Beta(1, 1) label prior, a Beta(1, 2) error-rate prior that
//! favours classifiers better than chance, 4000 burn-in sweeps, thinning of
//! 10 and 200 retained samples.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be finite and > 0 (got {value})")]
    InvalidPrior { name: &'static str, value: f64 },
    #[error("DP concentration alpha must be finite and > 0 (got {0})")]
    InvalidConcentration(f64),
    #[error("number_of_samples must be >= 1")]
    NoSamples,
    #[error("invalid options string {options:?}: {message}")]
    InvalidOptions { options: String, message: String },
}

/// Configuration shared by both Bayesian integrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    // -- Priors --------------------------------------------------------------
    /// Beta prior pseudo-count for label = 1.
    pub labels_prior_alpha: f64,
    /// Beta prior pseudo-count for label = 0.
    pub labels_prior_beta: f64,
    /// Beta prior pseudo-count for disagreements.
    pub error_rates_prior_alpha: f64,
    /// Beta prior pseudo-count for agreements.
    pub error_rates_prior_beta: f64,

    // -- Chain length --------------------------------------------------------
    pub number_of_burn_in_samples: usize,
    /// Discarded sweeps between consecutive retained samples.
    pub number_of_thinning_samples: usize,
    /// Retained samples averaged into the posterior means (including the
    /// state at the end of burn-in).
    pub number_of_samples: usize,

    /// RNG seed. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Sample independent domains on separate threads (uncoupled integrator only).
    pub parallel_domains: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            labels_prior_alpha: 1.0,
            labels_prior_beta: 1.0,
            error_rates_prior_alpha: 1.0,
            error_rates_prior_beta: 2.0,
            number_of_burn_in_samples: 4000,
            number_of_thinning_samples: 10,
            number_of_samples: 200,
            seed: None,
            parallel_domains: false,
        }
    }
}

fn check_prior(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidPrior { name, value })
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_prior("labels_prior_alpha", self.labels_prior_alpha)?;
        check_prior("labels_prior_beta", self.labels_prior_beta)?;
        check_prior("error_rates_prior_alpha", self.error_rates_prior_alpha)?;
        check_prior("error_rates_prior_beta", self.error_rates_prior_beta)?;
        if self.number_of_samples == 0 {
            return Err(ConfigError::NoSamples);
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse `"burnIn:thinning:samples:labelsAlpha:labelsBeta:errorAlpha:errorBeta"`.
    ///
    /// A field equal to `-` keeps the default. An empty string yields the defaults.
    pub fn from_options(options: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if options.trim().is_empty() {
            return Ok(cfg);
        }
        let fields = split_options(options, 7)?;
        cfg.apply_fields(options, &fields)?;
        Ok(cfg)
    }

    fn apply_fields(&mut self, options: &str, fields: &[&str]) -> Result<(), ConfigError> {
        set_field(options, fields[0], &mut self.number_of_burn_in_samples)?;
        set_field(options, fields[1], &mut self.number_of_thinning_samples)?;
        set_field(options, fields[2], &mut self.number_of_samples)?;
        set_field(options, fields[3], &mut self.labels_prior_alpha)?;
        set_field(options, fields[4], &mut self.labels_prior_beta)?;
        set_field(options, fields[5], &mut self.error_rates_prior_alpha)?;
        set_field(options, fields[6], &mut self.error_rates_prior_beta)?;
        Ok(())
    }
}

/// Configuration of the coupled (Dirichlet-process) integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoupledConfig {
    #[serde(flatten)]
    pub sampler: SamplerConfig,
    /// DP concentration. Small values pool domains into few clusters,
    /// large values keep every domain on its own.
    pub alpha: f64,
}

impl Default for CoupledConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            alpha: 1.0,
        }
    }
}

impl CoupledConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampler.validate()?;
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(ConfigError::InvalidConcentration(self.alpha));
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampler.seed = Some(seed);
        self
    }

    /// Same layout as [`SamplerConfig::from_options`] plus an eighth `alpha` field.
    pub fn from_options(options: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if options.trim().is_empty() {
            return Ok(cfg);
        }
        let fields = split_options(options, 8)?;
        cfg.sampler.apply_fields(options, &fields)?;
        set_field(options, fields[7], &mut cfg.alpha)?;
        Ok(cfg)
    }
}

fn split_options(options: &str, expected: usize) -> Result<Vec<&str>, ConfigError> {
    let fields: Vec<&str> = options.split(':').map(str::trim).collect();
    if fields.len() != expected {
        return Err(ConfigError::InvalidOptions {
            options: options.to_string(),
            message: format!("expected {expected} fields, found {}", fields.len()),
        });
    }
    Ok(fields)
}

fn set_field<T: std::str::FromStr>(
    options: &str,
    raw: &str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    if raw == "-" {
        return Ok(());
    }
    *target = raw.parse::<T>().map_err(|e| ConfigError::InvalidOptions {
        options: options.to_string(),
        message: format!("field {raw:?}: {e}"),
    })?;
    Ok(())
}
