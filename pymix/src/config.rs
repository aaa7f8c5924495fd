//! Sampler settings, loadable from TOML.

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::niw::NiwHyperParameter;
use crate::models::pitman_yor::PitmanYorPrior;

/// Which hyper parameters receive Metropolis-Hastings moves, and the rates of
/// their exponential priors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResampleConfig {
    pub strength: bool,
    pub discount: bool,
    pub kappa: bool,
    pub nu: bool,
    pub strength_rate: f64,
    pub kappa_rate: f64,
    pub nu_rate: f64,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            strength: true,
            discount: true,
            kappa: true,
            nu: true,
            strength_rate: 1.0,
            kappa_rate: 1.0,
            nu_rate: 1.0,
        }
    }
}

impl ResampleConfig {
    /// No hyper parameter moves; only the seating is sampled.
    #[must_use]
    pub fn none() -> Self {
        Self {
            strength: false,
            discount: false,
            kappa: false,
            nu: false,
            ..Self::default()
        }
    }
}

/// Settings of one chain.
///
/// ```toml
/// strength = 1.0
/// discount = 0.1
/// seed = 7
///
/// [resample]
/// nu = false
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Initial Pitman-Yor strength (alpha0).
    pub strength: f64,
    /// Initial Pitman-Yor discount.
    pub discount: f64,
    /// Standard deviation of every random walk proposal.
    pub step_scale: f64,
    pub kappa: f64,
    /// Defaults to the dimension plus one.
    pub nu: Option<f64>,
    /// Defaults to the origin.
    pub prior_mean: Option<Vec<f64>>,
    /// The prior scatter matrix is this multiple of the identity.
    pub scatter_scale: f64,
    pub seed: u64,
    pub resample: ResampleConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strength: 1.0,
            discount: 0.0,
            step_scale: 1.0,
            kappa: 1.0,
            nu: None,
            prior_mean: None,
            scatter_scale: 1.0,
            seed: 1,
            resample: ResampleConfig::default(),
        }
    }
}

impl SamplerConfig {
    /// Parse and validate.
    ///
    /// # Errors
    /// On malformed TOML or invalid settings.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate the file at `path`.
    ///
    /// # Errors
    /// On I/O failure, malformed TOML, or invalid settings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check every setting that does not depend on the data dimension.
    ///
    /// # Errors
    /// The first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        self.prior()?;
        positive("kappa", self.kappa)?;
        positive("scatter_scale", self.scatter_scale)?;
        positive("resample.strength_rate", self.resample.strength_rate)?;
        positive("resample.kappa_rate", self.resample.kappa_rate)?;
        positive("resample.nu_rate", self.resample.nu_rate)?;
        if !(self.step_scale.is_finite() && self.step_scale >= 0.0) {
            return Err(Error::InvalidHyperParameter {
                name: "step_scale",
                value: self.step_scale,
                reason: "must be finite and non-negative",
            });
        }
        Ok(())
    }

    /// Initial clustering prior.
    ///
    /// # Errors
    /// If strength and discount are out of bounds.
    pub fn prior(&self) -> Result<PitmanYorPrior> {
        PitmanYorPrior::new(self.strength, self.discount)
    }

    /// Initial NIW hyper parameter for observations of dimension `dim`.
    ///
    /// # Errors
    /// If the prior mean has the wrong length, or the hyper parameter is
    /// invalid for `dim`.
    pub fn hyper_parameter(&self, dim: usize) -> Result<NiwHyperParameter> {
        let mu = match &self.prior_mean {
            Some(mean) if mean.len() != dim => {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: mean.len(),
                });
            }
            Some(mean) => DVector::from_column_slice(mean),
            None => DVector::zeros(dim),
        };
        #[allow(clippy::cast_precision_loss)]
        let nu = self.nu.unwrap_or(dim as f64 + 1.0);
        let scatter = DMatrix::identity(dim, dim) * self.scatter_scale;
        NiwHyperParameter::new(mu, self.kappa, scatter, nu)
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidHyperParameter {
            name,
            value,
            reason: "must be positive and finite",
        })
    }
}
