//! Priors over a single scalar variable.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use super::{PotentialFactor, ScalarVariable};

/// Log density, up to a constant, of a prior over one real value.
pub trait RealNodePrior {
    fn ln_density(&self, x: f64) -> f64;
}

/// Exponential prior with the given rate, shifted to start at `min`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExponentialPrior {
    rate: f64,
    min: f64,
}

impl ExponentialPrior {
    /// Exponential on `[0, inf)` with rate (not mean) `rate`.
    #[must_use]
    pub const fn with_rate(rate: f64) -> Self {
        Self { rate, min: 0.0 }
    }

    /// The same prior moved to start at `min`, so that `x - min` is exponential.
    #[must_use]
    pub const fn truncate_at(self, min: f64) -> Self {
        Self { min, ..self }
    }

    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }
}

impl RealNodePrior for ExponentialPrior {
    fn ln_density(&self, x: f64) -> f64 {
        if x < self.min {
            f64::NEG_INFINITY
        } else {
            -self.rate * (x - self.min)
        }
    }
}

/// Uniform prior on `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformPrior {
    min: f64,
    max: f64,
}

impl UniformPrior {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn unit_interval() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl RealNodePrior for UniformPrior {
    fn ln_density(&self, x: f64) -> f64 {
        if (self.min..=self.max).contains(&x) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// A [`RealNodePrior`] bound to the variable it is a prior on.
pub struct PriorFactor<S, V, P> {
    name: String,
    variable: V,
    prior: P,
    _phantom_s: PhantomData<fn(&S)>,
}

impl<S, V, P> PriorFactor<S, V, P>
where
    V: ScalarVariable<S>,
    P: RealNodePrior,
{
    pub fn new(variable: V, prior: P) -> Self {
        Self {
            name: format!("prior({})", variable.name()),
            variable,
            prior,
            _phantom_s: PhantomData,
        }
    }
}

impl<S, V, P> PotentialFactor<S> for PriorFactor<S, V, P>
where
    V: ScalarVariable<S>,
    P: RealNodePrior,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn ln_potential(&self, state: &S) -> f64 {
        self.prior.ln_density(self.variable.get(state))
    }
}
