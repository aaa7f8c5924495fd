use std::fmt::Debug;

use crate::error::Result;

/// A generic trait for models which have some scoring function.
pub trait Model<D: ?Sized> {
    /// Log joint probability or any generic log score.
    ///
    /// Arguments
    /// =========
    ///
    /// * `data` - The data to which the model is being applied.
    fn ln_score(&self, data: &D) -> f64;
}

/// An aggregable, exactly reversible summary of a set of observations.
pub trait SufficientStatistic<X> {
    /// Number of observations summarized.
    fn n(&self) -> usize;
    /// Absorb one observation.
    fn observe(&mut self, x: &X);
    /// Remove one previously observed observation.
    fn forget(&mut self, x: &X);
    /// Absorb every observation summarized by `other`.
    fn merge(&mut self, other: &Self);
    /// Remove every observation summarized by `other`.
    fn remove(&mut self, other: &Self);
}

/// Conjugate observation model with the component parameter integrated out.
///
/// Implementors hold no state; a single value is passed to every call site.
pub trait CollapsedModel {
    type Datum;
    type Stat: SufficientStatistic<Self::Datum> + Clone + Debug;
    type Hyper: Clone + Debug;

    /// Statistic summarizing zero observations, shaped for `hp`.
    fn empty_stat(&self, hp: &Self::Hyper) -> Self::Stat;

    /// Statistic summarizing the single observation `x`, shaped for `x`.
    fn stat_of(&self, x: &Self::Datum) -> Self::Stat;

    /// Log marginal likelihood of the observations in `stat` under `hp`.
    ///
    /// # Errors
    /// When `hp` and `stat` are incompatible.
    fn ln_marginal(&self, hp: &Self::Hyper, stat: &Self::Stat) -> Result<f64>;

    /// Posterior hyper parameter after absorbing `stat`.
    ///
    /// # Errors
    /// When `hp` and `stat` are incompatible.
    fn update(&self, hp: &Self::Hyper, stat: &Self::Stat) -> Result<Self::Hyper>;

    /// Log probability of `new` given `old` has already been observed.
    ///
    /// # Errors
    /// When `hp` and either statistic are incompatible.
    fn ln_predictive(
        &self,
        hp: &Self::Hyper,
        new: &Self::Stat,
        old: &Self::Stat,
    ) -> Result<f64> {
        // Both marginals validate their statistic before the merge touches it.
        let ln_m_old = self.ln_marginal(hp, old)?;
        self.ln_marginal(hp, new)?;

        let mut joint = old.clone();
        joint.merge(new);
        Ok(self.ln_marginal(hp, &joint)? - ln_m_old)
    }

    /// Log posterior predictive of a single datum given `old`.
    ///
    /// # Errors
    /// When `hp` and `old` or `x` are incompatible.
    fn ln_pp(&self, hp: &Self::Hyper, x: &Self::Datum, old: &Self::Stat) -> Result<f64> {
        self.ln_predictive(hp, &self.stat_of(x), old)
    }
}

pub mod niw;
pub mod pitman_yor;
