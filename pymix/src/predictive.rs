//! Posterior predictive densities of a chain.

use rv::misc::LogSumExp;
use rv::traits::HasDensity;

use crate::models::CollapsedModel;
use crate::state::ChainState;
use crate::utils::normalized_probabilities;

/// Predictive density of the next observation given one chain state: a
/// mixture over the occupied tables and a fresh table.
#[derive(Clone, Debug)]
pub struct Predictive<M: CollapsedModel> {
    model: M,
    hyper: M::Hyper,
    ln_weights: Vec<f64>,
    stats: Vec<M::Stat>,
}

impl<M: CollapsedModel + Clone> Predictive<M> {
    #[must_use]
    pub fn from_state(state: &ChainState<M>) -> Self {
        let clustering = state.clustering();
        let prior = state.prior();
        let n_tables = clustering.n_tables();

        let (mut ln_weights, mut stats): (Vec<f64>, Vec<M::Stat>) = clustering
            .tables()
            .map(|(_, table)| {
                (
                    prior.ln_unnormalized_predictive(table.len(), n_tables),
                    table.stat().clone(),
                )
            })
            .unzip();
        ln_weights.push(prior.ln_unnormalized_predictive(0, n_tables));
        stats.push(state.model().empty_stat(state.hyper()));

        let ln_weights = normalized_probabilities(&ln_weights)
            .into_iter()
            .map(f64::ln)
            .collect();

        Self {
            model: state.model().clone(),
            hyper: state.hyper().clone(),
            ln_weights,
            stats,
        }
    }
}

impl<M: CollapsedModel> Predictive<M> {
    /// Normalized log weights; the fresh table is last.
    #[must_use]
    pub fn ln_weights(&self) -> &[f64] {
        &self.ln_weights
    }

    #[must_use]
    pub fn n_components(&self) -> usize {
        self.stats.len()
    }

    /// Log predictive density at `x`.
    ///
    /// # Panics
    /// If `x` is incompatible with the hyper parameter of the chain.
    pub fn ln_f(&self, x: &M::Datum) -> f64 {
        self.ln_weights
            .iter()
            .zip(self.stats.iter())
            .map(|(w, stat)| {
                let ln_pp = self
                    .model
                    .ln_pp(&self.hyper, x, stat)
                    .unwrap_or_else(|err| panic!("cannot evaluate predictive: {err}"));
                w + ln_pp
            })
            .logsumexp()
    }
}

impl<M: CollapsedModel> HasDensity<M::Datum> for Predictive<M> {
    fn ln_f(&self, x: &M::Datum) -> f64 {
        Self::ln_f(self, x)
    }
}

/// Equal-weight average of predictive densities collected along a chain.
#[derive(Clone, Debug)]
pub struct AveragedPredictive<M: CollapsedModel> {
    snapshots: Vec<Predictive<M>>,
}

impl<M: CollapsedModel> Default for AveragedPredictive<M> {
    fn default() -> Self {
        Self {
            snapshots: Vec::new(),
        }
    }
}

impl<M: CollapsedModel> AveragedPredictive<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predictive: Predictive<M>) {
        self.snapshots.push(predictive);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// `ln((1/N) sum_i f_i(x))`; `-inf` before any snapshot is added.
    pub fn ln_f(&self, x: &M::Datum) -> f64 {
        if self.snapshots.is_empty() {
            return f64::NEG_INFINITY;
        }
        #[allow(clippy::cast_precision_loss)]
        let ln_n = (self.snapshots.len() as f64).ln();
        self.snapshots.iter().map(|p| p.ln_f(x)).logsumexp() - ln_n
    }
}

impl<M: CollapsedModel> HasDensity<M::Datum> for AveragedPredictive<M> {
    fn ln_f(&self, x: &M::Datum) -> f64 {
        Self::ln_f(self, x)
    }
}
