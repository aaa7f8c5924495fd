use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use rv::prelude::Gaussian;
use rv::traits::Sampleable;
use tracing::trace;

use crate::error::Result;
use crate::mcmc::factors::{PriorFactor, RealNodePrior};
use crate::mcmc::{PotentialFactor, Sampler, ScalarVariable};
use crate::utils::{MeanAndVariance, NoPrettyPrint};

/// Probability of accepting a move from log potential `before` to `after`.
///
/// A proposal into an infeasible region (`after == -inf`) is never accepted,
/// which also covers the case where both sides are infeasible.
#[must_use]
pub fn acceptance_probability(before: f64, after: f64) -> f64 {
    if after == f64::NEG_INFINITY || after.is_nan() {
        0.0
    } else if before == f64::NEG_INFINITY {
        1.0
    } else {
        (after - before).exp().min(1.0)
    }
}

/// Symmetric random walk Metropolis-Hastings move on one scalar variable.
///
/// Each call to [`RealVariableMove::sample`] draws one standard normal and then
/// one uniform from the generator.
pub struct RealVariableMove<S> {
    variable: Arc<dyn ScalarVariable<S>>,
    factors: Vec<Arc<dyn PotentialFactor<S>>>,
    step_scale: f64,
    proposal: Gaussian,
    acceptance: MeanAndVariance<f64>,
}

impl<S> RealVariableMove<S> {
    /// Bind `variable` to the factors connected to it. Every factor whose
    /// value depends on the variable must be provided, or the chain will
    /// target the wrong distribution.
    pub fn new(
        variable: Arc<dyn ScalarVariable<S>>,
        factors: Vec<Arc<dyn PotentialFactor<S>>>,
    ) -> Self {
        Self {
            variable,
            factors,
            step_scale: 1.0,
            proposal: Gaussian::standard(),
            acceptance: MeanAndVariance::default(),
        }
    }

    /// Standard deviation of the random walk proposal.
    #[must_use]
    pub fn with_step_scale(self, step_scale: f64) -> Self {
        Self { step_scale, ..self }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.variable.name()
    }

    #[must_use]
    pub const fn step_scale(&self) -> f64 {
        self.step_scale
    }

    /// Running statistics of the acceptance probabilities of every proposal.
    #[must_use]
    pub const fn acceptance(&self) -> &MeanAndVariance<f64> {
        &self.acceptance
    }

    /// Names of the factors this move evaluates.
    pub fn factor_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.factors.iter().map(|f| f.name())
    }

    /// Sum of the connected factors; NaN is treated as infeasible.
    pub fn ln_potential(&self, state: &S) -> f64 {
        let total: f64 = self.factors.iter().map(|f| f.ln_potential(state)).sum();
        if total.is_nan() {
            f64::NEG_INFINITY
        } else {
            total
        }
    }

    /// Propose, then accept or revert. Returns whether the proposal was accepted.
    ///
    /// # Errors
    /// If restoring the previous value is refused by the variable's owner.
    pub fn sample<R: Rng>(&mut self, state: &mut S, rng: &mut R) -> Result<bool> {
        let current = self.variable.get(state);
        let before = self.ln_potential(state);

        let z: f64 = self.proposal.draw(rng);
        let candidate = self.step_scale.mul_add(z, current);

        let (after, was_set) = match self.variable.set(state, candidate) {
            Ok(()) => (self.ln_potential(state), true),
            Err(err) => {
                trace!(variable = self.variable.name(), candidate, %err, "proposal refused");
                (f64::NEG_INFINITY, false)
            }
        };

        let accept_p = acceptance_probability(before, after);
        self.acceptance = self.acceptance.update(accept_p);

        let u: f64 = rng.random();
        let accepted = u < accept_p;
        if !accepted && was_set {
            self.variable.set(state, current)?;
        }

        trace!(
            variable = self.variable.name(),
            current,
            candidate,
            before,
            after,
            accepted,
            "mh move"
        );
        Ok(accepted)
    }
}

impl<S> std::fmt::Debug for RealVariableMove<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealVariableMove")
            .field("variable", &self.variable.name())
            .field("factors", &NoPrettyPrint::new(self.factor_names().collect::<Vec<_>>()))
            .field("step_scale", &self.step_scale)
            .field("acceptance", &self.acceptance)
            .finish_non_exhaustive()
    }
}

/// An alternation of [`RealVariableMove`]s, run in a freshly shuffled order on
/// every round.
pub struct MetropolisHastings<S> {
    moves: Vec<RealVariableMove<S>>,
    step_scale: f64,
}

impl<S> std::fmt::Debug for MetropolisHastings<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetropolisHastings")
            .field("moves", &self.moves)
            .field("step_scale", &self.step_scale)
            .finish()
    }
}

impl<S> Default for MetropolisHastings<S> {
    fn default() -> Self {
        Self {
            moves: Vec::new(),
            step_scale: 1.0,
        }
    }
}

impl<S: 'static> MetropolisHastings<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Step scale given to moves added after this call.
    #[must_use]
    pub fn with_step_scale(self, step_scale: f64) -> Self {
        Self { step_scale, ..self }
    }

    /// Resample `variable`, which is connected to `factors`.
    pub fn add<V>(&mut self, variable: V, factors: Vec<Arc<dyn PotentialFactor<S>>>)
    where
        V: ScalarVariable<S> + 'static,
    {
        self.moves
            .push(RealVariableMove::new(Arc::new(variable), factors).with_step_scale(self.step_scale));
    }

    /// Resample `variable` under `prior`, also connected to `factors`.
    pub fn add_with_prior<V, P>(
        &mut self,
        variable: V,
        prior: P,
        mut factors: Vec<Arc<dyn PotentialFactor<S>>>,
    ) where
        V: ScalarVariable<S> + Clone + 'static,
        P: RealNodePrior + 'static,
    {
        factors.push(Arc::new(PriorFactor::new(variable.clone(), prior)));
        self.add(variable, factors);
    }

    #[must_use]
    pub fn n_variables(&self) -> usize {
        self.moves.len()
    }

    #[must_use]
    pub fn moves(&self) -> &[RealVariableMove<S>] {
        &self.moves
    }

    /// Shuffle the moves and run each once; later moves see the values left by
    /// earlier ones. Returns the number of accepted proposals.
    ///
    /// # Errors
    /// See [`RealVariableMove::sample`].
    pub fn sample_round<R: Rng>(&mut self, state: &mut S, rng: &mut R) -> Result<usize> {
        self.moves.shuffle(rng);
        let mut n_accepted = 0;
        for mv in &mut self.moves {
            if mv.sample(state, rng)? {
                n_accepted += 1;
            }
        }
        Ok(n_accepted)
    }
}

impl<S: 'static> Sampler<S, ()> for MetropolisHastings<S> {
    fn step<R: Rng>(&mut self, model: &mut S, _data: &(), rng: &mut R) -> Result<()> {
        self.sample_round(model, rng).map(|_| ())
    }
}
