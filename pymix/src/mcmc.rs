use rand::Rng;

use crate::error::Result;

pub mod factors;
pub mod samplers;

/// Trait for Markov Chain Monte Carlo Samplers.
///
/// Samplers mutate the model in place; `data` is read only.
pub trait Sampler<M, D: ?Sized> {
    /// Step the Sampler.
    ///
    /// # Errors
    /// If the model and data are inconsistent.
    fn step<R: Rng>(&mut self, model: &mut M, data: &D, rng: &mut R) -> Result<()>;

    /// Warm-up the sampler
    ///
    /// # Errors
    /// On the first failing step.
    fn multi_step<R: Rng>(&mut self, model: &mut M, data: &D, steps: usize, rng: &mut R) -> Result<()> {
        (0..steps).try_for_each(|_| self.step(model, data, rng))
    }
}

/// A log unnormalized contribution to the joint density of a state `S`.
///
/// Factors compose by summation. Returning `-inf` marks the state as
/// infeasible.
pub trait PotentialFactor<S> {
    /// Short description used in logs.
    fn name(&self) -> &str;

    fn ln_potential(&self, state: &S) -> f64;
}

/// A named real-valued quantity inside a state `S`.
pub trait ScalarVariable<S> {
    fn name(&self) -> &str;

    fn get(&self, state: &S) -> f64;

    /// Write `value` into `state`.
    ///
    /// # Errors
    /// If the owner of the variable refuses the value. `state` must then be
    /// left unchanged.
    fn set(&self, state: &mut S, value: f64) -> Result<()>;
}
