//! A complete chain: data, state, and the samplers that move it.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use nalgebra::DVector;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SamplerConfig;
use crate::error::{Error, Result};
use crate::mcmc::{PotentialFactor, Sampler};
use crate::mcmc::factors::{ExponentialPrior, UniformPrior};
use crate::mcmc::samplers::continuous::MetropolisHastings;
use crate::mcmc::samplers::partition::PartitionGibbs;
use crate::models::niw::{CollapsedNiw, NiwHyperParameter};
use crate::models::pitman_yor::PitmanYorPrior;
use crate::predictive::Predictive;
use crate::state::{ChainState, ChainVariable, ClusteringPrior, CollapsedLikelihood, Owner};

/// Named scalar summaries of the chain after a given sweep.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceRecord {
    pub sweep: usize,
    pub values: BTreeMap<String, f64>,
}

impl TraceRecord {
    /// Write the record as one line of JSON.
    ///
    /// # Errors
    /// If writing fails.
    pub fn write_json_line<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer(&mut *writer, self).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Owns the observations and a chain over their clustering and hyper
/// parameters.
///
/// Every random draw comes from the generator passed to each call, so two
/// states built alike and driven by equally seeded generators stay identical.
#[derive(Debug)]
pub struct InferenceState {
    data: Vec<DVector<f64>>,
    state: ChainState<CollapsedNiw>,
    gibbs: PartitionGibbs,
    mh: MetropolisHastings<ChainState<CollapsedNiw>>,
    n_sweeps: usize,
}

impl InferenceState {
    /// Start with every customer at its own table. No hyper parameter is
    /// resampled until moves are registered.
    ///
    /// # Errors
    /// If `data` is empty or an observation does not match the dimension of
    /// `hyper`.
    pub fn new(
        data: Vec<DVector<f64>>,
        prior: PitmanYorPrior,
        hyper: NiwHyperParameter,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyData);
        }
        if let Some(x) = data.iter().find(|x| x.len() != hyper.dim()) {
            return Err(Error::DimensionMismatch {
                expected: hyper.dim(),
                found: x.len(),
            });
        }

        let state = ChainState::fully_disconnected(CollapsedNiw, &data, prior, hyper);
        info!(
            n_customers = data.len(),
            dim = state.hyper().dim(),
            "initialized chain"
        );
        Ok(Self {
            data,
            state,
            gibbs: PartitionGibbs::new(),
            mh: MetropolisHastings::new(),
            n_sweeps: 0,
        })
    }

    /// Build the chain described by `config`, registering the hyper
    /// parameter moves it enables.
    ///
    /// # Errors
    /// If the data are empty or inconsistent, or `config` is invalid.
    pub fn from_config(data: Vec<DVector<f64>>, config: &SamplerConfig) -> Result<Self> {
        config.validate()?;
        let dim = data.first().ok_or(Error::EmptyData)?.len();
        let mut inference = Self::new(data, config.prior()?, config.hyper_parameter(dim)?)?;
        inference.mh = MetropolisHastings::new().with_step_scale(config.step_scale);

        let resample = &config.resample;
        if resample.strength {
            inference.resample(ChainVariable::Strength, resample.strength_rate);
        }
        if resample.discount {
            inference.resample(ChainVariable::Discount, 1.0);
        }
        if resample.kappa {
            inference.resample(ChainVariable::Kappa, resample.kappa_rate);
        }
        if resample.nu {
            inference.resample(ChainVariable::Nu, resample.nu_rate);
        }
        Ok(inference)
    }

    /// Register a move for `variable` under its default prior. `rate` is the
    /// rate of the exponential prior and is ignored for the discount, whose
    /// prior is uniform on the unit interval.
    pub fn resample(&mut self, variable: ChainVariable, rate: f64) {
        // The move must see every state factor that reads the variable.
        let factors: Vec<Arc<dyn PotentialFactor<ChainState<CollapsedNiw>>>> =
            match variable.owner() {
                Owner::ClusteringPrior => vec![Arc::new(ClusteringPrior)],
                Owner::HyperParameter => vec![Arc::new(CollapsedLikelihood)],
            };

        match variable {
            ChainVariable::Strength => self.mh.add_with_prior(
                variable,
                ExponentialPrior::with_rate(rate).truncate_at(-1.0),
                factors,
            ),
            ChainVariable::Discount => {
                self.mh
                    .add_with_prior(variable, UniformPrior::unit_interval(), factors);
            }
            ChainVariable::Kappa => {
                self.mh
                    .add_with_prior(variable, ExponentialPrior::with_rate(rate), factors);
            }
            ChainVariable::Nu => {
                #[allow(clippy::cast_precision_loss)]
                let min_nu = self.state.hyper().dim() as f64 - 1.0;
                self.mh.add_with_prior(
                    variable,
                    ExponentialPrior::with_rate(rate).truncate_at(min_nu),
                    factors,
                );
            }
        }
    }

    /// Resample all four hyper parameters under unit-rate priors.
    pub fn resample_defaults(&mut self) {
        for variable in ChainVariable::ALL {
            self.resample(variable, 1.0);
        }
    }

    /// Reseat every customer in a random order, then run one round of
    /// hyper parameter moves.
    ///
    /// # Errors
    /// Only on an internal inconsistency; the data are validated up front.
    pub fn do_one_sweep<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        self.gibbs.step(&mut self.state, self.data.as_slice(), rng)?;
        let n_accepted = self.mh.sample_round(&mut self.state, rng)?;
        self.n_sweeps += 1;

        debug!(
            sweep = self.n_sweeps,
            n_tables = self.state.clustering().n_tables(),
            n_accepted,
            n_moves = self.mh.n_variables(),
            "sweep"
        );
        Ok(())
    }

    /// Run `n` sweeps, e.g. as burn-in.
    ///
    /// # Errors
    /// See [`InferenceState::do_one_sweep`].
    pub fn multi_sweep<R: Rng>(&mut self, n: usize, rng: &mut R) -> Result<()> {
        (0..n).try_for_each(|_| self.do_one_sweep(rng))
    }

    /// Collect `n_records` diagnostics, running `thinning` sweeps before each.
    ///
    /// # Errors
    /// See [`InferenceState::do_one_sweep`].
    pub fn trace<R: Rng>(
        &mut self,
        n_records: usize,
        thinning: usize,
        rng: &mut R,
    ) -> Result<Vec<TraceRecord>> {
        let thinning = thinning.max(1);
        (0..n_records)
            .map(|_| {
                self.multi_sweep(thinning, rng)?;
                Ok(TraceRecord {
                    sweep: self.n_sweeps,
                    values: self.diagnostics(),
                })
            })
            .collect()
    }

    /// Current hyper parameters and number of occupied tables.
    #[must_use]
    pub fn diagnostics(&self) -> BTreeMap<String, f64> {
        use crate::mcmc::ScalarVariable;

        let mut values: BTreeMap<String, f64> = ChainVariable::ALL
            .into_iter()
            .map(|v| (v.label().to_owned(), v.get(&self.state)))
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let n_clusters = self.state.clustering().n_tables() as f64;
        values.insert("n_clusters".to_owned(), n_clusters);
        values
    }

    /// Number of variables resampled per sweep: every customer's seating
    /// plus every registered hyper parameter.
    #[must_use]
    pub fn n_variables(&self) -> usize {
        self.data.len() + self.mh.n_variables()
    }

    /// Predictive density of a new observation given the current state.
    #[must_use]
    pub fn predictive(&self) -> Predictive<CollapsedNiw> {
        Predictive::from_state(&self.state)
    }

    #[must_use]
    pub const fn state(&self) -> &ChainState<CollapsedNiw> {
        &self.state
    }

    #[must_use]
    pub fn data(&self) -> &[DVector<f64>] {
        &self.data
    }

    #[must_use]
    pub const fn n_sweeps(&self) -> usize {
        self.n_sweeps
    }

    #[must_use]
    pub const fn mh(&self) -> &MetropolisHastings<ChainState<CollapsedNiw>> {
        &self.mh
    }
}
