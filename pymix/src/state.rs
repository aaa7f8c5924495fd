//! The full state of one chain and the factors and variables defined on it.

use tracing::warn;

use crate::data::ClusteringState;
use crate::error::Result;
use crate::mcmc::{PotentialFactor, ScalarVariable};
use crate::models::niw::CollapsedNiw;
use crate::models::pitman_yor::PitmanYorPrior;
use crate::models::{CollapsedModel, Model};

/// Clustering, clustering prior, and observation hyper parameter of a chain.
#[derive(Clone, Debug)]
pub struct ChainState<M: CollapsedModel> {
    pub(crate) model: M,
    pub(crate) clustering: ClusteringState<M::Stat>,
    pub(crate) prior: PitmanYorPrior,
    pub(crate) hyper: M::Hyper,
}

impl<M: CollapsedModel> ChainState<M> {
    /// Every customer in `data` seated alone.
    pub fn fully_disconnected(
        model: M,
        data: &[M::Datum],
        prior: PitmanYorPrior,
        hyper: M::Hyper,
    ) -> Self {
        let clustering = ClusteringState::fully_disconnected(data, |x| model.stat_of(x));
        Self::from_clustering(model, clustering, prior, hyper)
    }

    pub const fn from_clustering(
        model: M,
        clustering: ClusteringState<M::Stat>,
        prior: PitmanYorPrior,
        hyper: M::Hyper,
    ) -> Self {
        Self {
            model,
            clustering,
            prior,
            hyper,
        }
    }

    #[must_use]
    pub const fn model(&self) -> &M {
        &self.model
    }

    #[must_use]
    pub const fn clustering(&self) -> &ClusteringState<M::Stat> {
        &self.clustering
    }

    #[must_use]
    pub const fn prior(&self) -> &PitmanYorPrior {
        &self.prior
    }

    #[must_use]
    pub const fn hyper(&self) -> &M::Hyper {
        &self.hyper
    }

    /// Sum of the log marginal likelihoods of every occupied table.
    ///
    /// # Errors
    /// If a table statistic is incompatible with the hyper parameter.
    pub fn ln_likelihood(&self) -> Result<f64> {
        self.clustering
            .tables()
            .map(|(_, table)| self.model.ln_marginal(&self.hyper, table.stat()))
            .sum()
    }

    /// Log probability of the current seating under the Pitman-Yor prior.
    #[must_use]
    pub fn ln_clustering_prior(&self) -> f64 {
        self.prior.ln_eppf(&self.clustering.counts())
    }
}

impl<M: CollapsedModel> Model<[M::Datum]> for ChainState<M> {
    /// Log joint of seating and data; the data enters through the table
    /// statistics.
    fn ln_score(&self, _data: &[M::Datum]) -> f64 {
        CollapsedLikelihood.ln_potential(self) + ClusteringPrior.ln_potential(self)
    }
}

/// Log marginal likelihood of the data given the seating.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollapsedLikelihood;

impl<M: CollapsedModel> PotentialFactor<ChainState<M>> for CollapsedLikelihood {
    fn name(&self) -> &str {
        "likelihood"
    }

    fn ln_potential(&self, state: &ChainState<M>) -> f64 {
        match state.ln_likelihood() {
            Ok(ln_l) if ln_l.is_nan() => {
                warn!("likelihood evaluated to NaN");
                f64::NEG_INFINITY
            }
            Ok(ln_l) => ln_l,
            Err(err) => {
                warn!(%err, "likelihood could not be evaluated");
                f64::NEG_INFINITY
            }
        }
    }
}

/// Pitman-Yor probability of the seating.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusteringPrior;

impl<M: CollapsedModel> PotentialFactor<ChainState<M>> for ClusteringPrior {
    fn name(&self) -> &str {
        "clustering prior"
    }

    fn ln_potential(&self, state: &ChainState<M>) -> f64 {
        state.ln_clustering_prior()
    }
}

/// The component of the chain state that validates writes to a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    ClusteringPrior,
    HyperParameter,
}

/// Handle to one resampleable scalar of a [`ChainState`] under the collapsed
/// NIW model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainVariable {
    Strength,
    Discount,
    Kappa,
    Nu,
}

impl ChainVariable {
    pub const ALL: [Self; 4] = [Self::Strength, Self::Discount, Self::Kappa, Self::Nu];

    #[must_use]
    pub const fn owner(self) -> Owner {
        match self {
            Self::Strength | Self::Discount => Owner::ClusteringPrior,
            Self::Kappa | Self::Nu => Owner::HyperParameter,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Strength => "alpha0",
            Self::Discount => "discount",
            Self::Kappa => "kappa",
            Self::Nu => "nu",
        }
    }
}

impl ScalarVariable<ChainState<CollapsedNiw>> for ChainVariable {
    fn name(&self) -> &str {
        self.label()
    }

    fn get(&self, state: &ChainState<CollapsedNiw>) -> f64 {
        match self {
            Self::Strength => state.prior.strength(),
            Self::Discount => state.prior.discount(),
            Self::Kappa => state.hyper.kappa(),
            Self::Nu => state.hyper.nu(),
        }
    }

    fn set(&self, state: &mut ChainState<CollapsedNiw>, value: f64) -> Result<()> {
        match self {
            Self::Strength => state.prior.set_strength(value),
            Self::Discount => state.prior.set_discount(value),
            Self::Kappa => state.hyper.set_kappa(value),
            Self::Nu => state.hyper.set_nu(value),
        }
    }
}
