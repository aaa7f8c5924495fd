use rand::Rng;
use rand::seq::SliceRandom;

use crate::data::{ClusterId, ClusteringState};
use crate::error::Result;
use crate::mcmc::Sampler;
use crate::models::pitman_yor::PitmanYorPrior;
use crate::models::{CollapsedModel, SufficientStatistic};
use crate::state::ChainState;
use crate::utils::ln_categorical_draw;

/// Collapsed Gibbs sampling on the space of partitions.
///
/// One step reseats every customer once, in a fresh random order.
#[derive(Default, Clone, Copy, Debug)]
pub struct PartitionGibbs {}

impl PartitionGibbs {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Unnormalized log weights of seating `x` at each candidate table.
    ///
    /// Existing tables come first in ascending id order, followed by `None`
    /// for a new table. The customer being reseated must already be detached
    /// from `clustering`.
    ///
    /// # Errors
    /// If `x` or any table statistic is incompatible with `hp`.
    pub fn candidate_ln_weights<M: CollapsedModel>(
        model: &M,
        x: &M::Datum,
        clustering: &ClusteringState<M::Stat>,
        hp: &M::Hyper,
        prior: &PitmanYorPrior,
    ) -> Result<(Vec<Option<ClusterId>>, Vec<f64>)> {
        let single = model.stat_of(x);
        let ln_m_single = model.ln_marginal(hp, &single)?;
        let n_tables = clustering.n_tables();
        if n_tables == 0 {
            // Only a new table is possible; its weight need not be finite.
            return Ok((vec![None], vec![0.0]));
        }

        let mut candidates = Vec::with_capacity(n_tables + 1);
        let mut ln_weights = Vec::with_capacity(n_tables + 1);

        // TODO: Unchanged log marginals could be cached between customers.
        for (id, table) in clustering.tables() {
            let ln_m_old = model.ln_marginal(hp, table.stat())?;
            let mut joint = table.stat().clone();
            joint.merge(&single);
            let ln_m_joint = model.ln_marginal(hp, &joint)?;

            candidates.push(Some(id));
            ln_weights.push(
                prior.ln_unnormalized_predictive(table.len(), n_tables) + ln_m_joint - ln_m_old,
            );
        }

        candidates.push(None);
        ln_weights.push(prior.ln_unnormalized_predictive(0, n_tables) + ln_m_single);

        Ok((candidates, ln_weights))
    }

    /// Detach `customer`, then seat it again at a table drawn from its full
    /// conditional. Exactly one uniform is drawn from `rng`.
    ///
    /// # Errors
    /// If the customer's observation is incompatible with the hyper
    /// parameter, or the customer is not seated. The state is unchanged in
    /// both cases.
    pub fn reseat<M: CollapsedModel, R: Rng>(
        state: &mut ChainState<M>,
        customer: usize,
        data: &[M::Datum],
        rng: &mut R,
    ) -> Result<ClusterId> {
        let x = &data[customer];
        // Checked before detaching so a bad observation cannot unseat anyone.
        state.model.ln_marginal(&state.hyper, &state.model.stat_of(x))?;
        state.clustering.unassign(customer, x)?;

        let (candidates, ln_weights) = Self::candidate_ln_weights(
            &state.model,
            x,
            &state.clustering,
            &state.hyper,
            &state.prior,
        )?;

        let id = match candidates[ln_categorical_draw(&ln_weights, rng)] {
            Some(id) => {
                state.clustering.assign(customer, id, x);
                id
            }
            None => state
                .clustering
                .assign_new(customer, state.model.stat_of(x)),
        };
        Ok(id)
    }
}

impl<M: CollapsedModel> Sampler<ChainState<M>, [M::Datum]> for PartitionGibbs {
    fn step<R: Rng>(
        &mut self,
        model: &mut ChainState<M>,
        data: &[M::Datum],
        rng: &mut R,
    ) -> Result<()> {
        let mut indices: Vec<usize> = (0..model.clustering.n_customers()).collect();
        indices.shuffle(rng);

        for index in indices {
            Self::reseat(model, index, data, rng)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DVector, dvector};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::models::niw::{CollapsedNiw, NiwHyperParameter};
    use crate::utils::normalized_probabilities;

    fn data() -> Vec<DVector<f64>> {
        vec![
            dvector![0.0, 0.0],
            dvector![0.2, 0.1],
            dvector![10.0, 10.0],
            dvector![10.1, 9.8],
        ]
    }

    fn state(data: &[DVector<f64>]) -> ChainState<CollapsedNiw> {
        let hyper = NiwHyperParameter::new(
            DVector::zeros(2),
            0.01,
            nalgebra::DMatrix::identity(2, 2),
            3.0,
        )
        .unwrap();
        ChainState::fully_disconnected(CollapsedNiw, data, PitmanYorPrior::crp(1.0).unwrap(), hyper)
    }

    #[test]
    fn candidate_weights_match_closed_form() {
        let data = data();
        let mut state = state(&data);
        state.clustering.unassign(0, &data[0]).unwrap();

        let (candidates, ln_weights) = PartitionGibbs::candidate_ln_weights(
            &state.model,
            &data[0],
            &state.clustering,
            &state.hyper,
            &state.prior,
        )
        .unwrap();

        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates.last(), Some(&None));
        let ids: Vec<_> = candidates.iter().flatten().copied().collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let single = CollapsedNiw.stat_of(&data[0]);
        let ln_m_single = CollapsedNiw.ln_marginal(&state.hyper, &single).unwrap();
        // Strength 1 with three occupied tables, each of size one.
        assert::close(ln_weights[3], ln_m_single, 1e-12);
        let ln_pp = CollapsedNiw
            .ln_pp(&state.hyper, &data[0], &CollapsedNiw.stat_of(&data[1]))
            .unwrap();
        assert::close(ln_weights[0], ln_pp, 1e-10);

        let ps = normalized_probabilities(&ln_weights);
        assert::close(ps.iter().sum::<f64>(), 1.0, 1e-12);
        // The nearby point dominates the far ones.
        assert!(ps[0] > ps[1] && ps[0] > ps[2]);
    }

    #[test]
    fn discounted_weights_match_closed_form() {
        let data: Vec<DVector<f64>> = [
            [0.0, 0.0],
            [0.3, -0.2],
            [5.0, 5.5],
            [4.8, 5.1],
            [-3.0, 4.0],
            [9.0, -1.0],
            [0.1, 0.4],
            [5.2, 4.9],
        ]
        .iter()
        .map(|x| dvector![x[0], x[1]])
        .collect();
        let prior = PitmanYorPrior::new(0.5, 0.3).unwrap();
        let (strength, discount) = (prior.strength(), prior.discount());

        let mut rng = SmallRng::seed_from_u64(0xD15C);
        let mut gibbs = PartitionGibbs::new();
        let mut saw_several_tables = false;

        for (kappa, scale, nu) in [(0.01, 1.0, 3.0), (1.0, 0.5, 5.0), (10.0, 4.0, 2.5)] {
            let hyper = NiwHyperParameter::new(
                DVector::zeros(2),
                kappa,
                nalgebra::DMatrix::identity(2, 2) * scale,
                nu,
            )
            .unwrap();
            let mut state = ChainState::fully_disconnected(CollapsedNiw, &data, prior, hyper);

            for _ in 0..30 {
                gibbs.step(&mut state, data.as_slice(), &mut rng).unwrap();

                let customer = rng.random_range(0..data.len());
                let x = &data[customer];
                let mut clustering = state.clustering().clone();
                clustering.unassign(customer, x).unwrap();

                let (candidates, ln_weights) = PartitionGibbs::candidate_ln_weights(
                    &CollapsedNiw,
                    x,
                    &clustering,
                    state.hyper(),
                    state.prior(),
                )
                .unwrap();
                assert::close(
                    normalized_probabilities(&ln_weights).iter().sum::<f64>(),
                    1.0,
                    1e-12,
                );

                #[allow(clippy::cast_precision_loss)]
                let n_tables = clustering.n_tables() as f64;
                saw_several_tables |= n_tables > 1.0;

                for (candidate, ln_w) in candidates.iter().zip(&ln_weights) {
                    let expected = match candidate {
                        Some(id) => {
                            let table = clustering.table(*id).unwrap();
                            #[allow(clippy::cast_precision_loss)]
                            let n_k = table.len() as f64;
                            (n_k - discount).ln()
                                + CollapsedNiw.ln_pp(state.hyper(), x, table.stat()).unwrap()
                        }
                        None => {
                            discount.mul_add(n_tables, strength).ln()
                                + CollapsedNiw
                                    .ln_marginal(state.hyper(), &CollapsedNiw.stat_of(x))
                                    .unwrap()
                        }
                    };
                    assert::close(*ln_w, expected, 1e-9);
                }
            }
        }
        assert!(saw_several_tables);
    }

    #[test]
    fn lone_customer_has_only_the_new_table() {
        let data = vec![dvector![1.0, -1.0]];
        let mut state = state(&data);
        state.prior = PitmanYorPrior::new(-0.2, 0.5).unwrap();
        state.clustering.unassign(0, &data[0]).unwrap();

        let (candidates, ln_weights) = PartitionGibbs::candidate_ln_weights(
            &state.model,
            &data[0],
            &state.clustering,
            &state.hyper,
            &state.prior,
        )
        .unwrap();
        assert_eq!(candidates, vec![None]);
        assert_eq!(ln_weights, vec![0.0]);

        state.clustering.assign_new(0, CollapsedNiw.stat_of(&data[0]));
        let mut rng = SmallRng::seed_from_u64(5);
        let mut gibbs = PartitionGibbs::new();
        for _ in 0..5 {
            gibbs.step(&mut state, data.as_slice(), &mut rng).unwrap();
            assert_eq!(state.clustering().n_tables(), 1);
        }
    }

    #[test]
    fn single_customer_always_sits_alone() {
        let data = vec![dvector![1.0, -1.0]];
        let mut state = state(&data);
        let mut rng = SmallRng::seed_from_u64(0xABCD);
        let mut gibbs = PartitionGibbs::new();

        for _ in 0..10 {
            gibbs.step(&mut state, data.as_slice(), &mut rng).unwrap();
            assert_eq!(state.clustering().n_tables(), 1);
            assert!(state.clustering().is_exact_partition());
        }
    }

    #[test]
    fn sweeps_preserve_exact_partition() {
        let data = data();
        let mut state = state(&data);
        let mut rng = SmallRng::seed_from_u64(0x1337);
        let mut gibbs = PartitionGibbs::new();

        for _ in 0..200 {
            gibbs.step(&mut state, data.as_slice(), &mut rng).unwrap();
            assert!(state.clustering().is_exact_partition());
            let n: usize = state.clustering().counts().iter().sum();
            assert_eq!(n, 4);
        }
    }

    #[test]
    fn mismatched_customer_is_left_seated() {
        let mut data = data();
        let mut state = state(&data);
        data[2] = dvector![1.0, 2.0, 3.0];
        let mut rng = SmallRng::seed_from_u64(0x1337);

        assert!(PartitionGibbs::reseat(&mut state, 2, &data, &mut rng).is_err());
        assert!(state.clustering().assignment(2).is_some());
        assert_eq!(state.clustering().n_tables(), 4);
    }
}
