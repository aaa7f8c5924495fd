use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Two parameter Pitman-Yor prior over partitions.
///
/// The parameters may change during the life of a chain, but only through the
/// setters, which refuse any value that leaves `0 <= discount < 1` and
/// `strength > -discount`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPitmanYor")]
pub struct PitmanYorPrior {
    strength: f64,
    discount: f64,
}

#[derive(Deserialize)]
struct RawPitmanYor {
    strength: f64,
    discount: f64,
}

impl TryFrom<RawPitmanYor> for PitmanYorPrior {
    type Error = Error;

    fn try_from(raw: RawPitmanYor) -> Result<Self> {
        Self::new(raw.strength, raw.discount)
    }
}

impl PitmanYorPrior {
    /// Create a new prior.
    ///
    /// # Errors
    /// If the parameters are out of bounds.
    pub fn new(strength: f64, discount: f64) -> Result<Self> {
        check_bounds(strength, discount)?;
        Ok(Self { strength, discount })
    }

    /// The Chinese restaurant process with concentration `strength`.
    ///
    /// # Errors
    /// If `strength` is not positive.
    pub fn crp(strength: f64) -> Result<Self> {
        Self::new(strength, 0.0)
    }

    /// The strength (concentration) parameter, sometimes written `alpha0` or `theta`.
    #[must_use]
    pub const fn strength(&self) -> f64 {
        self.strength
    }

    /// The discount parameter.
    #[must_use]
    pub const fn discount(&self) -> f64 {
        self.discount
    }

    /// Set the strength, leaving `self` untouched if the result is invalid.
    ///
    /// # Errors
    /// If the new parameters are out of bounds.
    pub fn set_strength(&mut self, strength: f64) -> Result<()> {
        check_bounds(strength, self.discount)?;
        self.strength = strength;
        Ok(())
    }

    /// Set the discount, leaving `self` untouched if the result is invalid.
    ///
    /// # Errors
    /// If the new parameters are out of bounds.
    pub fn set_discount(&mut self, discount: f64) -> Result<()> {
        check_bounds(self.strength, discount)?;
        self.discount = discount;
        Ok(())
    }

    /// Log unnormalized weight of seating a customer at a table which
    /// currently has `n_at_table` occupants, when `n_tables` tables exist.
    ///
    /// Use `n_at_table == 0` for opening a new table.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn ln_unnormalized_predictive(&self, n_at_table: usize, n_tables: usize) -> f64 {
        if n_at_table == 0 {
            self.discount.mul_add(n_tables as f64, self.strength).ln()
        } else {
            (n_at_table as f64 - self.discount).ln()
        }
    }

    /// Log exchangeable partition probability of a partition with the given
    /// table sizes.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn ln_eppf(&self, counts: &[usize]) -> f64 {
        if check_bounds(self.strength, self.discount).is_err() {
            return f64::NEG_INFINITY;
        }

        let n: usize = counts.iter().sum();
        if n == 0 {
            return 0.0;
        }

        let k = counts.len();
        let ln_new_tables: f64 = (1..k)
            .map(|i| self.discount.mul_add(i as f64, self.strength).ln())
            .sum();
        let ln_normalizer: f64 = (1..n).map(|i| (self.strength + i as f64).ln()).sum();
        let ln_occupied: f64 = counts
            .iter()
            .flat_map(|&n_k| 1..n_k)
            .map(|j| (j as f64 - self.discount).ln())
            .sum();

        ln_new_tables - ln_normalizer + ln_occupied
    }
}

fn check_bounds(strength: f64, discount: f64) -> Result<()> {
    let valid = strength.is_finite() && (0.0..1.0).contains(&discount) && strength > -discount;
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPitmanYor { strength, discount })
    }
}

#[cfg(test)]
mod tests {
    use rv::misc::LogSumExp;

    use super::*;

    #[test]
    fn existing_table_weight() {
        let prior = PitmanYorPrior::new(1.0, 0.3).expect("valid");
        assert::close(prior.ln_unnormalized_predictive(5, 3), 4.7_f64.ln(), 1e-12);
    }

    #[test]
    fn new_table_weight_grows_with_tables() {
        let prior = PitmanYorPrior::new(0.5, 0.25).expect("valid");
        let weights: Vec<f64> = (0..20)
            .map(|k| prior.ln_unnormalized_predictive(0, k))
            .collect();
        assert!(weights.windows(2).all(|w| w[0] <= w[1]));
        assert::close(weights[4], 1.5_f64.ln(), 1e-12);
    }

    #[test]
    fn crp_new_table_weight_is_constant() {
        let prior = PitmanYorPrior::crp(2.5).expect("valid");
        for k in 0..20 {
            assert::close(prior.ln_unnormalized_predictive(0, k), 2.5_f64.ln(), 1e-14);
        }
    }

    #[test]
    fn bounds_are_enforced() {
        assert!(PitmanYorPrior::new(1.0, 1.0).is_err());
        assert!(PitmanYorPrior::new(1.0, -0.1).is_err());
        assert!(PitmanYorPrior::new(-0.5, 0.4).is_err());
        assert!(PitmanYorPrior::new(-0.3, 0.4).is_ok());
        assert!(PitmanYorPrior::crp(0.0).is_err());

        let mut prior = PitmanYorPrior::new(1.0, 0.5).expect("valid");
        assert!(matches!(
            prior.set_discount(1.2),
            Err(Error::InvalidPitmanYor { .. })
        ));
        assert!(prior.set_strength(-0.7).is_err());
        assert_eq!(prior, PitmanYorPrior::new(1.0, 0.5).expect("valid"));

        prior.set_strength(-0.2).expect("still above -discount");
        assert::close(prior.strength(), -0.2, 1e-15);
    }

    #[test]
    fn eppf_sums_to_one_over_partitions_of_four() {
        // Table sizes of every set partition of four items, one entry per partition.
        let partitions: Vec<Vec<usize>> = std::iter::once(vec![4])
            .chain(std::iter::repeat_n(vec![3, 1], 4))
            .chain(std::iter::repeat_n(vec![2, 2], 3))
            .chain(std::iter::repeat_n(vec![2, 1, 1], 6))
            .chain(std::iter::once(vec![1, 1, 1, 1]))
            .collect();
        assert_eq!(partitions.len(), 15);

        for (strength, discount) in [(1.0, 0.0), (0.3, 0.6), (-0.2, 0.5), (7.0, 0.1)] {
            let prior = PitmanYorPrior::new(strength, discount).expect("valid");
            let total = partitions
                .iter()
                .map(|counts| prior.ln_eppf(counts))
                .logsumexp();
            assert::close(total, 0.0, 1e-12);
        }
    }

    #[test]
    fn eppf_matches_sequential_seating() {
        let prior = PitmanYorPrior::new(0.8, 0.2).expect("valid");
        // Seat customers one at a time into tables of final sizes [2, 1]:
        // first opens, second joins, third opens.
        let expected = 0.0 + (prior.ln_unnormalized_predictive(1, 1) - (1.0 + 0.8_f64).ln())
            + (prior.ln_unnormalized_predictive(0, 1) - (2.0 + 0.8_f64).ln());
        assert::close(prior.ln_eppf(&[2, 1]), expected, 1e-12);
        assert::close(prior.ln_eppf(&[]), 0.0, 1e-15);
    }

    #[test]
    fn deserialization_validates() {
        let ok: PitmanYorPrior =
            serde_json::from_str(r#"{"strength": 1.5, "discount": 0.2}"#).expect("valid");
        assert::close(ok.strength(), 1.5, 1e-15);
        assert!(serde_json::from_str::<PitmanYorPrior>(r#"{"strength": 1.0, "discount": 1.0}"#)
            .is_err());
    }
}
