//! Normal-Inverse-Wishart conjugate model for multivariate Gaussian clusters.
//!
//! Follows the parameterization of Murphy, "Conjugate Bayesian analysis of
//! the Gaussian distribution" (2007), section 9: a cluster mean and
//! covariance drawn from `NIW(mu, kappa, scatter, nu)`.

use std::f64::consts::PI;

use nalgebra::{Cholesky, DMatrix, DVector};
use special::Gamma;

use super::{CollapsedModel, SufficientStatistic};
use crate::error::{Error, Result};

/// Count, sum, and sum of outer products of a set of vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct NiwStat {
    n: usize,
    sum_x: DVector<f64>,
    sum_xxt: DMatrix<f64>,
}

impl NiwStat {
    /// Statistic of zero observations in `dim` dimensions.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            sum_x: DVector::zeros(dim),
            sum_xxt: DMatrix::zeros(dim, dim),
        }
    }

    /// Statistic of the single observation `x`.
    #[must_use]
    pub fn from_point(x: &DVector<f64>) -> Self {
        Self {
            n: 1,
            sum_x: x.clone(),
            sum_xxt: x * x.transpose(),
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.sum_x.len()
    }

    #[must_use]
    pub const fn sum_x(&self) -> &DVector<f64> {
        &self.sum_x
    }

    #[must_use]
    pub const fn sum_xxt(&self) -> &DMatrix<f64> {
        &self.sum_xxt
    }

    fn clear(&mut self) {
        self.sum_x.fill(0.0);
        self.sum_xxt.fill(0.0);
    }
}

impl SufficientStatistic<DVector<f64>> for NiwStat {
    fn n(&self) -> usize {
        self.n
    }

    fn observe(&mut self, x: &DVector<f64>) {
        self.n += 1;
        self.sum_x += x;
        self.sum_xxt += x * x.transpose();
    }

    fn forget(&mut self, x: &DVector<f64>) {
        debug_assert!(self.n > 0, "forgetting from an empty statistic");
        self.n -= 1;
        if self.n == 0 {
            // Drop accumulated rounding error instead of carrying it forward.
            self.clear();
        } else {
            self.sum_x -= x;
            self.sum_xxt -= x * x.transpose();
        }
    }

    fn merge(&mut self, other: &Self) {
        self.n += other.n;
        self.sum_x += &other.sum_x;
        self.sum_xxt += &other.sum_xxt;
    }

    fn remove(&mut self, other: &Self) {
        debug_assert!(self.n >= other.n, "removing more than was observed");
        self.n -= other.n;
        if self.n == 0 {
            self.clear();
        } else {
            self.sum_x -= &other.sum_x;
            self.sum_xxt -= &other.sum_xxt;
        }
    }
}

/// Parameters `(mu, kappa, scatter, nu)` of a Normal-Inverse-Wishart prior.
#[derive(Clone, Debug, PartialEq)]
pub struct NiwHyperParameter {
    mu: DVector<f64>,
    kappa: f64,
    scatter: DMatrix<f64>,
    nu: f64,
    ln_det_scatter: f64,
}

impl NiwHyperParameter {
    /// Create a new hyper parameter.
    ///
    /// # Errors
    /// If `kappa <= 0`, `nu <= dim - 1`, the dimensions of `mu` and `scatter`
    /// disagree, or `scatter` is not symmetric positive definite.
    pub fn new(mu: DVector<f64>, kappa: f64, scatter: DMatrix<f64>, nu: f64) -> Result<Self> {
        let dim = mu.len();
        if scatter.nrows() != dim || scatter.ncols() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: scatter.nrows().max(scatter.ncols()),
            });
        }
        check_kappa(kappa)?;
        check_nu(nu, dim)?;

        let asymmetry = (&scatter - scatter.transpose()).amax();
        if asymmetry > 1e-10 * scatter.amax().max(1.0) {
            return Err(Error::NotPositiveDefinite("scatter"));
        }
        let ln_det_scatter = ln_det(&scatter, "scatter")?;

        Ok(Self {
            mu,
            kappa,
            scatter,
            nu,
            ln_det_scatter,
        })
    }

    /// Zero mean, unit `kappa`, identity scatter, and `nu = dim + 1`.
    ///
    /// # Panics
    /// If `dim` is zero.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn with_dimensionality(dim: usize) -> Self {
        assert!(dim > 0, "dimension must be positive");
        Self {
            mu: DVector::zeros(dim),
            kappa: 1.0,
            scatter: DMatrix::identity(dim, dim),
            nu: dim as f64 + 1.0,
            ln_det_scatter: 0.0,
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.mu.len()
    }

    #[must_use]
    pub const fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    #[must_use]
    pub const fn kappa(&self) -> f64 {
        self.kappa
    }

    #[must_use]
    pub const fn scatter(&self) -> &DMatrix<f64> {
        &self.scatter
    }

    #[must_use]
    pub const fn nu(&self) -> f64 {
        self.nu
    }

    /// Set `kappa`, leaving `self` untouched if the value is invalid.
    ///
    /// # Errors
    /// If `kappa` is not finite and strictly positive.
    pub fn set_kappa(&mut self, kappa: f64) -> Result<()> {
        check_kappa(kappa)?;
        self.kappa = kappa;
        Ok(())
    }

    /// Set `nu`, leaving `self` untouched if the value is invalid.
    ///
    /// # Errors
    /// If `nu` is not finite and greater than `dim - 1`.
    pub fn set_nu(&mut self, nu: f64) -> Result<()> {
        check_nu(nu, self.dim())?;
        self.nu = nu;
        Ok(())
    }
}

fn check_kappa(kappa: f64) -> Result<()> {
    if kappa.is_finite() && kappa > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidHyperParameter {
            name: "kappa",
            value: kappa,
            reason: "must be finite and positive",
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn check_nu(nu: f64, dim: usize) -> Result<()> {
    if nu.is_finite() && nu > dim as f64 - 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidHyperParameter {
            name: "nu",
            value: nu,
            reason: "must be finite and greater than dimension - 1",
        })
    }
}

fn ln_det(m: &DMatrix<f64>, name: &'static str) -> Result<f64> {
    let chol = Cholesky::new(m.clone()).ok_or(Error::NotPositiveDefinite(name))?;
    Ok(2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

/// Log of the multivariate gamma function `Gamma_p(a)`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn ln_mv_gamma(p: usize, a: f64) -> f64 {
    let p_f = p as f64;
    (0..p).fold(p_f * (p_f - 1.0) / 4.0 * PI.ln(), |acc, j| {
        acc + Gamma::ln_gamma(a - (j as f64) / 2.0).0
    })
}

/// The collapsed Normal-Inverse-Wishart model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollapsedNiw;

impl CollapsedNiw {
    fn check_compatible(hp: &NiwHyperParameter, stat: &NiwStat) -> Result<()> {
        if hp.dim() == stat.dim() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: hp.dim(),
                found: stat.dim(),
            })
        }
    }

    /// Posterior `(kappa_n, nu_n, mu_n, scatter_n)` without re-validation.
    #[allow(clippy::cast_precision_loss)]
    fn posterior_parts(
        hp: &NiwHyperParameter,
        stat: &NiwStat,
    ) -> (f64, f64, DVector<f64>, DMatrix<f64>) {
        let n = stat.n as f64;
        let kappa_n = hp.kappa + n;
        let nu_n = hp.nu + n;
        let mu_n = (&hp.mu * hp.kappa + &stat.sum_x) / kappa_n;
        let scatter_n = &hp.scatter + &stat.sum_xxt + (&hp.mu * hp.mu.transpose()) * hp.kappa
            - (&mu_n * mu_n.transpose()) * kappa_n;
        // Symmetrize; the subtraction above leaves rounding asymmetry.
        let scatter_n = (&scatter_n + scatter_n.transpose()) * 0.5;
        (kappa_n, nu_n, mu_n, scatter_n)
    }
}

impl CollapsedModel for CollapsedNiw {
    type Datum = DVector<f64>;
    type Stat = NiwStat;
    type Hyper = NiwHyperParameter;

    fn empty_stat(&self, hp: &NiwHyperParameter) -> NiwStat {
        NiwStat::new(hp.dim())
    }

    fn stat_of(&self, x: &DVector<f64>) -> NiwStat {
        NiwStat::from_point(x)
    }

    #[allow(clippy::cast_precision_loss)]
    fn ln_marginal(&self, hp: &NiwHyperParameter, stat: &NiwStat) -> Result<f64> {
        Self::check_compatible(hp, stat)?;
        if stat.n == 0 {
            return Ok(0.0);
        }

        let p = hp.dim();
        let n = stat.n as f64;
        let (kappa_n, nu_n, _, scatter_n) = Self::posterior_parts(hp, stat);
        let ln_det_n = ln_det(&scatter_n, "posterior scatter")?;

        Ok(-(n * p as f64 / 2.0) * PI.ln()
            + ln_mv_gamma(p, nu_n / 2.0)
            - ln_mv_gamma(p, hp.nu / 2.0)
            + (hp.nu / 2.0) * hp.ln_det_scatter
            - (nu_n / 2.0) * ln_det_n
            + (p as f64 / 2.0) * (hp.kappa.ln() - kappa_n.ln()))
    }

    fn update(&self, hp: &NiwHyperParameter, stat: &NiwStat) -> Result<NiwHyperParameter> {
        Self::check_compatible(hp, stat)?;
        if stat.n == 0 {
            return Ok(hp.clone());
        }

        let (kappa, nu, mu, scatter) = Self::posterior_parts(hp, stat);
        let ln_det_scatter = ln_det(&scatter, "posterior scatter")?;
        Ok(NiwHyperParameter {
            mu,
            kappa,
            scatter,
            nu,
            ln_det_scatter,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{dmatrix, dvector};
    use special::Gamma;

    use super::*;
    use crate::utils::trapz;

    fn points() -> Vec<DVector<f64>> {
        vec![
            dvector![0.3, -1.2],
            dvector![1.5, 0.4],
            dvector![-2.0, 2.2],
            dvector![0.0, 0.7],
        ]
    }

    fn prior() -> NiwHyperParameter {
        NiwHyperParameter::new(
            dvector![0.5, -0.5],
            0.7,
            dmatrix![2.0, 0.3; 0.3, 1.0],
            4.5,
        )
        .expect("valid hyper parameter")
    }

    #[test]
    fn stat_round_trip() {
        let xs = points();
        let mut a = NiwStat::new(2);
        xs[..3].iter().for_each(|x| a.observe(x));
        let original = a.clone();

        let b = NiwStat::from_point(&xs[3]);
        a.merge(&b);
        assert_eq!(a.n(), 4);
        a.remove(&b);
        assert_eq!(a.n(), 3);
        assert!((a.sum_x() - original.sum_x()).amax() < 1e-12);
        assert!((a.sum_xxt() - original.sum_xxt()).amax() < 1e-12);

        a.forget(&xs[0]);
        a.observe(&xs[0]);
        assert!((a.sum_xxt() - original.sum_xxt()).amax() < 1e-12);
    }

    #[test]
    fn forgetting_everything_clears_sums() {
        let x = dvector![0.1, 0.2];
        let mut stat = NiwStat::new(2);
        stat.observe(&x);
        stat.forget(&x);
        assert_eq!(stat, NiwStat::new(2));
    }

    #[test]
    fn empty_marginal_is_zero() {
        let ln_m = CollapsedNiw
            .ln_marginal(&prior(), &NiwStat::new(2))
            .expect("compatible");
        assert::close(ln_m, 0.0, 1e-14);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let stat = NiwStat::from_point(&dvector![1.0, 2.0, 3.0]);
        assert!(matches!(
            CollapsedNiw.ln_marginal(&prior(), &stat),
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 3
            })
        ));
        assert!(CollapsedNiw.update(&prior(), &stat).is_err());
    }

    #[test]
    fn invalid_hyper_parameters_are_rejected() {
        let mu = dvector![0.0, 0.0];
        assert!(NiwHyperParameter::new(mu.clone(), 0.0, DMatrix::identity(2, 2), 3.0).is_err());
        assert!(NiwHyperParameter::new(mu.clone(), 1.0, DMatrix::identity(2, 2), 0.5).is_err());
        assert!(
            NiwHyperParameter::new(mu.clone(), 1.0, dmatrix![1.0, 2.0; 2.0, 1.0], 3.0).is_err()
        );
        assert!(NiwHyperParameter::new(mu, 1.0, DMatrix::identity(3, 3), 3.0).is_err());

        let mut hp = prior();
        assert!(hp.set_kappa(-1.0).is_err());
        assert::close(hp.kappa(), 0.7, 1e-15);
        assert!(hp.set_nu(f64::NAN).is_err());
        assert::close(hp.nu(), 4.5, 1e-15);
        hp.set_nu(1.5).expect("nu above dim - 1");
        assert::close(hp.nu(), 1.5, 1e-15);
    }

    #[test]
    fn ln_mv_gamma_reduces_to_ln_gamma() {
        assert::close(ln_mv_gamma(1, 3.7), Gamma::ln_gamma(3.7_f64).0, 1e-12);
        // Gamma_2(a) = sqrt(pi) Gamma(a) Gamma(a - 1/2)
        let expected = 0.5 * PI.ln() + Gamma::ln_gamma(2.5_f64).0 + Gamma::ln_gamma(2.0_f64).0;
        assert::close(ln_mv_gamma(2, 2.5), expected, 1e-12);
    }

    #[test]
    fn single_point_marginal_is_student_t() {
        let (mu, kappa, scatter, nu) = (0.4, 2.0, 1.5, 3.0);
        let hp = NiwHyperParameter::new(dvector![mu], kappa, dmatrix![scatter], nu)
            .expect("valid hyper parameter");

        let x = -1.3_f64;
        let ln_m = CollapsedNiw
            .ln_marginal(&hp, &NiwStat::from_point(&dvector![x]))
            .expect("compatible");

        let s2 = scatter * (kappa + 1.0) / (kappa * nu);
        let ln_t = Gamma::ln_gamma((nu + 1.0) / 2.0).0
            - Gamma::ln_gamma(nu / 2.0).0
            - 0.5 * (nu * PI * s2).ln()
            - (nu + 1.0) / 2.0 * (1.0 + (x - mu).powi(2) / (nu * s2)).ln();

        assert::close(ln_m, ln_t, 1e-10);
    }

    #[test]
    fn update_is_consistent_with_marginal() {
        let xs = points();
        let hp = prior();

        let mut first = NiwStat::new(2);
        xs[..2].iter().for_each(|x| first.observe(x));
        let mut second = NiwStat::new(2);
        xs[2..].iter().for_each(|x| second.observe(x));
        let mut all = first.clone();
        all.merge(&second);

        let joint = CollapsedNiw.ln_marginal(&hp, &all).expect("compatible");
        let posterior = CollapsedNiw.update(&hp, &first).expect("compatible");
        let chained = CollapsedNiw.ln_marginal(&hp, &first).expect("compatible")
            + CollapsedNiw
                .ln_marginal(&posterior, &second)
                .expect("compatible");

        assert::close(joint, chained, 1e-9);
        assert::close(
            joint,
            CollapsedNiw.ln_marginal(&hp, &first).expect("compatible")
                + CollapsedNiw
                    .ln_predictive(&hp, &second, &first)
                    .expect("compatible"),
            1e-9,
        );
        assert::close(posterior.kappa(), 2.7, 1e-12);
        assert::close(posterior.nu(), 6.5, 1e-12);
    }

    #[test]
    fn posterior_predictive_is_normalized() {
        let hp = NiwHyperParameter::new(dvector![0.0], 1.0, dmatrix![1.0], 5.0)
            .expect("valid hyper parameter");
        let mut seen = NiwStat::new(1);
        [0.2, -0.4, 1.1].iter().for_each(|x| seen.observe(&dvector![*x]));

        let xs: Vec<f64> = (0..=20_000).map(|i| -50.0 + f64::from(i) * 0.005).collect();
        let fs: Vec<f64> = xs
            .iter()
            .map(|x| {
                CollapsedNiw
                    .ln_pp(&hp, &dvector![*x], &seen)
                    .expect("compatible")
                    .exp()
            })
            .collect();

        assert::close(trapz(&fs, &xs), 1.0, 1e-4);
    }

    #[test]
    fn large_counts_stay_finite() {
        let hp = prior();
        let mut stat = NiwStat::new(2);
        for i in 0..5_000 {
            let t = f64::from(i) * 0.01;
            stat.observe(&dvector![t.sin(), t.cos()]);
        }
        let ln_m = CollapsedNiw.ln_marginal(&hp, &stat).expect("compatible");
        assert!(ln_m.is_finite());
    }
}
