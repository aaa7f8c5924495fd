use rand::Rng;
use rv::misc::LogSumExp;

/// Prevent the inner value from being verbosely / pretty printed during a debug.
pub(crate) struct NoPrettyPrint<T: std::fmt::Debug>(pub T);

impl<T: std::fmt::Debug> NoPrettyPrint<T> {
    pub const fn new(t: T) -> Self {
        Self(t)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for NoPrettyPrint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Prevent "{:#?}" from being used.
        write!(f, "{:?}", self.0)
    }
}

#[must_use]
pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    x.iter()
        .zip(x.iter().skip(1))
        .zip(y.iter().zip(y.iter().skip(1)))
        .map(|((x0, x1), (y0, y1))| (y1 + y0) * (x1 - x0) / 2.0)
        .sum()
}

/// Normalize log weights into probabilities with log-sum-exp.
///
/// If every weight is `-inf` the result is uniform.
#[must_use]
pub fn normalized_probabilities(ln_weights: &[f64]) -> Vec<f64> {
    let ln_total = ln_weights.iter().copied().logsumexp();
    if ln_total.is_finite() {
        ln_weights.iter().map(|w| (w - ln_total).exp()).collect()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let p = 1.0 / ln_weights.len() as f64;
        vec![p; ln_weights.len()]
    }
}

/// Draw an index from unnormalized log weights with exactly one uniform draw,
/// scanning the cumulative distribution in index order.
///
/// # Panics
/// If `ln_weights` is empty.
pub fn ln_categorical_draw<R: Rng>(ln_weights: &[f64], rng: &mut R) -> usize {
    assert!(!ln_weights.is_empty(), "cannot draw from zero outcomes");
    let u: f64 = rng.random();

    let mut cumulative = 0.0;
    let probabilities = normalized_probabilities(ln_weights);
    for (i, p) in probabilities.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return i;
        }
    }

    // Rounding left the total a hair under `u`; take the last possible outcome.
    probabilities
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(ln_weights.len() - 1)
}

/// Online Mean and Variance
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanAndVariance<T> {
    count: usize,
    mean: T,
    m2: T,
}

macro_rules! impl_m_and_v {
    ($t: ty) => {
        impl MeanAndVariance<$t> {
            #[must_use]
            pub fn update(self, new_value: $t) -> Self {
                let count = self.count + 1;
                let delta = new_value - self.mean;
                #[allow(clippy::cast_precision_loss)]
                let mean = self.mean + delta / (count as $t);
                let delta2 = new_value - mean;
                let m2 = delta.mul_add(delta2, self.m2);

                Self { count, mean, m2 }
            }

            #[must_use]
            pub const fn count(&self) -> usize {
                self.count
            }

            #[must_use]
            pub const fn mean(&self) -> $t {
                self.mean
            }

            /// Unbiased sample variance; zero until two values are seen.
            #[allow(clippy::cast_precision_loss)]
            #[must_use]
            pub fn sample_variance(&self) -> $t {
                if self.count < 2 {
                    0.0
                } else {
                    self.m2 / ((self.count - 1) as $t)
                }
            }
        }

        impl FromIterator<$t> for MeanAndVariance<$t> {
            fn from_iter<T: IntoIterator<Item = $t>>(iter: T) -> Self {
                iter.into_iter()
                    .fold(Self::default(), |acc, x| acc.update(x))
            }
        }
    };
}

impl_m_and_v!(f64);
