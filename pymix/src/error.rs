use thiserror::Error;

/// Errors raised by the sampler.
///
/// Every variant is a setup or invariant violation. Stochastic outcomes such
/// as a rejected Metropolis-Hastings proposal are not errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid Pitman-Yor parameters: strength = {strength}, discount = {discount} (need 0 <= discount < 1 and strength > -discount)")]
    InvalidPitmanYor { strength: f64, discount: f64 },

    #[error("invalid hyper parameter `{name}` = {value}: {reason}")]
    InvalidHyperParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("matrix `{0}` is not positive definite")]
    NotPositiveDefinite(&'static str),

    #[error("malformed observation on line {line}: {reason}")]
    MalformedObservation { line: usize, reason: String },

    #[error("no observations were provided")]
    EmptyData,

    #[error("customer {0} is not seated")]
    UnseatedCustomer(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
