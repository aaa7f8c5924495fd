//! Inference for Pitman-Yor mixtures of multivariate Gaussians.
//!
//! Component parameters are integrated out under a Normal-Inverse-Wishart
//! prior. Seating is sampled with collapsed Gibbs moves and the scalar hyper
//! parameters with random walk Metropolis-Hastings.
//!
//! ```no_run
//! use pymix::config::SamplerConfig;
//! use pymix::data::observations::load_csv;
//! use pymix::inference::InferenceState;
//! use rand::SeedableRng;
//! use rand::rngs::SmallRng;
//!
//! # fn main() -> pymix::Result<()> {
//! let config = SamplerConfig::load("chain.toml")?;
//! let mut inference = InferenceState::from_config(load_csv("points.csv")?, &config)?;
//! let mut rng = SmallRng::seed_from_u64(config.seed);
//!
//! inference.multi_sweep(1_000, &mut rng)?;
//! for record in inference.trace(100, 10, &mut rng)? {
//!     record.write_json_line(&mut std::io::stdout())?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod mcmc;
pub mod models;
pub mod predictive;
pub mod state;
pub mod utils;

pub use error::{Error, Result};
