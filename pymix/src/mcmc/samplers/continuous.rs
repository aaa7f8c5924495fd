pub mod mh;

pub use mh::{MetropolisHastings, RealVariableMove, acceptance_probability};
