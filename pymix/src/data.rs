pub mod observations;
pub mod partition;

pub use partition::{ClusterId, ClusteringState, Table};
