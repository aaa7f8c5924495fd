pub mod gibbs;

pub use gibbs::PartitionGibbs;
