pub mod continuous;
pub mod partition;
