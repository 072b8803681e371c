pub mod distribution;
pub mod network_def;
