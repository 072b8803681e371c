pub mod assignment;
pub mod bucket;
pub mod error;
pub mod factor;
pub mod network;
pub mod node;
pub mod ordering;
pub mod persist;
pub mod query;
pub mod sampler;
pub mod shape;
