//! Bayes Engine — discrete Bayesian-network inference.
//!
//! Builds networks of finite-state variables with conditional probability
//! tables and answers posterior queries, exactly by heuristic-ordered bucket
//! elimination or approximately by Markov-blanket Gibbs sampling.

pub mod core;
pub mod schema;
