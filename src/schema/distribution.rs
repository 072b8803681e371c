use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::BayesError;

/// A named probability vector over an ordered list of named states.
///
/// Used for node beliefs and for the per-variable results of a query.
/// Snapshots taken with [`Distribution::record`] live as long as the
/// distribution and let callers stash and restore alternative evaluation
/// contexts on the same variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    name: String,
    states: Vec<String>,
    values: Vec<f64>,
    #[serde(skip)]
    snapshots: FxHashMap<String, Vec<f64>>,
}

impl Distribution {
    /// A uniform distribution over `states`.
    pub fn new(name: impl Into<String>, states: Vec<String>) -> Self {
        let uniform = if states.is_empty() {
            0.0
        } else {
            1.0 / states.len() as f64
        };
        let values = vec![uniform; states.len()];
        Self {
            name: name.into(),
            states,
            values,
            snapshots: FxHashMap::default(),
        }
    }

    /// A distribution with explicit values; lengths must agree.
    pub fn from_values(
        name: impl Into<String>,
        states: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, BayesError> {
        if states.len() != values.len() {
            return Err(BayesError::InvalidShape {
                expected: states.len(),
                got: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            states,
            values,
            snapshots: FxHashMap::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    /// Probability of the named state.
    pub fn value(&self, state: &str) -> Option<f64> {
        self.state_index(state).map(|i| self.values[i])
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn set_values(&mut self, values: Vec<f64>) -> Result<(), BayesError> {
        if values.len() != self.states.len() {
            return Err(BayesError::InvalidShape {
                expected: self.states.len(),
                got: values.len(),
            });
        }
        self.values = values;
        Ok(())
    }

    /// Make the distribution one-hot on the named state.
    pub fn choose(&mut self, state: &str) -> Result<(), BayesError> {
        let index = self
            .state_index(state)
            .ok_or_else(|| BayesError::UnknownState {
                variable: self.name.clone(),
                state: state.to_string(),
            })?;
        self.choose_index(index);
        Ok(())
    }

    pub fn choose_index(&mut self, index: usize) {
        for (i, v) in self.values.iter_mut().enumerate() {
            *v = if i == index { 1.0 } else { 0.0 };
        }
    }

    pub fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Accumulate `weight * other` into this distribution (mixing).
    pub fn add_in_multiplied(&mut self, other: &Distribution, weight: f64) -> Result<(), BayesError> {
        if other.len() != self.len() {
            return Err(BayesError::InvalidShape {
                expected: self.len(),
                got: other.len(),
            });
        }
        for (v, o) in self.values.iter_mut().zip(&other.values) {
            *v += weight * o;
        }
        Ok(())
    }

    /// Scale to sum to one and return the previous sum. Zero-sum vectors
    /// are left untouched.
    pub fn normalize(&mut self) -> f64 {
        let total: f64 = self.values.iter().sum();
        if total > 0.0 {
            self.values.iter_mut().for_each(|v| *v /= total);
        }
        total
    }

    /// Normalize, failing if the sum was not within `tolerance` of one.
    pub fn normalize_checked(&mut self, tolerance: f64) -> Result<(), BayesError> {
        let sum: f64 = self.values.iter().sum();
        if !((sum - 1.0).abs() <= tolerance) {
            return Err(BayesError::Denormalized { sum, tolerance });
        }
        self.normalize();
        Ok(())
    }

    /// Stash a copy of the current values under `tag`.
    pub fn record(&mut self, tag: &str) {
        self.snapshots.insert(tag.to_string(), self.values.clone());
    }

    /// Restore the values stashed under `tag`.
    pub fn recall(&mut self, tag: &str) -> Result<(), BayesError> {
        let snapshot = self
            .snapshots
            .get(tag)
            .ok_or_else(|| BayesError::UnknownSnapshot(tag.to_string()))?;
        if snapshot.len() != self.states.len() {
            return Err(BayesError::InvalidShape {
                expected: self.states.len(),
                got: snapshot.len(),
            });
        }
        self.values = snapshot.clone();
        Ok(())
    }

    pub fn has_snapshot(&self, tag: &str) -> bool {
        self.snapshots.contains_key(tag)
    }

    /// Append a state with probability zero.
    pub fn add_state(&mut self, state: impl Into<String>) {
        self.states.push(state.into());
        self.values.push(0.0);
    }

    /// Drop a state and renormalize what is left.
    pub fn remove_state(&mut self, index: usize) {
        if index < self.states.len() {
            self.states.remove(index);
            self.values.remove(index);
            self.normalize();
        }
    }

    /// Index of the most probable state; ties go to the lowest index.
    pub fn most_likely(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.values.iter().enumerate() {
            if *v > self.values[best] {
                best = i;
            }
        }
        best
    }

    /// Shannon entropy in bits.
    pub fn entropy(&self) -> f64 {
        self.values
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.log2())
            .sum()
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        let width = self.states.iter().map(String::len).max().unwrap_or(0);
        for (state, value) in self.states.iter().zip(&self.values) {
            writeln!(f, "  {:<width$}  {:.4}", state, value, width = width)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather() -> Distribution {
        Distribution::from_values(
            "Weather",
            vec!["Sunny".to_string(), "Rainy".to_string()],
            vec![0.7, 0.3],
        )
        .unwrap()
    }

    #[test]
    fn new_is_uniform() {
        let d = Distribution::new("X", vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        assert_eq!(d.values(), &[0.25; 4]);
    }

    #[test]
    fn from_values_checks_length() {
        let bad = Distribution::from_values("X", vec!["a".into()], vec![0.5, 0.5]);
        assert!(matches!(bad, Err(BayesError::InvalidShape { .. })));
    }

    #[test]
    fn choose_makes_one_hot() {
        let mut d = weather();
        d.choose("Rainy").unwrap();
        assert_eq!(d.values(), &[0.0, 1.0]);
        assert!(d.choose("Foggy").is_err());
    }

    #[test]
    fn mixing_and_normalizing() {
        let mut mix = weather();
        mix.zero();
        let mut rainy = weather();
        rainy.choose("Rainy").unwrap();
        mix.add_in_multiplied(&weather(), 0.5).unwrap();
        mix.add_in_multiplied(&rainy, 0.5).unwrap();
        assert!((mix.value("Sunny").unwrap() - 0.35).abs() < 1e-12);
        assert!((mix.value("Rainy").unwrap() - 0.65).abs() < 1e-12);

        let mut scaled = Distribution::from_values("X", vec!["a".into(), "b".into()], vec![2.0, 6.0])
            .unwrap();
        assert_eq!(scaled.normalize(), 8.0);
        assert_eq!(scaled.values(), &[0.25, 0.75]);
    }

    #[test]
    fn strict_normalize_rejects_drift() {
        let mut d = Distribution::from_values("X", vec!["a".into(), "b".into()], vec![0.5, 0.6])
            .unwrap();
        assert!(d.normalize_checked(1e-3).is_err());
        assert!(d.normalize_checked(0.2).is_ok());
    }

    #[test]
    fn record_and_recall_snapshots() {
        let mut d = weather();
        d.record("forward");
        d.choose("Sunny").unwrap();
        d.record("style");

        d.recall("forward").unwrap();
        assert_eq!(d.values(), &[0.7, 0.3]);
        d.recall("style").unwrap();
        assert_eq!(d.values(), &[1.0, 0.0]);
        assert!(matches!(d.recall("missing"), Err(BayesError::UnknownSnapshot(_))));
    }

    #[test]
    fn entropy_of_fair_coin_is_one_bit() {
        let d = Distribution::new("Coin", vec!["H".into(), "T".into()]);
        assert!((d.entropy() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn display_lists_states() {
        let text = weather().to_string();
        assert!(text.starts_with("Weather\n"));
        assert!(text.contains("Sunny  0.7000"));
        assert!(text.contains("Rainy  0.3000"));
    }
}
