/// Network variables: state space, edges, CPT, belief and the per-node
/// halves of local inference and Gibbs sampling.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution as _;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::assignment::Assignment;
use crate::core::error::BayesError;
use crate::core::factor::Factor;
use crate::core::network::Network;
use crate::schema::distribution::Distribution;

/// Newtype wrapper for node ids. Ids are stable for the life of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A finite-state random variable.
///
/// Invariants: `cpt.vars()[0]` is this node and `cpt.vars()[1..]` are the
/// parents in edge-addition order; when observed, `belief` is one-hot on
/// the observed state after [`Node::local_inference`].
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    states: Vec<String>,
    parents: Vec<NodeId>,
    children: Vec<NodeId>,
    cpt: Factor,
    belief: Distribution,
    observed: Option<usize>,
    pub(crate) topo_index: usize,
}

/// Precomputed flat-index strides for one node's Markov blanket.
///
/// Built once per sampling run by [`Node::markov_initialize`]; each step only
/// refreshes the base offsets contributed by the other variables.
#[derive(Debug, Clone, Default)]
pub struct BlanketCache {
    own_stride: usize,
    children: Vec<ChildStride>,
}

#[derive(Debug, Clone)]
struct ChildStride {
    child: NodeId,
    stride: usize,
}

impl Node {
    /// A parentless node with a prior one-hot at its first state.
    pub fn new(id: NodeId, name: impl Into<String>, states: Vec<String>) -> Result<Self, BayesError> {
        let name = name.into();
        if states.is_empty() {
            return Err(BayesError::LastState(name));
        }
        for (i, state) in states.iter().enumerate() {
            if states[..i].contains(state) {
                return Err(BayesError::DuplicateVariable(format!("{name}.{state}")));
            }
        }
        let cpt = Factor::from_node(id, states.len());
        let mut belief = Distribution::new(name.clone(), states.clone());
        belief.choose_index(0);
        Ok(Self {
            id,
            name,
            states,
            parents: Vec::new(),
            children: Vec::new(),
            cpt,
            belief,
            observed: None,
            topo_index: 0,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    fn require_state(&self, state: &str) -> Result<usize, BayesError> {
        self.state_index(state)
            .ok_or_else(|| BayesError::UnknownState {
                variable: self.name.clone(),
                state: state.to_string(),
            })
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The conditional probability table P(self | parents).
    pub fn cpt(&self) -> &Factor {
        &self.cpt
    }

    pub fn belief(&self) -> &Distribution {
        &self.belief
    }

    pub fn belief_mut(&mut self) -> &mut Distribution {
        &mut self.belief
    }

    pub fn observed_state(&self) -> Option<usize> {
        self.observed
    }

    pub fn is_observed(&self) -> bool {
        self.observed.is_some()
    }

    /// Position of this node in the network's topological order.
    pub fn topo_index(&self) -> usize {
        self.topo_index
    }

    // --- edges ------------------------------------------------------------

    /// Attach `parent` as the newest parent; the CPT gains a broadcast
    /// dimension for it.
    pub fn add_parent(&mut self, parent: NodeId, parent_states: usize) -> Result<(), BayesError> {
        self.cpt.add_variable(parent, parent_states)?;
        self.parents.push(parent);
        Ok(())
    }

    /// Detach `parent`, keeping only the CPT slice conditioned on
    /// `kept_state` of that parent.
    pub fn remove_parent(&mut self, parent: NodeId, kept_state: usize) -> Result<(), BayesError> {
        let pos = self.parent_position(parent)?;
        self.cpt.remove_variable(pos + 1, kept_state)?;
        self.parents.remove(pos);
        Ok(())
    }

    fn parent_position(&self, parent: NodeId) -> Result<usize, BayesError> {
        self.parents
            .iter()
            .position(|p| *p == parent)
            .ok_or_else(|| BayesError::NotAParent {
                child: self.name.clone(),
                parent: parent.to_string(),
            })
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|c| *c != child);
    }

    // --- states -----------------------------------------------------------

    /// Append a state. The new CPT slice duplicates the previously last one
    /// until real probabilities are set. Children must be told through
    /// [`Node::parent_added_state`].
    pub fn add_state(&mut self, state: impl Into<String>) -> Result<(), BayesError> {
        let state = state.into();
        if self.state_index(&state).is_some() {
            return Err(BayesError::DuplicateVariable(format!("{}.{}", self.name, state)));
        }
        self.cpt.add_state(0)?;
        self.belief.add_state(state.clone());
        self.states.push(state);
        Ok(())
    }

    /// Remove a state and return its former index. Children must be told
    /// through [`Node::parent_removed_state`].
    pub fn remove_state(&mut self, state: &str) -> Result<usize, BayesError> {
        let index = self.require_state(state)?;
        if self.states.len() == 1 {
            return Err(BayesError::LastState(self.name.clone()));
        }
        self.cpt.remove_state(0, index)?;
        self.states.remove(index);
        self.belief.remove_state(index);
        self.observed = match self.observed {
            Some(s) if s == index => None,
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        Ok(index)
    }

    /// Grow the CPT dimension of `parent` after it gained a state.
    pub fn parent_added_state(&mut self, parent: NodeId) -> Result<(), BayesError> {
        let pos = self.parent_position(parent)?;
        self.cpt.add_state(pos + 1)
    }

    /// Shrink the CPT dimension of `parent` after it lost state `index`.
    pub fn parent_removed_state(&mut self, parent: NodeId, index: usize) -> Result<(), BayesError> {
        let pos = self.parent_position(parent)?;
        self.cpt.remove_state(pos + 1, index)
    }

    // --- evidence and priors ------------------------------------------------

    pub fn observe(&mut self, state: &str) -> Result<(), BayesError> {
        let index = self.require_state(state)?;
        self.observed = Some(index);
        Ok(())
    }

    pub fn observe_index(&mut self, index: usize) -> Result<(), BayesError> {
        if index >= self.states.len() {
            return Err(BayesError::UnknownState {
                variable: self.name.clone(),
                state: index.to_string(),
            });
        }
        self.observed = Some(index);
        Ok(())
    }

    pub fn unobserve(&mut self) {
        self.observed = None;
    }

    /// Replace the raw CPT values (row-major, own state outermost).
    pub fn set_prior(&mut self, values: Vec<f64>) -> Result<(), BayesError> {
        self.cpt.set_values(values)
    }

    pub(crate) fn cpt_mut(&mut self) -> &mut Factor {
        &mut self.cpt
    }

    // --- local inference ----------------------------------------------------

    /// Cheap single-pass belief update that trusts the parents' current
    /// beliefs as final. Order dependent and approximate; exact answers come
    /// from [`crate::core::query::Query::solve`].
    ///
    /// `parent_beliefs` holds one probability vector per parent, in parent order.
    pub fn local_inference(&mut self, parent_beliefs: &[&[f64]]) -> Result<(), BayesError> {
        if let Some(state) = self.observed {
            self.belief.choose_index(state);
            return Ok(());
        }
        if self.parents.is_empty() {
            return self.belief.set_values(self.cpt.values().to_vec());
        }
        if parent_beliefs.len() != self.parents.len() {
            return Err(BayesError::InvalidShape {
                expected: self.parents.len(),
                got: parent_beliefs.len(),
            });
        }

        let mut values = vec![0.0; self.states.len()];
        for (flat, index) in self.cpt.shape().indices().enumerate() {
            let weight: f64 = index[1..]
                .iter()
                .zip(parent_beliefs)
                .map(|(state, belief)| belief.get(*state).copied().unwrap_or(0.0))
                .product();
            values[index[0]] += self.cpt.value_at(flat) * weight;
        }
        self.belief.set_values(values)?;
        self.belief.normalize();
        Ok(())
    }

    // --- Gibbs sampling -------------------------------------------------------

    /// Seed this node's sampled state, zero its visit counters and
    /// precompute the strides its blanket updates will use.
    ///
    /// Parents must already hold their seeded states in `ctx`.
    pub fn markov_initialize(
        &self,
        network: &Network,
        ctx: &mut Assignment,
    ) -> Result<BlanketCache, BayesError> {
        if !ctx.is_observed(self.id) {
            let seeded = self.cpt.most_likely(ctx)?;
            ctx.set_state(self.id, seeded);
        }
        ctx.reset_visits(self.id, self.states.len());

        let mut children = Vec::with_capacity(self.children.len());
        for child_id in &self.children {
            let child = network.node(*child_id)?;
            let axis = child
                .cpt
                .axis_of(self.id)
                .ok_or_else(|| BayesError::NotInScope(self.name.clone()))?;
            children.push(ChildStride {
                child: *child_id,
                stride: child.cpt.shape().strides()[axis],
            });
        }

        Ok(BlanketCache {
            own_stride: self.cpt.shape().strides()[0],
            children,
        })
    }

    /// One Gibbs update: resample this node from its full conditional
    /// `CPT(s | parents) * prod_children CPT(child | s, co-parents)` and count
    /// the visit. Returns the new state.
    pub fn markov_blanket_step(
        &self,
        cache: &BlanketCache,
        network: &Network,
        ctx: &mut Assignment,
        rng: &mut StdRng,
    ) -> Result<usize, BayesError> {
        if let Some(state) = ctx.evidence(self.id) {
            ctx.record_visit(self.id, state);
            return Ok(state);
        }

        let own_base = base_offset(&self.cpt, self.id, ctx);
        let mut weights: Vec<f64> = (0..self.states.len())
            .map(|s| self.cpt.value_at(own_base + s * cache.own_stride))
            .collect();

        for link in &cache.children {
            let child = network.node(link.child)?;
            let child_base = base_offset(&child.cpt, self.id, ctx);
            for (s, weight) in weights.iter_mut().enumerate() {
                *weight *= child.cpt.value_at(child_base + s * link.stride);
            }
        }

        let state = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => {
                tracing::warn!(node = %self.name, "all-zero Markov blanket, keeping current state");
                ctx.state(self.id)
            }
        };
        ctx.set_state(self.id, state);
        ctx.record_visit(self.id, state);
        Ok(state)
    }

    /// Empirical marginal from the visit counters, or one-hot when observed.
    pub fn average_belief(&self, ctx: &Assignment) -> Distribution {
        let mut belief = Distribution::new(self.name.clone(), self.states.clone());
        if let Some(state) = ctx.evidence(self.id) {
            belief.choose_index(state);
            return belief;
        }
        let counts = ctx.visits(self.id);
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return self.belief.clone();
        }
        let values = counts.iter().map(|c| *c as f64 / total as f64).collect();
        // Lengths agree: counters are reset to num_states per run.
        if belief.set_values(values).is_err() {
            return self.belief.clone();
        }
        belief
    }
}

/// Flat offset into `factor` from every variable's current state except
/// `skip`, whose contribution is added per candidate state by the caller.
fn base_offset(factor: &Factor, skip: NodeId, ctx: &Assignment) -> usize {
    factor
        .vars()
        .iter()
        .zip(factor.shape().strides())
        .filter(|(var, _)| **var != skip)
        .map(|(var, stride)| ctx.state(*var) * stride)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_node_has_one_hot_prior() {
        let node = Node::new(NodeId(0), "Weather", states(&["Sunny", "Rainy"])).unwrap();
        assert_eq!(node.cpt().values(), &[1.0, 0.0]);
        assert_eq!(node.cpt().vars(), &[NodeId(0)]);
        assert!(node.is_root());
    }

    #[test]
    fn new_rejects_empty_or_duplicate_states() {
        assert!(Node::new(NodeId(0), "X", Vec::new()).is_err());
        assert!(Node::new(NodeId(0), "X", states(&["a", "a"])).is_err());
    }

    #[test]
    fn parents_extend_cpt_in_edge_order() {
        let mut node = Node::new(NodeId(2), "Alarm", states(&["On", "Off"])).unwrap();
        node.add_parent(NodeId(0), 2).unwrap();
        node.add_parent(NodeId(1), 3).unwrap();
        assert_eq!(node.cpt().vars(), &[NodeId(2), NodeId(0), NodeId(1)]);
        assert_eq!(node.cpt().shape().dims(), &[2, 2, 3]);

        node.remove_parent(NodeId(0), 1).unwrap();
        assert_eq!(node.parents(), &[NodeId(1)]);
        assert_eq!(node.cpt().shape().dims(), &[2, 3]);
        assert!(matches!(
            node.remove_parent(NodeId(0), 0),
            Err(BayesError::NotAParent { .. })
        ));
    }

    #[test]
    fn removing_state_shifts_observation() {
        let mut node = Node::new(NodeId(0), "X", states(&["a", "b", "c"])).unwrap();
        node.observe("c").unwrap();
        node.remove_state("a").unwrap();
        assert_eq!(node.observed_state(), Some(1));
        assert_eq!(node.states(), &states(&["b", "c"])[..]);

        node.remove_state("c").unwrap();
        assert_eq!(node.observed_state(), None);
        assert!(matches!(node.remove_state("b"), Err(BayesError::LastState(_))));
    }

    #[test]
    fn local_inference_mixes_parent_beliefs() {
        let mut umbrella = Node::new(NodeId(1), "Umbrella", states(&["Yes", "No"])).unwrap();
        umbrella.add_parent(NodeId(0), 2).unwrap();
        // rows: Umbrella; columns: Weather (Sunny, Rainy)
        umbrella.set_prior(vec![0.1, 0.8, 0.9, 0.2]).unwrap();

        let weather = [0.7, 0.3];
        umbrella.local_inference(&[&weather]).unwrap();
        let yes = umbrella.belief().value("Yes").unwrap();
        assert!((yes - (0.7 * 0.1 + 0.3 * 0.8)).abs() < 1e-12);

        umbrella.observe("No").unwrap();
        umbrella.local_inference(&[&weather]).unwrap();
        assert_eq!(umbrella.belief().values(), &[0.0, 1.0]);
    }

    #[test]
    fn average_belief_falls_back_without_visits() {
        let node = Node::new(NodeId(0), "X", states(&["a", "b"])).unwrap();
        let ctx = Assignment::new(1);
        assert_eq!(node.average_belief(&ctx).values(), node.belief().values());
    }
}
