/// The network graph: node arena, name index, topological order and the
/// structural-edit API that keeps every CPT consistent.

use rustc_hash::FxHashMap;

use crate::core::assignment::Assignment;
use crate::core::error::BayesError;
use crate::core::node::{Node, NodeId};

/// Slack allowed on a CPT slice before [`Network::set_prior`] rejects it.
pub const CPT_TOLERANCE: f64 = 1e-6;
/// Beyond [`CPT_TOLERANCE`] but within this, a CPT is force-normalized.
const CPT_DRIFT_LIMIT: f64 = 1e-3;

/// A directed acyclic graph of [`Node`]s.
///
/// Node ids index a slot arena; removing a node leaves an empty slot so the
/// ids of every other node stay valid. `revision` counts edits that change
/// structure or CPT values, which is what a cached elimination depends on.
/// Observing nodes never bumps it.
#[derive(Debug, Clone, Default)]
pub struct Network {
    slots: Vec<Option<Node>>,
    names: FxHashMap<String, NodeId>,
    order: Vec<NodeId>,
    revision: u64,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Upper bound on node ids ever handed out; sizes an [`Assignment`].
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Id of the named node, or `UnknownVariable`.
    pub fn require(&self, name: &str) -> Result<NodeId, BayesError> {
        self.id(name)
            .ok_or_else(|| BayesError::UnknownVariable(name.to_string()))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, BayesError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| BayesError::UnknownVariable(id.to_string()))
    }

    pub fn node_by_name(&self, name: &str) -> Result<&Node, BayesError> {
        self.node(self.require(name)?)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, BayesError> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| BayesError::UnknownVariable(id.to_string()))
    }

    /// Node ids with parents before children; ties keep insertion order.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Live nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.slots.get(id.index()).and_then(Option::as_ref))
    }

    // --- structure ----------------------------------------------------------

    /// Add a parentless node whose prior is one-hot at its first state.
    pub fn add_node<S: Into<String>>(
        &mut self,
        name: &str,
        states: impl IntoIterator<Item = S>,
    ) -> Result<NodeId, BayesError> {
        if self.names.contains_key(name) {
            return Err(BayesError::DuplicateNode(name.to_string()));
        }
        let id = NodeId(self.slots.len());
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        let node = Node::new(id, name, states)?;
        self.slots.push(Some(node));
        self.names.insert(name.to_string(), id);
        self.structure_changed();
        tracing::debug!(node = name, %id, "added node");
        Ok(id)
    }

    /// Remove a node. Each child keeps the CPT slice for the removed node's
    /// observed state, or its first state when unobserved.
    pub fn remove_node(&mut self, name: &str) -> Result<(), BayesError> {
        let id = self.require(name)?;
        let node = self.node(id)?;
        let kept = node.observed_state().unwrap_or(0);
        let children = node.children().to_vec();
        let parents = node.parents().to_vec();

        for child in children {
            self.node_mut(child)?.remove_parent(id, kept)?;
        }
        for parent in parents {
            self.node_mut(parent)?.remove_child(id);
        }
        self.slots[id.index()] = None;
        self.names.remove(name);
        self.structure_changed();
        tracing::debug!(node = name, "removed node");
        Ok(())
    }

    /// Add the edge `parent -> child`. The child's CPT gains a broadcast
    /// dimension for the parent.
    pub fn add_parent(&mut self, child: &str, parent: &str) -> Result<(), BayesError> {
        let child_id = self.require(child)?;
        let parent_id = self.require(parent)?;
        if self.node(child_id)?.parents().contains(&parent_id) {
            return Err(BayesError::DuplicateVariable(format!("{parent} -> {child}")));
        }
        if child_id == parent_id || self.reaches(child_id, parent_id) {
            return Err(BayesError::Cycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let parent_states = self.node(parent_id)?.num_states();
        self.node_mut(child_id)?.add_parent(parent_id, parent_states)?;
        self.node_mut(parent_id)?.add_child(child_id);
        self.structure_changed();
        tracing::debug!(parent, child, "added edge");
        Ok(())
    }

    /// Drop the edge `parent -> child`, keeping the child's behaviour under
    /// `kept_state` of the parent.
    pub fn remove_parent(
        &mut self,
        child: &str,
        parent: &str,
        kept_state: &str,
    ) -> Result<(), BayesError> {
        let child_id = self.require(child)?;
        let parent_id = self.require(parent)?;
        let kept = self
            .node(parent_id)?
            .state_index(kept_state)
            .ok_or_else(|| BayesError::UnknownState {
                variable: parent.to_string(),
                state: kept_state.to_string(),
            })?;

        self.node_mut(child_id)?.remove_parent(parent_id, kept)?;
        self.node_mut(parent_id)?.remove_child(child_id);
        self.structure_changed();
        tracing::debug!(parent, child, kept_state, "removed edge");
        Ok(())
    }

    /// Append a state to `node` and grow the matching dimension of every
    /// child CPT.
    pub fn add_state(&mut self, node: &str, state: &str) -> Result<(), BayesError> {
        let id = self.require(node)?;
        self.node_mut(id)?.add_state(state)?;
        let children = self.node(id)?.children().to_vec();
        for child in children {
            self.node_mut(child)?.parent_added_state(id)?;
        }
        self.structure_changed();
        tracing::debug!(node, state, "added state");
        Ok(())
    }

    /// Remove a state from `node` and shrink the matching dimension of every
    /// child CPT.
    pub fn remove_state(&mut self, node: &str, state: &str) -> Result<(), BayesError> {
        let id = self.require(node)?;
        let index = self.node_mut(id)?.remove_state(state)?;
        let children = self.node(id)?.children().to_vec();
        for child in children {
            self.node_mut(child)?.parent_removed_state(id, index)?;
        }
        self.structure_changed();
        tracing::debug!(node, state, "removed state");
        Ok(())
    }

    /// Replace a node's CPT values (row-major: own state outermost, then
    /// parents in edge order).
    ///
    /// Slices off by more than [`CPT_TOLERANCE`] but less than a small drift
    /// limit are force-normalized with a warning; anything worse is rejected.
    pub fn set_prior(&mut self, node: &str, values: Vec<f64>) -> Result<(), BayesError> {
        let id = self.require(node)?;
        let target = self.node_mut(id)?;
        let expected = target.cpt().shape().len();
        if values.len() != expected {
            return Err(BayesError::InvalidShape {
                expected,
                got: values.len(),
            });
        }

        let mut candidate = target.cpt().clone();
        candidate.set_values(values)?;
        if candidate.check_conditional(CPT_TOLERANCE).is_err() {
            candidate.check_conditional(CPT_DRIFT_LIMIT)?;
            tracing::warn!(node, "CPT slices drifted from 1, force-normalizing");
            candidate.normalize_conditional();
        }
        *target.cpt_mut() = candidate;
        self.revision += 1;
        Ok(())
    }

    /// Replace CPT values without the normalization check, for loaders
    /// that must reproduce a stored table exactly.
    pub(crate) fn replace_cpt(&mut self, id: NodeId, values: Vec<f64>) -> Result<(), BayesError> {
        self.node_mut(id)?.cpt_mut().set_values(values)?;
        self.revision += 1;
        Ok(())
    }

    fn structure_changed(&mut self) {
        self.revision += 1;
        self.recompute_order();
    }

    /// True when `to` is reachable from `from` along child edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.slots.len()];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            if let Ok(node) = self.node(id) {
                stack.extend(node.children().iter().copied());
            }
        }
        false
    }

    /// Kahn's algorithm over live nodes, lowest id first among ready nodes.
    fn recompute_order(&mut self) {
        let mut indegree: Vec<usize> = self
            .slots
            .iter()
            .map(|slot| slot.as_ref().map_or(0, |n| n.parents().len()))
            .collect();
        let mut ready: Vec<NodeId> = self
            .slots
            .iter()
            .flatten()
            .filter(|n| n.is_root())
            .map(Node::id)
            .rev()
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(id) = ready.pop() {
            order.push(id);
            let Some(node) = self.slots[id.index()].as_ref() else {
                continue;
            };
            let mut unlocked = Vec::new();
            for child in node.children() {
                indegree[child.index()] -= 1;
                if indegree[child.index()] == 0 {
                    unlocked.push(*child);
                }
            }
            ready.extend(unlocked);
            ready.sort_unstable_by(|a, b| b.cmp(a));
        }

        for (position, id) in order.iter().enumerate() {
            if let Some(node) = self.slots[id.index()].as_mut() {
                node.topo_index = position;
            }
        }
        self.order = order;
    }

    // --- evidence -------------------------------------------------------------

    pub fn observe(&mut self, node: &str, state: &str) -> Result<(), BayesError> {
        let id = self.require(node)?;
        self.node_mut(id)?.observe(state)
    }

    pub fn unobserve(&mut self, node: &str) -> Result<(), BayesError> {
        let id = self.require(node)?;
        self.node_mut(id)?.unobserve();
        Ok(())
    }

    pub fn clear_evidence(&mut self) {
        for node in self.slots.iter_mut().flatten() {
            node.unobserve();
        }
    }

    pub fn evidence_count(&self) -> usize {
        self.nodes().filter(|n| n.is_observed()).count()
    }

    /// A fresh assignment carrying every current observation.
    pub fn assignment(&self) -> Assignment {
        let mut ctx = Assignment::new(self.slots());
        for node in self.nodes() {
            if let Some(state) = node.observed_state() {
                ctx.observe(node.id(), state);
            }
        }
        ctx
    }

    // --- beliefs ----------------------------------------------------------------

    /// Single forward pass of [`Node::local_inference`] in topological order.
    pub fn local_inference(&mut self) -> Result<(), BayesError> {
        let order = self.order.clone();
        for id in order {
            let parents = self.node(id)?.parents().to_vec();
            let mut beliefs = Vec::with_capacity(parents.len());
            for parent in &parents {
                beliefs.push(self.node(*parent)?.belief().values().to_vec());
            }
            let views: Vec<&[f64]> = beliefs.iter().map(Vec::as_slice).collect();
            self.node_mut(id)?.local_inference(&views)?;
        }
        Ok(())
    }

    /// Snapshot every node's belief under `tag`.
    pub fn record_beliefs(&mut self, tag: &str) {
        for node in self.slots.iter_mut().flatten() {
            node.belief_mut().record(tag);
        }
    }

    /// Restore every node's belief from the snapshot under `tag`.
    pub fn recall_beliefs(&mut self, tag: &str) -> Result<(), BayesError> {
        for node in self.slots.iter_mut().flatten() {
            node.belief_mut().recall(tag)?;
        }
        Ok(())
    }
}
