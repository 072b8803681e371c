/// Per-run assignment context: evidence, current states and visit counts.

use crate::core::node::NodeId;

/// The mutable state one elimination or sampling run works against.
///
/// Nodes never carry run state themselves; a query builds an `Assignment`
/// from the network's evidence and passes it by reference into elimination
/// and sampling, so independent queries can share one network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    evidence: Vec<Option<usize>>,
    states: Vec<usize>,
    visits: Vec<Vec<u64>>,
}

impl Assignment {
    /// An empty context with room for `slots` node ids.
    pub fn new(slots: usize) -> Self {
        Self {
            evidence: vec![None; slots],
            states: vec![0; slots],
            visits: vec![Vec::new(); slots],
        }
    }

    fn ensure(&mut self, id: NodeId) {
        let needed = id.index() + 1;
        if self.evidence.len() < needed {
            self.evidence.resize(needed, None);
            self.states.resize(needed, 0);
            self.visits.resize(needed, Vec::new());
        }
    }

    /// Fix `id` to `state`.
    pub fn observe(&mut self, id: NodeId, state: usize) {
        self.ensure(id);
        self.evidence[id.index()] = Some(state);
        self.states[id.index()] = state;
    }

    pub fn unobserve(&mut self, id: NodeId) {
        if let Some(slot) = self.evidence.get_mut(id.index()) {
            *slot = None;
        }
    }

    pub fn evidence(&self, id: NodeId) -> Option<usize> {
        self.evidence.get(id.index()).copied().flatten()
    }

    pub fn is_observed(&self, id: NodeId) -> bool {
        self.evidence(id).is_some()
    }

    pub fn evidence_count(&self) -> usize {
        self.evidence.iter().filter(|e| e.is_some()).count()
    }

    /// Ids of every observed node, in id order.
    pub fn observed(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.evidence
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| NodeId(i))
    }

    /// True when both contexts observe exactly the same variables,
    /// regardless of which states they are observed in.
    pub fn same_observed_set(&self, other: &Assignment) -> bool {
        self.observed().eq(other.observed())
    }

    /// Current discrete state of `id`; evidence wins over sampled state.
    pub fn state(&self, id: NodeId) -> usize {
        match self.evidence(id) {
            Some(state) => state,
            None => self.states.get(id.index()).copied().unwrap_or(0),
        }
    }

    pub fn set_state(&mut self, id: NodeId, state: usize) {
        self.ensure(id);
        self.states[id.index()] = state;
    }

    /// Zero the visit counters of `id` for a node with `num_states` states.
    pub fn reset_visits(&mut self, id: NodeId, num_states: usize) {
        self.ensure(id);
        self.visits[id.index()] = vec![0; num_states];
    }

    pub fn record_visit(&mut self, id: NodeId, state: usize) {
        self.ensure(id);
        if let Some(count) = self.visits[id.index()].get_mut(state) {
            *count += 1;
        }
    }

    pub fn visits(&self, id: NodeId) -> &[u64] {
        self.visits
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
