/// Greedy elimination ordering: evidence first, minimum-weight variables
/// next, query variables last.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::assignment::Assignment;
use crate::core::error::BayesError;
use crate::core::network::Network;
use crate::core::node::NodeId;

/// An elimination order split into three consecutive segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    order: Vec<NodeId>,
    evidence_end: usize,
    query_start: usize,
}

impl Ordering {
    /// Order every live node of `network` for a query over `queries` with
    /// the evidence in `ctx`.
    ///
    /// Query variables that are also observed land in the evidence segment.
    /// Within each heuristic phase the variable whose neighbourhood has the
    /// smallest product of state counts goes next; ties keep topological
    /// order.
    pub fn compute(
        network: &Network,
        ctx: &Assignment,
        queries: &[NodeId],
    ) -> Result<Self, BayesError> {
        for id in queries {
            network.node(*id)?;
        }

        let topo = network.topological_order();
        let evidence: Vec<NodeId> = topo.iter().copied().filter(|id| ctx.is_observed(*id)).collect();
        let hidden: Vec<NodeId> = topo
            .iter()
            .copied()
            .filter(|id| !ctx.is_observed(*id) && !queries.contains(id))
            .collect();
        let targets: Vec<NodeId> = topo
            .iter()
            .copied()
            .filter(|id| !ctx.is_observed(*id) && queries.contains(id))
            .collect();

        let mut graph = InteractionGraph::build(network);
        let mut order = evidence;
        let evidence_end = order.len();
        order.extend(graph.eliminate_greedily(&hidden));
        let query_start = order.len();
        order.extend(graph.eliminate_greedily(&targets));

        tracing::trace!(?order, evidence_end, query_start, "computed elimination order");
        Ok(Self {
            order,
            evidence_end,
            query_start,
        })
    }

    /// The full order.
    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn evidence(&self) -> &[NodeId] {
        &self.order[..self.evidence_end]
    }

    /// Variables summed out during elimination.
    pub fn eliminated(&self) -> &[NodeId] {
        &self.order[self.evidence_end..self.query_start]
    }

    /// Unobserved query variables, always last.
    pub fn queries(&self) -> &[NodeId] {
        &self.order[self.query_start..]
    }
}

/// Moral-graph neighbourhoods plus state counts, mutated as variables are
/// eliminated.
struct InteractionGraph {
    neighbours: FxHashMap<NodeId, FxHashSet<NodeId>>,
    cardinality: FxHashMap<NodeId, usize>,
}

impl InteractionGraph {
    /// Connect every pair of variables that share a CPT.
    fn build(network: &Network) -> Self {
        let mut neighbours: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
        let mut cardinality = FxHashMap::default();
        for node in network.nodes() {
            cardinality.insert(node.id(), node.num_states());
            neighbours.entry(node.id()).or_default();
            let scope = node.cpt().vars();
            for a in scope {
                for b in scope {
                    if a != b {
                        neighbours.entry(*a).or_default().insert(*b);
                    }
                }
            }
        }
        Self {
            neighbours,
            cardinality,
        }
    }

    /// Size of the factor eliminating `var` would produce before summing.
    fn weight(&self, var: NodeId) -> usize {
        let own = self.cardinality.get(&var).copied().unwrap_or(1);
        self.neighbours.get(&var).map_or(own, |set| {
            set.iter()
                .map(|n| self.cardinality.get(n).copied().unwrap_or(1))
                .fold(own, usize::saturating_mul)
        })
    }

    /// Repeatedly pick the lightest of `candidates`, add its fill-in edges
    /// and drop it from the graph.
    fn eliminate_greedily(&mut self, candidates: &[NodeId]) -> Vec<NodeId> {
        let mut remaining = candidates.to_vec();
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let mut best = 0;
            let mut best_weight = self.weight(remaining[0]);
            for (i, var) in remaining.iter().enumerate().skip(1) {
                let w = self.weight(*var);
                if w < best_weight {
                    best = i;
                    best_weight = w;
                }
            }
            let var = remaining.remove(best);
            self.eliminate(var);
            order.push(var);
        }
        order
    }

    fn eliminate(&mut self, var: NodeId) {
        let Some(around) = self.neighbours.remove(&var) else {
            return;
        };
        for a in &around {
            if let Some(set) = self.neighbours.get_mut(a) {
                set.remove(&var);
                set.extend(around.iter().filter(|b| *b != a).copied());
            }
        }
    }
}
