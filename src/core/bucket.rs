/// Bucket elimination over an [`Ordering`].

use crate::core::assignment::Assignment;
use crate::core::error::BayesError;
use crate::core::factor::Factor;
use crate::core::network::Network;
use crate::core::node::NodeId;
use crate::core::ordering::Ordering;

/// The factors gathered for one variable.
#[derive(Debug, Clone)]
pub struct Bucket {
    var: NodeId,
    factors: Vec<Factor>,
}

impl Bucket {
    pub fn new(var: NodeId) -> Self {
        Self {
            var,
            factors: Vec::new(),
        }
    }

    pub fn var(&self) -> NodeId {
        self.var
    }

    pub fn push(&mut self, factor: Factor) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Product of every factor in the bucket.
    pub fn join(&self) -> Result<Factor, BayesError> {
        let refs: Vec<&Factor> = self.factors.iter().collect();
        Factor::multiply(&refs)
    }

    /// Join, then sum the bucket's variable out. Returns the separator.
    pub fn eliminate(&self) -> Result<Factor, BayesError> {
        let joined = self.join()?;
        if joined.contains(self.var) {
            joined.sum_out(&[self.var])
        } else {
            Ok(joined)
        }
    }
}

/// A pool of factors eliminated variable by variable.
///
/// The result is the unconditioned joint over the query and evidence
/// variables. Evidence is never applied here, so the same solution serves
/// every assignment of values to the same evidence variables.
#[derive(Debug, Clone)]
pub struct BucketTree<'a> {
    ordering: &'a Ordering,
    pool: Vec<Factor>,
}

impl<'a> BucketTree<'a> {
    /// Seed the pool with every node's CPT.
    pub fn new(network: &Network, ordering: &'a Ordering) -> Self {
        let pool = network.nodes().map(|n| n.cpt().clone()).collect();
        Self { ordering, pool }
    }

    /// Run the elimination and return the joint over `queries` and the
    /// observed variables of `ctx`.
    pub fn eliminate(mut self, queries: &[NodeId], ctx: &Assignment) -> Result<Factor, BayesError> {
        // 1. Sum out every hidden variable in order
        for var in self.ordering.eliminated() {
            let mut bucket = Bucket::new(*var);
            let mut rest = Vec::with_capacity(self.pool.len());
            for factor in self.pool.drain(..) {
                if factor.contains(*var) {
                    bucket.push(factor);
                } else {
                    rest.push(factor);
                }
            }
            self.pool = rest;
            if bucket.is_empty() {
                continue;
            }
            let separator = bucket.eliminate()?;
            tracing::trace!(
                %var,
                factors = bucket.len(),
                separator_width = separator.vars().len(),
                separator_size = separator.values().len(),
                "eliminated bucket"
            );
            self.pool.push(separator);
        }

        // 2. Join what is left into the root bucket
        let remaining: Vec<&Factor> = self.pool.iter().collect();
        let mut solution = Factor::multiply(&remaining)?;

        // 3. Drop anything that leaked in by co-occurrence only
        let leaked: Vec<NodeId> = solution
            .vars()
            .iter()
            .copied()
            .filter(|v| !queries.contains(v) && !ctx.is_observed(*v))
            .collect();
        if !leaked.is_empty() {
            tracing::debug!(?leaked, "summing out leaked variables");
            solution = solution.sum_out(&leaked)?;
        }

        tracing::debug!(
            width = solution.vars().len(),
            size = solution.values().len(),
            "elimination finished"
        );
        Ok(solution)
    }
}
