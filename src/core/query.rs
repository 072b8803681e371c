/// Queries: configuration, the elimination cache and the exact and
/// approximate solve paths.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::assignment::Assignment;
use crate::core::bucket::BucketTree;
use crate::core::error::BayesError;
use crate::core::factor::Factor;
use crate::core::network::Network;
use crate::core::node::NodeId;
use crate::core::ordering::Ordering;
use crate::core::sampler::{GibbsSampler, SamplerConfig};
use crate::schema::distribution::Distribution;

/// Knobs for the exact solve path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// When set, the eliminated joint must sum to one within this tolerance
    /// before evidence is applied; otherwise it is silently renormalized.
    pub strict_tolerance: Option<f64>,
}

/// The retained result of one elimination.
#[derive(Debug, Clone)]
struct Cached {
    revision: u64,
    observed: Vec<NodeId>,
    queried: Vec<NodeId>,
    ordering: Ordering,
    solution: Factor,
}

/// A named question to ask a [`Network`].
///
/// # Example
///
/// ```
/// use bayes_engine::core::network::Network;
/// use bayes_engine::core::query::Query;
///
/// let mut net = Network::new();
/// net.add_node("Weather", ["Sunny", "Rainy"]).unwrap();
/// net.add_node("Umbrella", ["Yes", "No"]).unwrap();
/// net.add_parent("Umbrella", "Weather").unwrap();
/// net.set_prior("Weather", vec![0.7, 0.3]).unwrap();
/// net.set_prior("Umbrella", vec![0.1, 0.8, 0.9, 0.2]).unwrap();
/// net.observe("Umbrella", "Yes").unwrap();
///
/// let mut query = Query::new("rain?").queried(["Weather"]).observed(["Umbrella"]);
/// query.solve(&net).unwrap();
/// let rainy = query.distribution("Weather").unwrap().value("Rainy").unwrap();
/// assert!((rainy - 0.24 / 0.31).abs() < 1e-9);
/// ```
///
/// The elimination result is cached per (network revision, observed
/// variables, queried variables). Re-solving after only changing which
/// states the observed variables are in reuses it.
#[derive(Debug, Clone)]
pub struct Query {
    name: String,
    queried: Vec<String>,
    observed: Vec<String>,
    priors: Vec<String>,
    options: QueryOptions,
    cache: Option<Cached>,
    sampler: Option<GibbsSampler>,
    approximate: bool,
    qmap: FxHashMap<String, Distribution>,
    joint: Option<Factor>,
    eliminations: usize,
}

fn names<S: Into<String>>(list: impl IntoIterator<Item = S>) -> Vec<String> {
    list.into_iter().map(Into::into).collect()
}

impl Query {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queried: Vec::new(),
            observed: Vec::new(),
            priors: Vec::new(),
            options: QueryOptions::default(),
            cache: None,
            sampler: None,
            approximate: false,
            qmap: FxHashMap::default(),
            joint: None,
            eliminations: 0,
        }
    }

    /// Builder form of [`Query::set_queried`].
    pub fn queried<S: Into<String>>(mut self, list: impl IntoIterator<Item = S>) -> Self {
        self.set_queried(list);
        self
    }

    /// Builder form of [`Query::set_observed`].
    pub fn observed<S: Into<String>>(mut self, list: impl IntoIterator<Item = S>) -> Self {
        self.set_observed(list);
        self
    }

    /// Builder form of [`Query::set_prior`].
    pub fn priors<S: Into<String>>(mut self, list: impl IntoIterator<Item = S>) -> Self {
        self.set_prior(list);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_queried<S: Into<String>>(&mut self, list: impl IntoIterator<Item = S>) {
        self.queried = names(list);
        self.invalidate();
    }

    pub fn set_observed<S: Into<String>>(&mut self, list: impl IntoIterator<Item = S>) {
        self.observed = names(list);
        self.invalidate();
    }

    /// Record which variables had their priors changed. Informational; the
    /// cache is dropped all the same.
    pub fn set_prior<S: Into<String>>(&mut self, list: impl IntoIterator<Item = S>) {
        self.priors = names(list);
        self.invalidate();
    }

    /// Forget the cached elimination and any sampling result.
    pub fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            tracing::debug!(query = %self.name, "cache invalidated");
        }
        self.approximate = false;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queried_names(&self) -> &[String] {
        &self.queried
    }

    pub fn observed_names(&self) -> &[String] {
        &self.observed
    }

    pub fn prior_names(&self) -> &[String] {
        &self.priors
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Whether an elimination result is currently held.
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether the current results came from [`Query::approx`].
    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    /// How many times this query has run elimination.
    pub fn eliminations(&self) -> usize {
        self.eliminations
    }

    /// Order used by the cached elimination.
    pub fn ordering(&self) -> Option<&Ordering> {
        self.cache.as_ref().map(|c| &c.ordering)
    }

    /// Posterior of one queried variable from the last solve.
    pub fn distribution(&self, name: &str) -> Option<&Distribution> {
        self.qmap.get(name)
    }

    /// Posteriors in the order the variables were queried.
    pub fn results(&self) -> impl Iterator<Item = &Distribution> + '_ {
        self.queried.iter().filter_map(|name| self.qmap.get(name))
    }

    /// Joint over the unobserved queried variables from the last solve.
    pub fn joint(&self) -> Option<&Factor> {
        self.joint.as_ref()
    }

    fn resolve_queried(&self, network: &Network) -> Result<Vec<NodeId>, BayesError> {
        let mut ids = Vec::with_capacity(self.queried.len());
        for name in &self.queried {
            let id = network.require(name)?;
            if ids.contains(&id) {
                return Err(BayesError::DuplicateVariable(name.clone()));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Evidence for exactly the configured observed variables; anything
    /// else observed on the network is ignored.
    fn evidence(&self, network: &Network) -> Result<Assignment, BayesError> {
        let mut ctx = Assignment::new(network.slots());
        for name in &self.observed {
            let node = network.node_by_name(name)?;
            let state = node
                .observed_state()
                .ok_or_else(|| BayesError::MissingEvidence(name.clone()))?;
            ctx.observe(node.id(), state);
        }
        Ok(ctx)
    }

    fn cache_matches(&self, network: &Network, observed: &[NodeId], queried: &[NodeId]) -> bool {
        self.cache.as_ref().is_some_and(|c| {
            c.revision == network.revision() && c.observed == observed && c.queried == queried
        })
    }

    /// Exact posteriors by variable elimination.
    pub fn solve(&mut self, network: &Network) -> Result<(), BayesError> {
        let queried = self.resolve_queried(network)?;
        let ctx = self.evidence(network)?;
        let observed: Vec<NodeId> = ctx.observed().collect();

        if self.cache_matches(network, &observed, &queried) {
            tracing::debug!(query = %self.name, "reusing cached elimination");
        } else {
            tracing::debug!(query = %self.name, "running elimination");
            let ordering = Ordering::compute(network, &ctx, &queried)?;
            let solution = BucketTree::new(network, &ordering).eliminate(&queried, &ctx)?;
            self.eliminations += 1;
            self.cache = Some(Cached {
                revision: network.revision(),
                observed,
                queried: queried.clone(),
                ordering,
                solution,
            });
        }
        let Some(cached) = self.cache.as_ref() else {
            return Err(BayesError::Format("elimination produced no solution".to_string()));
        };

        // The unconditioned joint over query and evidence variables carries
        // the model's total mass, whatever the evidence values are.
        if let Some(tolerance) = self.options.strict_tolerance {
            let sum = cached.solution.total();
            if !((sum - 1.0).abs() <= tolerance) {
                return Err(BayesError::Denormalized { sum, tolerance });
            }
        }

        let mut result = cached.solution.clone();
        result.remove_observed(&ctx)?;
        let total = result.normalize();
        if !(total > 0.0) {
            return Err(BayesError::ImpossibleEvidence);
        }

        let mut qmap = FxHashMap::default();
        for (name, id) in self.queried.iter().zip(&queried) {
            let node = network.node(*id)?;
            let mut posterior = Distribution::new(name.clone(), node.states().to_vec());
            match ctx.evidence(*id) {
                Some(state) => posterior.choose_index(state),
                None => {
                    let mut marginal = result.sum_out_except(&[*id])?;
                    marginal.normalize_conditional();
                    posterior.set_values(marginal.values().to_vec())?;
                }
            }
            qmap.insert(name.clone(), posterior);
        }

        self.qmap = qmap;
        self.joint = Some(result);
        self.approximate = false;
        Ok(())
    }

    /// Approximate posteriors by Gibbs sampling.
    ///
    /// The joint is the product of the sampled marginals, which treats the
    /// queried variables as independent.
    pub fn approx(&mut self, network: &Network, config: &SamplerConfig) -> Result<(), BayesError> {
        let queried = self.resolve_queried(network)?;
        let ctx = self.evidence(network)?;

        if !config.resume {
            self.sampler = None;
        }
        let sampler = self
            .sampler
            .get_or_insert_with(|| GibbsSampler::new(config.clone()));
        sampler.set_config(config.clone());
        let chain = sampler.run(network, &ctx)?;

        let mut qmap = FxHashMap::default();
        let mut marginals = Vec::new();
        for (name, id) in self.queried.iter().zip(&queried) {
            let node = network.node(*id)?;
            let belief = node.average_belief(chain);
            if !chain.is_observed(*id) {
                marginals.push(Factor::from_values(
                    vec![*id],
                    vec![node.num_states()],
                    belief.values().to_vec(),
                )?);
            }
            let posterior =
                Distribution::from_values(name.clone(), node.states().to_vec(), belief.values().to_vec())?;
            qmap.insert(name.clone(), posterior);
        }
        let refs: Vec<&Factor> = marginals.iter().collect();

        self.joint = Some(Factor::multiply(&refs)?);
        self.qmap = qmap;
        self.approximate = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_umbrella() -> Network {
        let mut net = Network::new();
        net.add_node("Weather", ["Sunny", "Rainy"]).unwrap();
        net.add_node("Umbrella", ["Yes", "No"]).unwrap();
        net.add_parent("Umbrella", "Weather").unwrap();
        net.set_prior("Weather", vec![0.7, 0.3]).unwrap();
        net.set_prior("Umbrella", vec![0.1, 0.8, 0.9, 0.2]).unwrap();
        net
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn predictive_query() {
        let mut net = weather_umbrella();
        net.observe("Weather", "Rainy").unwrap();
        let mut q = Query::new("umbrella").queried(["Umbrella"]).observed(["Weather"]);
        q.solve(&net).unwrap();
        let umbrella = q.distribution("Umbrella").unwrap();
        assert!(close(umbrella.value("Yes").unwrap(), 0.8));
        assert!(close(umbrella.value("No").unwrap(), 0.2));
    }

    #[test]
    fn diagnostic_query_applies_bayes_rule() {
        let mut net = weather_umbrella();
        net.observe("Umbrella", "Yes").unwrap();
        let mut q = Query::new("weather").queried(["Weather"]).observed(["Umbrella"]);
        q.solve(&net).unwrap();
        let weather = q.distribution("Weather").unwrap();
        assert!(close(weather.value("Sunny").unwrap(), 0.07 / 0.31));
        assert!(close(weather.value("Rainy").unwrap(), 0.24 / 0.31));
    }

    #[test]
    fn changing_evidence_value_reuses_cache() {
        let mut net = weather_umbrella();
        net.observe("Umbrella", "Yes").unwrap();
        let mut q = Query::new("weather").queried(["Weather"]).observed(["Umbrella"]);
        q.solve(&net).unwrap();
        assert_eq!(q.eliminations(), 1);

        net.observe("Umbrella", "No").unwrap();
        q.solve(&net).unwrap();
        assert_eq!(q.eliminations(), 1);
        let sunny = q.distribution("Weather").unwrap().value("Sunny").unwrap();
        assert!(close(sunny, 0.63 / 0.69));
    }

    #[test]
    fn structural_edits_force_one_re_elimination() {
        let mut net = weather_umbrella();
        net.observe("Umbrella", "Yes").unwrap();
        let mut q = Query::new("weather").queried(["Weather"]).observed(["Umbrella"]);
        q.solve(&net).unwrap();

        net.add_state("Weather", "Foggy").unwrap();
        q.solve(&net).unwrap();
        q.solve(&net).unwrap();
        assert_eq!(q.eliminations(), 2);

        q.set_observed(Vec::<String>::new());
        q.solve(&net).unwrap();
        assert_eq!(q.eliminations(), 3);
    }

    #[test]
    fn missing_and_impossible_evidence() {
        let mut net = weather_umbrella();
        let mut q = Query::new("w").queried(["Weather"]).observed(["Umbrella"]);
        assert!(matches!(q.solve(&net), Err(BayesError::MissingEvidence(_))));

        net.set_prior("Weather", vec![1.0, 0.0]).unwrap();
        net.set_prior("Umbrella", vec![0.0, 0.8, 1.0, 0.2]).unwrap();
        net.observe("Umbrella", "Yes").unwrap();
        assert!(matches!(q.solve(&net), Err(BayesError::ImpossibleEvidence)));
    }

    #[test]
    fn strict_tolerance_rejects_drifted_tables() {
        let mut net = weather_umbrella();
        let weather = net.id("Weather").unwrap();
        net.replace_cpt(weather, vec![0.7, 0.7]).unwrap();
        let strict = QueryOptions {
            strict_tolerance: Some(1e-9),
        };

        let mut q = Query::new("w").queried(["Weather"]).with_options(strict.clone());
        assert!(matches!(
            q.solve(&net),
            Err(BayesError::Denormalized { sum, .. }) if close(sum, 1.4)
        ));

        net.observe("Umbrella", "Yes").unwrap();
        let mut q = Query::new("w")
            .queried(["Weather"])
            .observed(["Umbrella"])
            .with_options(strict);
        assert!(matches!(q.solve(&net), Err(BayesError::Denormalized { .. })));

        let mut lenient = Query::new("w").queried(["Weather"]).observed(["Umbrella"]);
        lenient.solve(&net).unwrap();
    }

    #[test]
    fn bad_query_variables_are_rejected() {
        let net = weather_umbrella();
        let mut q = Query::new("bad").queried(["Nope"]);
        assert!(matches!(q.solve(&net), Err(BayesError::UnknownVariable(_))));
        let mut q = Query::new("dup").queried(["Weather", "Weather"]);
        assert!(matches!(q.solve(&net), Err(BayesError::DuplicateVariable(_))));
    }

    #[test]
    fn observed_query_variable_is_one_hot() {
        let mut net = weather_umbrella();
        net.observe("Weather", "Sunny").unwrap();
        let mut q = Query::new("w").queried(["Weather", "Umbrella"]).observed(["Weather"]);
        q.solve(&net).unwrap();
        assert_eq!(q.distribution("Weather").unwrap().values(), &[1.0, 0.0]);
        let joint = q.joint().unwrap();
        assert_eq!(joint.vars(), &[net.id("Umbrella").unwrap()]);
        assert!(q.ordering().unwrap().evidence().contains(&net.id("Weather").unwrap()));
    }

    #[test]
    fn approx_tracks_exact() {
        let mut net = weather_umbrella();
        net.observe("Umbrella", "Yes").unwrap();
        let mut q = Query::new("weather").queried(["Weather"]).observed(["Umbrella"]);
        let config = SamplerConfig::default().with_iterations(20_000).with_seed(11);
        q.approx(&net, &config).unwrap();
        assert!(q.is_approximate());
        let rainy = q.distribution("Weather").unwrap().value("Rainy").unwrap();
        assert!((rainy - 0.24 / 0.31).abs() < 0.03);
        assert_eq!(q.eliminations(), 0);
    }
}
