//! WASM bindings for bayes-engine — powers the interactive web demo.

use wasm_bindgen::prelude::*;

use bayes_engine::core::network::Network;
use bayes_engine::core::query::Query;
use bayes_engine::core::sampler::SamplerConfig;
use bayes_engine::schema::distribution::Distribution;
use bayes_engine::schema::network_def::NetworkDef;

// ---------------------------------------------------------------------------
// Embedded network data — compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const BURGLAR_ALARM: &str = include_str!("../../tests/fixtures/alarm.ron");
    pub const WEATHER: &str = include_str!("../../tests/fixtures/weather.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
struct QueryInput {
    queried: Vec<String>,
    /// Defaults to every node currently observed.
    observed: Option<Vec<String>>,
}

#[derive(serde::Serialize)]
struct NodeInfo {
    name: String,
    states: Vec<String>,
    parents: Vec<String>,
    observed: Option<String>,
}

#[derive(serde::Serialize)]
struct Posteriors<'a> {
    method: &'static str,
    eliminations: usize,
    results: Vec<&'a Distribution>,
}

// ---------------------------------------------------------------------------
// BayesNetDemo — the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct BayesNetDemo {
    network: Network,
    query: Query,
}

#[wasm_bindgen]
impl BayesNetDemo {
    /// Create a demo from a RON network description.
    #[wasm_bindgen(constructor)]
    pub fn new(ron: &str) -> Result<BayesNetDemo, JsError> {
        let def = NetworkDef::parse_ron(ron)
            .map_err(|e| JsError::new(&format!("Network parse error: {e}")))?;
        let network = def
            .build()
            .map_err(|e| JsError::new(&format!("Network build error: {e}")))?;
        Ok(BayesNetDemo {
            network,
            query: Query::new("demo"),
        })
    }

    /// Create a demo from one of the bundled networks.
    pub fn preset(name: &str) -> Result<BayesNetDemo, JsError> {
        match name {
            "burglar_alarm" => Self::new(data::BURGLAR_ALARM),
            "weather" => Self::new(data::WEATHER),
            _ => Err(JsError::new(&format!("Unknown preset: {name}"))),
        }
    }

    /// Return JSON array of bundled network identifiers.
    pub fn presets() -> String {
        serde_json::to_string(&["burglar_alarm", "weather"]).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn observe(&mut self, node: &str, state: &str) -> Result<(), JsError> {
        self.network
            .observe(node, state)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    pub fn unobserve(&mut self, node: &str) -> Result<(), JsError> {
        self.network
            .unobserve(node)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Return a JSON description of every node in topological order.
    pub fn nodes(&self) -> Result<String, JsError> {
        let mut infos = Vec::with_capacity(self.network.len());
        for node in self.network.nodes() {
            let mut parents = Vec::with_capacity(node.parents().len());
            for parent in node.parents() {
                let parent = self
                    .network
                    .node(*parent)
                    .map_err(|e| JsError::new(&e.to_string()))?;
                parents.push(parent.name().to_string());
            }
            infos.push(NodeInfo {
                name: node.name().to_string(),
                states: node.states().to_vec(),
                parents,
                observed: node.observed_state().map(|s| node.states()[s].clone()),
            });
        }
        serde_json::to_string(&infos)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Exact posteriors. Expected JSON shape:
    /// ```json
    /// { "queried": ["Burglary"], "observed": ["JohnCalls", "MaryCalls"] }
    /// ```
    pub fn solve(&mut self, query_json: &str) -> Result<String, JsError> {
        self.configure(query_json)?;
        self.query
            .solve(&self.network)
            .map_err(|e| JsError::new(&format!("Inference error: {e}")))?;
        self.posteriors("exact")
    }

    /// Gibbs-sampled posteriors for the same JSON shape as [`BayesNetDemo::solve`].
    pub fn approx(&mut self, query_json: &str, iterations: usize, seed: u64) -> Result<String, JsError> {
        self.configure(query_json)?;
        let config = SamplerConfig::default()
            .with_iterations(iterations)
            .with_seed(seed);
        self.query
            .approx(&self.network, &config)
            .map_err(|e| JsError::new(&format!("Sampling error: {e}")))?;
        self.posteriors("gibbs")
    }
}

impl BayesNetDemo {
    /// Update the held query, only touching lists that changed so the
    /// elimination cache survives repeated calls.
    fn configure(&mut self, query_json: &str) -> Result<(), JsError> {
        let input: QueryInput = serde_json::from_str(query_json)
            .map_err(|e| JsError::new(&format!("Invalid query JSON: {e}")))?;
        let observed = input.observed.unwrap_or_else(|| {
            self.network
                .nodes()
                .filter(|n| n.is_observed())
                .map(|n| n.name().to_string())
                .collect()
        });
        if self.query.queried_names() != input.queried.as_slice() {
            self.query.set_queried(input.queried);
        }
        if self.query.observed_names() != observed.as_slice() {
            self.query.set_observed(observed);
        }
        Ok(())
    }

    fn posteriors(&self, method: &'static str) -> Result<String, JsError> {
        let out = Posteriors {
            method,
            eliminations: self.query.eliminations(),
            results: self.query.results().collect(),
        };
        serde_json::to_string(&out)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }
}
