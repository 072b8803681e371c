use serde::{Deserialize, Serialize};

use crate::core::error::BayesError;
use crate::core::network::Network;
use crate::core::query::{Query, QueryOptions};

/// One variable as written in a network file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub states: Vec<String>,
    /// Parent names, in the order their CPT dimensions appear.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Flat row-major CPT: own state outermost, then parents in order.
    /// Omitted means the one-hot default.
    #[serde(default)]
    pub cpt: Option<Vec<f64>>,
    #[serde(default)]
    pub observed: Option<String>,
}

/// A named query preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDef {
    pub name: String,
    #[serde(default)]
    pub queried: Vec<String>,
    #[serde(default)]
    pub observed: Vec<String>,
    #[serde(default)]
    pub priors: Vec<String>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl QueryDef {
    pub fn to_query(&self) -> Query {
        Query::new(self.name.clone())
            .queried(self.queried.iter().cloned())
            .observed(self.observed.iter().cloned())
            .priors(self.priors.iter().cloned())
            .with_options(self.options.clone())
    }
}

/// Serializable description of a whole network plus its query presets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDef {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub queries: Vec<QueryDef>,
}

impl NetworkDef {
    /// Load a network description from a RON file.
    pub fn load_from_ron(path: &std::path::Path) -> Result<Self, BayesError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(source: &str) -> Result<Self, BayesError> {
        Ok(ron::from_str(source)?)
    }

    pub fn to_ron(&self) -> Result<String, BayesError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| BayesError::Format(e.to_string()))
    }

    pub fn query(&self, name: &str) -> Option<&QueryDef> {
        self.queries.iter().find(|q| q.name == name)
    }

    /// Build the network: nodes first, then edges, then CPTs, then evidence,
    /// so parents may be listed after their children.
    pub fn build(&self) -> Result<Network, BayesError> {
        let mut network = Network::new();
        for node in &self.nodes {
            network.add_node(&node.name, node.states.iter().cloned())?;
        }
        for node in &self.nodes {
            for parent in &node.parents {
                network.add_parent(&node.name, parent)?;
            }
        }
        for node in &self.nodes {
            if let Some(cpt) = &node.cpt {
                network.set_prior(&node.name, cpt.clone())?;
            }
        }
        for node in &self.nodes {
            if let Some(state) = &node.observed {
                network.observe(&node.name, state)?;
            }
        }
        tracing::debug!(network = %self.name, nodes = network.len(), "built network");
        Ok(network)
    }

    /// Describe an existing network, nodes in topological order.
    pub fn from_network(name: impl Into<String>, network: &Network) -> Result<Self, BayesError> {
        let mut nodes = Vec::with_capacity(network.len());
        for node in network.nodes() {
            let mut parents = Vec::with_capacity(node.parents().len());
            for parent in node.parents() {
                parents.push(network.node(*parent)?.name().to_string());
            }
            nodes.push(NodeDef {
                name: node.name().to_string(),
                states: node.states().to_vec(),
                parents,
                cpt: Some(node.cpt().values().to_vec()),
                observed: node.observed_state().map(|s| node.states()[s].clone()),
            });
        }
        Ok(Self {
            name: name.into(),
            nodes,
            queries: Vec::new(),
        })
    }
}
