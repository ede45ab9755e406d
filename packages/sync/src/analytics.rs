//! Analytics collaborator interface
//!
//! Graph analytics run outside the core. The store hands the current
//! element and link arrays to an [`Analytics`] implementation and keeps the
//! last report so selection and insights panels can read it.

use serde::{Deserialize, Serialize};
use sleuth_model::{Element, Link};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    /// Cluster membership, one list of element ids per cluster
    #[serde(default)]
    pub clusters: Vec<Vec<String>>,

    /// Degree-centrality ranking, highest first
    #[serde(default)]
    pub centrality: Vec<CentralityScore>,

    /// Elements whose removal disconnects the graph
    #[serde(default)]
    pub bridges: Vec<String>,
    #[serde(default)]
    pub isolated: Vec<String>,
    #[serde(default)]
    pub similar_labels: Vec<(String, String)>,
    #[serde(default)]
    pub paths: Vec<PathResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralityScore {
    pub element_id: String,
    pub degree: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub from_id: String,
    pub to_id: String,
    pub element_ids: Vec<String>,
    pub link_ids: Vec<String>,
}

impl AnalyticsReport {
    pub fn cluster_of(&self, element_id: &str) -> Option<usize> {
        self.clusters
            .iter()
            .position(|cluster| cluster.iter().any(|id| id == element_id))
    }

    pub fn is_isolated(&self, element_id: &str) -> bool {
        self.isolated.iter().any(|id| id == element_id)
    }

    pub fn is_bridge(&self, element_id: &str) -> bool {
        self.bridges.iter().any(|id| id == element_id)
    }
}

pub trait Analytics {
    fn analyze(&self, elements: &[Element], links: &[Link]) -> AnalyticsReport;
}
