//! Dynamic content shown on slides (compos, results, sponsors, edition)

use serde::{Deserialize, Serialize};

use super::{EditionId, HasCompoId, ProductionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub id: ProductionId,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub authors: String,

    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoInfo {
    pub id: HasCompoId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub show_authors: bool,
}

/// Compo with its productions in running order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoData {
    pub compo: CompoInfo,

    #[serde(default)]
    pub productions: Vec<Production>,

    #[serde(default)]
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub production: Production,

    /// 1-based rank, 1 is the winner
    pub position: u32,

    #[serde(default)]
    pub score: f64,

    #[serde(default)]
    pub votes_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoResults {
    pub compo: CompoInfo,

    #[serde(default)]
    pub results: Vec<ResultEntry>,

    #[serde(default)]
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sponsor {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub logo: Option<String>,

    #[serde(default)]
    pub website: Option<String>,

    #[serde(default)]
    pub tier: Option<String>,

    #[serde(default)]
    pub display_order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditionInfo {
    pub id: EditionId,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub logo: Option<String>,

    #[serde(default)]
    pub poster: Option<String>,

    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub end_date: Option<String>,
}

/// Content fetched for the slide currently on screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageContent {
    pub compo: Option<CompoData>,
    pub results: Option<CompoResults>,
    pub sponsors: Vec<Sponsor>,
    pub edition: Option<EditionInfo>,
}

impl StageContent {
    pub fn productions(&self) -> &[Production] {
        self.compo
            .as_ref()
            .map(|c| c.productions.as_slice())
            .unwrap_or(&[])
    }

    pub fn results(&self) -> &[ResultEntry] {
        self.results
            .as_ref()
            .map(|r| r.results.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn production(id: ProductionId, title: &str) -> Production {
        Production {
            id,
            title: title.to_string(),
            authors: format!("group {}", id),
            video_url: None,
        }
    }

    pub fn compo(productions: Vec<Production>) -> CompoData {
        CompoData {
            compo: CompoInfo {
                id: 3,
                name: "PC Demo".to_string(),
                description: "64k and up".to_string(),
                show_authors: true,
            },
            total_count: productions.len(),
            productions,
        }
    }

    /// Results with descending scores, positions 1..=n
    pub fn results(titles: &[&str]) -> CompoResults {
        let results: Vec<ResultEntry> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| ResultEntry {
                production: production(i as u64 + 1, title),
                position: i as u32 + 1,
                score: (titles.len() - i) as f64 * 10.0,
                votes_count: 5,
            })
            .collect();
        CompoResults {
            compo: CompoInfo {
                id: 3,
                name: "PC Demo".to_string(),
                description: String::new(),
                show_authors: true,
            },
            total_count: results.len(),
            results,
        }
    }
}
