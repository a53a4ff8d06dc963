//! Results table reveal and podium

use crate::data::ResultEntry;

/// One row of a results table during a live reveal
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    /// Placeholder keeping the row's slot while it is still masked
    Obscured { position: u32 },
    Revealed {
        position: u32,
        title: String,
        authors: String,
        score: f64,
        /// The row unmasked by the latest reveal step
        just_revealed: bool,
    },
}

impl ResultRow {
    pub fn position(&self) -> u32 {
        match self {
            Self::Obscured { position } | Self::Revealed { position, .. } => *position,
        }
    }

    pub fn is_revealed(&self) -> bool {
        matches!(self, Self::Revealed { .. })
    }
}

/// Top-three entry for the podium
#[derive(Debug, Clone, PartialEq)]
pub struct PodiumPlace {
    pub position: u32,
    pub title: String,
    pub authors: String,
    pub score: f64,
}

fn by_position(results: &[ResultEntry]) -> Vec<&ResultEntry> {
    let mut ranked: Vec<&ResultEntry> = results.iter().collect();
    ranked.sort_by_key(|r| r.position);
    ranked
}

/// Build the rows of a results table with `revealed` rows unmasked.
///
/// Reveal proceeds from last place toward first: with `k` revealed, exactly
/// the bottom `k` ranks are shown and every other row is an obscured
/// placeholder. One row is returned per result regardless of `revealed`.
pub fn reveal_rows(results: &[ResultEntry], revealed: u32) -> Vec<ResultRow> {
    let ranked = by_position(results);
    let total = ranked.len();
    let revealed = (revealed as usize).min(total);
    let first_revealed = total - revealed;

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            if i < first_revealed {
                ResultRow::Obscured {
                    position: entry.position,
                }
            } else {
                ResultRow::Revealed {
                    position: entry.position,
                    title: entry.production.title.clone(),
                    authors: entry.production.authors.clone(),
                    score: entry.score,
                    just_revealed: i == first_revealed,
                }
            }
        })
        .collect()
}

/// Number of placeholders still masked
pub fn obscured_count(rows: &[ResultRow]) -> usize {
    rows.iter().filter(|r| !r.is_revealed()).count()
}

/// Top three places in rank order
pub fn podium(results: &[ResultEntry]) -> Vec<PodiumPlace> {
    by_position(results)
        .into_iter()
        .filter(|r| (1..=3).contains(&r.position))
        .take(3)
        .map(|r| PodiumPlace {
            position: r.position,
            title: r.production.title.clone(),
            authors: r.production.authors.clone(),
            score: r.score,
        })
        .collect()
}
