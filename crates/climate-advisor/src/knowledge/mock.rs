//! Mock Knowledge Source
//!
//! For testing and demo purposes. Answers from a small static set of
//! agriculture summaries and can simulate outages.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::KnowledgeSource;
use crate::error::{AdvisorError, Result};
use crate::model::Summary;

/// Mock knowledge source with static summaries
pub struct MockKnowledgeSource {
    entries: Vec<Summary>,
    /// Transient failures left before lookups succeed
    failures_left: AtomicU32,
    always_fail: bool,
    calls: AtomicUsize,
}

impl Default for MockKnowledgeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKnowledgeSource {
    pub fn new() -> Self {
        Self::with_entries(default_entries())
    }

    pub fn with_entries(entries: Vec<Summary>) -> Self {
        Self {
            entries,
            failures_left: AtomicU32::new(0),
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` lookups with a transient error
    #[must_use]
    pub fn failing_times(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// A source whose every lookup fails with a transient error
    pub fn unreachable() -> Self {
        Self {
            always_fail: true,
            ..Self::new()
        }
    }

    /// Number of lookups received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn outage() -> AdvisorError {
        AdvisorError::Api {
            service: "Wikipedia",
            status: 503,
            body: "service unavailable".into(),
        }
    }
}

#[async_trait]
impl KnowledgeSource for MockKnowledgeSource {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<Summary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.always_fail {
            return Err(Self::outage());
        }
        let pending = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(Self::outage());
        }

        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();

        Ok(self
            .entries
            .iter()
            .filter(|e| {
                let title = e.title.to_lowercase();
                words.iter().any(|w| title.contains(w.as_str()))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "MockKnowledge"
    }
}

fn default_entries() -> Vec<Summary> {
    vec![
        Summary::new(
            "Photosynthesis",
            "Photosynthesis is a process used by plants and other organisms to convert light energy into chemical energy that is stored in sugars. Most plants use carbon dioxide and water and release oxygen as a by-product.",
        ),
        Summary::new(
            "Crop rotation",
            "Crop rotation is the practice of growing a series of different types of crops in the same area across a sequence of growing seasons. It reduces reliance on one set of nutrients, pest and weed pressure, and the probability of developing resistant pests.",
        ),
        Summary::new(
            "Drought tolerance",
            "Drought tolerance is the ability of a plant to maintain its biomass production during arid or drought conditions. Breeding and selection of tolerant varieties is a key adaptation to climate change.",
        ),
        Summary::new(
            "Agroforestry",
            "Agroforestry is a land use management system in which trees or shrubs are grown around or among crops or pastureland. It can improve soil fertility, reduce erosion and buffer crops against heat.",
        ),
    ]
}
