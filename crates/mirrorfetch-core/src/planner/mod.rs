//! Link planning: turn a flat list of mirror URLs into a grouped download plan.
//!
//! The plan maps file base → part number → host → URL. All levels are ordered maps,
//! so iteration order ("plan order") depends only on content, never on input order.

mod filename;
mod part;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::host_policy::host_of;

pub use filename::{filename_from_url, split_part_marker};
pub use part::PartDescriptor;

/// Mirror URLs for one part, keyed by lowercase host.
pub type HostLinks = BTreeMap<String, String>;

/// Parts of one file base, keyed by 1-based part number.
pub type PartLinks = BTreeMap<u32, HostLinks>;

/// Grouped download plan: file base → part → host → URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupedLinks(BTreeMap<String, PartLinks>);

impl GroupedLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one link. When (file base, part, host) is already present the
    /// lexicographically smaller URL is kept, so insertion order never matters.
    pub fn insert(&mut self, file_base: &str, part: u32, host: &str, url: &str) {
        let hosts = self
            .0
            .entry(file_base.to_string())
            .or_default()
            .entry(part)
            .or_default();
        match hosts.get_mut(host) {
            Some(existing) if existing.as_str() <= url => {}
            Some(existing) => *existing = url.to_string(),
            None => {
                hosts.insert(host.to_string(), url.to_string());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// File bases in plan order with their parts.
    pub fn files(&self) -> impl Iterator<Item = (&str, &PartLinks)> {
        self.0.iter().map(|(base, parts)| (base.as_str(), parts))
    }

    /// Highest part number seen for `file_base`; this is the file's part count.
    pub fn max_part(&self, file_base: &str) -> Option<u32> {
        self.0.get(file_base)?.keys().next_back().copied()
    }

    /// Sum of every file's part count (gaps included, since they are attempted too).
    pub fn total_parts(&self) -> u32 {
        self.0
            .values()
            .filter_map(|parts| parts.keys().next_back().copied())
            .sum()
    }

    /// Host → URL map for one part, if the plan has it.
    pub fn links_for(&self, file_base: &str, part: u32) -> Option<&HostLinks> {
        self.0.get(file_base)?.get(&part)
    }

    /// Every host that appears anywhere in the plan, sorted.
    pub fn hosts(&self) -> BTreeSet<&str> {
        self.0
            .values()
            .flat_map(|parts| parts.values())
            .flat_map(|hosts| hosts.keys().map(String::as_str))
            .collect()
    }
}

impl FromIterator<(String, PartLinks)> for GroupedLinks {
    fn from_iter<I: IntoIterator<Item = (String, PartLinks)>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|(_, parts)| !parts.is_empty()).collect())
    }
}

/// Builds the plan from scraped mirror URLs.
///
/// Unparseable URLs, URLs without a host and URLs without a filename segment are
/// skipped. Blank entries are ignored.
pub fn plan_links<I, S>(urls: I) -> GroupedLinks
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut plan = GroupedLinks::new();
    for raw in urls {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        let parsed = match url::Url::parse(raw) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!(url = raw, "skipping unparseable link: {}", e);
                continue;
            }
        };
        let Some(host) = host_of(&parsed) else {
            tracing::debug!(url = raw, "skipping link without host");
            continue;
        };
        let Some(filename) = filename_from_url(&parsed) else {
            tracing::debug!(url = raw, "skipping link without filename");
            continue;
        };
        let (file_base, part) = split_part_marker(&filename);
        plan.insert(&file_base, part, &host, raw);
    }
    plan
}
