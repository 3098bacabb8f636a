//! Crawl output records.

use serde::{Deserialize, Serialize};

/// A profile discovered on a search results page.
///
/// Identity is the canonical URL; the record becomes an [`super::Entity`]
/// only once it is loaded into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredProfile {
    pub name: String,
    pub url: String,
    pub location: String,
}

impl DiscoveredProfile {
    pub fn new(name: impl Into<String>, url: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            location: location.into(),
        }
    }
}
