//! Identifier normalization and per-page profile extraction.

use tracing::debug;
use url::Url;

use crate::automation::selectors::{
    BASE_URL, PROFILE_LINK, PROFILE_PATH_MARKER, RESULT_LOCATION, RESULT_NAME, SEARCH_RESULT,
};
use crate::automation::{Element, PageSurface};
use crate::error::AutomationError;
use crate::models::DiscoveredProfile;

/// Location recorded when a result card has none.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Canonical form of a profile link: absolute, without query or fragment.
///
/// Returns `None` for anything that is not a profile link.
pub fn normalize_profile_url(href: &str) -> Option<String> {
    let href = href.trim();
    if !href.contains(PROFILE_PATH_MARKER) {
        return None;
    }

    let mut url = if href.starts_with('/') {
        Url::parse(BASE_URL).ok()?.join(href).ok()?
    } else if href.starts_with("http") {
        Url::parse(href).ok()?
    } else {
        return None;
    };

    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Display name from a result's name text: first line, without the
/// "• 1st" style degree marker.
pub fn clean_profile_name(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    first_line
        .split('•')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Extract the primary profile of every result card on the current page.
///
/// A card can link to several profiles (e.g. mutual connections); only its
/// first profile link is the result itself. Entries are not deduplicated.
pub async fn extract_profiles(
    page: &dyn PageSurface,
) -> Result<Vec<DiscoveredProfile>, AutomationError> {
    let cards = page.find(SEARCH_RESULT).await?;
    let mut profiles = Vec::with_capacity(cards.len());

    for card in cards {
        match extract_card(card.as_ref()).await {
            Ok(Some(profile)) => profiles.push(profile),
            Ok(None) => debug!("Result card without a profile link"),
            Err(e) => debug!("Error processing result card: {}", e),
        }
    }

    Ok(profiles)
}

async fn extract_card(card: &dyn Element) -> Result<Option<DiscoveredProfile>, AutomationError> {
    let mut primary = None;
    for link in card.find_within(PROFILE_LINK).await? {
        let Some(href) = link.attribute("href").await? else {
            continue;
        };
        if let Some(url) = normalize_profile_url(&href) {
            primary = Some((link, url));
            break;
        }
    }
    let Some((link, url)) = primary else {
        return Ok(None);
    };

    let raw_name = match link.find_within(RESULT_NAME).await?.into_iter().next() {
        Some(name) => name.text().await?,
        None => link.text().await?,
    };

    let location = match card.find_within(RESULT_LOCATION).await?.into_iter().next() {
        Some(element) => element.text().await?.trim().to_string(),
        None => String::new(),
    };
    let location = if location.is_empty() {
        UNKNOWN_LOCATION.to_string()
    } else {
        location
    };

    Ok(Some(DiscoveredProfile::new(
        clean_profile_name(&raw_name),
        url,
        location,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative_and_absolute() {
        assert_eq!(
            normalize_profile_url("/in/alice?miniProfileUrn=abc").as_deref(),
            Some("https://www.linkedin.com/in/alice")
        );
        assert_eq!(
            normalize_profile_url("https://www.linkedin.com/in/bob/?trk=x#top").as_deref(),
            Some("https://www.linkedin.com/in/bob/")
        );
    }

    #[test]
    fn test_normalize_rejects_non_profiles() {
        assert_eq!(normalize_profile_url(""), None);
        assert_eq!(normalize_profile_url("/company/acme"), None);
        assert_eq!(normalize_profile_url("in/alice"), None);
        assert_eq!(normalize_profile_url("javascript:void('/in/x')"), None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_profile_url("/in/carol?x=1").unwrap();
        assert_eq!(normalize_profile_url(&once).as_deref(), Some(once.as_str()));
    }

    #[test]
    fn test_clean_profile_name() {
        assert_eq!(clean_profile_name("Alice Smith • 1st\nEngineer"), "Alice Smith");
        assert_eq!(clean_profile_name("  Bob  "), "Bob");
        assert_eq!(clean_profile_name(""), "");
    }
}
