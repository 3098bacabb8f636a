//! Selector specs for the target site.
//!
//! Markup differs between rollout cohorts, so most controls carry several
//! alternatives, tried in order.

use super::{Selector, SelectorSpec};

pub const BASE_URL: &str = "https://www.linkedin.com";
pub const FEED_URL: &str = "https://www.linkedin.com/feed";
pub const MESSAGING_URL: &str = "https://www.linkedin.com/messaging";
/// First-degree people search, used when no search URL is configured.
pub const DEFAULT_SEARCH_URL: &str =
    "https://www.linkedin.com/search/results/people/?origin=FACETED_SEARCH&network=%5B%22F%22%5D";

/// Profile paths contain this segment.
pub const PROFILE_PATH_MARKER: &str = "/in/";

/// Views matching this stay open after a removal click.
pub const PROFILE_VIEW_PATTERN: &str = "linkedin.com/in/";

/// Profile overflow ("More") menu trigger. Present only for 1st-degree connections.
pub const MORE_BUTTON: SelectorSpec = &[
    Selector::with_text("main button.artdeco-dropdown__trigger", "More"),
    Selector::css("section.artdeco-card button.artdeco-dropdown__trigger"),
    Selector::with_text("div.ph5 button.artdeco-dropdown__trigger", "More"),
];

/// Overflow menu body once opened.
pub const DROPDOWN_CONTENT: SelectorSpec = &[Selector::css("div.artdeco-dropdown__content")];

/// Removal entry in the overflow menu, matched by its accessible label.
pub const REMOVE_CONNECTION: SelectorSpec = &[Selector::css(
    r#"div[role="button"][aria-label*="Remove your connection"]"#,
)];

/// Label the connect button must carry to count as "not connected".
pub const CONNECT_LABEL: &str = "Connect";

pub const CONNECT_BUTTON: SelectorSpec = &[Selector::with_text("button", CONNECT_LABEL)];

pub const NEXT_BUTTON: SelectorSpec = &[
    Selector::css(r#"button[aria-label*="Next"]"#),
    Selector::css(r#"button[aria-label*="next"]"#),
    Selector::with_text("button", "Next"),
];

/// One card per search result.
pub const SEARCH_RESULT: SelectorSpec =
    &[Selector::css(r#"div[data-view-name="people-search-result"]"#)];

pub const PROFILE_LINK: &str = r#"a[href*="/in/"]"#;

/// Name element inside a result card.
pub const RESULT_NAME: &str = r#"span[aria-hidden="true"]"#;

/// Location line inside a result card.
pub const RESULT_LOCATION: &str = "div.entity-result__secondary-subtitle";

/// Elements only rendered for an authenticated session.
pub const LOGGED_IN_INDICATORS: SelectorSpec = &[
    Selector::css(r#"nav[aria-label="Main navigation"]"#),
    Selector::css(r#"header[data-test-id="global-nav"]"#),
    Selector::css(r#"div[data-test-id="feed-container"]"#),
    Selector::css(r#"main[role="main"]"#),
];

/// URL fragments of the login flow.
pub const LOGIN_URL_MARKERS: &[&str] = &["linkedin.com/login", "linkedin.com/uas/login"];

/// URL fragments only reachable when logged in.
pub const AUTHENTICATED_URL_MARKERS: &[&str] =
    &["linkedin.com/feed", "linkedin.com/in/", "linkedin.com/search"];

pub const COMMENT_BUTTON: SelectorSpec = &[
    Selector::css(r#"button[aria-label="Comment"]"#),
    Selector::css(r#"button[aria-label*="Comment"]:not([aria-label*="comments"])"#),
];

pub const CONVERSATION: SelectorSpec = &[
    Selector::css(r#"div[role="option"]"#),
    Selector::css(r#"a[href*="/messaging/thread/"]"#),
];
