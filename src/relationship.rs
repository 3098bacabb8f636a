//! Relationship state machine: observe a profile's connection status and,
//! when connected, remove the connection.
//!
//! [`ConnectionRemover::process`] never fails. Every fault is folded into the
//! returned [`ProcessingResult`].

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::automation::selectors::{
    CONNECT_BUTTON, CONNECT_LABEL, DROPDOWN_CONTENT, MORE_BUTTON, PROFILE_VIEW_PATTERN,
    REMOVE_CONNECTION,
};
use crate::automation::{ClickMode, Element, PageSurface, SelectorSpec, WaitCondition};
use crate::config::Settings;
use crate::error::{AutomationError, ErrorKind};
use crate::models::ProcessingResult;
use crate::retry::RetryPolicy;
use crate::scheduler::DelayRange;

pub const MSG_ALREADY_NOT_CONNECTED: &str = "Already not connected";
pub const MSG_STATUS_UNDETERMINED: &str = "Could not determine connection status";
pub const MSG_REMOVE_OPTION_MISSING: &str = "Could not find 'Remove connection' option";
pub const MSG_DRY_RUN: &str =
    "[DRY RUN] Successfully found all selectors - would remove connection";
pub const MSG_REMOVED: &str = "Successfully removed";
pub const MSG_VERIFICATION_INCONCLUSIVE: &str = "Removal verification inconclusive";

/// Timing knobs for one pass of the state machine.
#[derive(Debug, Clone)]
pub struct RemovalSettings {
    /// Probe window for the status affordances.
    pub short_selector: Duration,
    /// Wait for the menu to open and for post-removal verification.
    pub verification: Duration,
    /// Pause after each interaction.
    pub action_delay: DelayRange,
    /// Applied to navigation.
    pub retry: RetryPolicy,
}

impl RemovalSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            short_selector: settings.timeouts.short_selector(),
            verification: settings.timeouts.verification(),
            action_delay: settings.pacing.action_delay.to_delay(),
            retry: settings.retry.policy(),
        }
    }
}

/// What the observation phase saw.
enum Observation {
    /// Carries the visible management menu trigger.
    Connected(Box<dyn Element>),
    NotConnected,
    Unknown,
}

/// Drives the removal workflow for one profile at a time.
#[derive(Debug, Clone)]
pub struct ConnectionRemover {
    settings: RemovalSettings,
}

impl ConnectionRemover {
    pub fn new(settings: RemovalSettings) -> Self {
        Self { settings }
    }

    /// Observe `url` and, if connected, remove (or in dry-run, rehearse removing)
    /// the connection.
    pub async fn process(
        &self,
        page: &dyn PageSurface,
        url: &str,
        dry_run: bool,
    ) -> ProcessingResult {
        let more_button = match self.observe(page, url).await {
            Ok(Observation::Connected(button)) => button,
            Ok(Observation::NotConnected) => {
                info!(url = %url, "Profile is not connected");
                return ProcessingResult::not_connected(MSG_ALREADY_NOT_CONNECTED);
            }
            Ok(Observation::Unknown) => {
                warn!(url = %url, "Connection status undetermined");
                return ProcessingResult::unknown(MSG_STATUS_UNDETERMINED);
            }
            Err(e) => return fault(url, e),
        };

        info!(url = %url, "Profile is connected");
        match self.remove(page, url, more_button.as_ref(), dry_run).await {
            Ok(result) => result,
            Err(e) => fault(url, e),
        }
    }

    async fn observe(
        &self,
        page: &dyn PageSurface,
        url: &str,
    ) -> Result<Observation, AutomationError> {
        let label = format!("navigation to {}", url);
        self.settings
            .retry
            .run(&label, ErrorKind::TRANSIENT, || page.visit(url))
            .await?;
        self.settings.action_delay.pause().await;

        if let Some(button) = self
            .visible_within(page, MORE_BUTTON, self.settings.short_selector)
            .await?
        {
            return Ok(Observation::Connected(button));
        }

        if let Some(connect) = self
            .visible_within(page, CONNECT_BUTTON, self.settings.short_selector)
            .await?
        {
            if connect.text().await?.contains(CONNECT_LABEL) {
                return Ok(Observation::NotConnected);
            }
        }

        Ok(Observation::Unknown)
    }

    async fn remove(
        &self,
        page: &dyn PageSurface,
        url: &str,
        more_button: &dyn Element,
        dry_run: bool,
    ) -> Result<ProcessingResult, AutomationError> {
        more_button.click(ClickMode::Normal).await?;
        if !page
            .wait_for(
                WaitCondition::Present(DROPDOWN_CONTENT),
                self.settings.verification,
            )
            .await?
        {
            debug!(url = %url, "Menu content did not appear");
        }
        self.settings.action_delay.pause().await;

        let Some(remove_option) = page.find_first(REMOVE_CONNECTION).await? else {
            warn!(url = %url, "Remove option not found in menu");
            page.press_escape().await?;
            self.settings.action_delay.pause().await;
            return Ok(ProcessingResult::connected(false, MSG_REMOVE_OPTION_MISSING));
        };

        if dry_run {
            page.press_escape().await?;
            info!(url = %url, "Dry run: removal option located");
            return Ok(ProcessingResult::connected(true, MSG_DRY_RUN));
        }

        remove_option.scroll_into_view().await?;
        if let Err(e) = remove_option.click(ClickMode::Normal).await {
            debug!(url = %url, "Click intercepted ({}), forcing", e);
            remove_option.click(ClickMode::Forced).await?;
        }

        self.settings.action_delay.pause().await;
        match page.close_extraneous_views(PROFILE_VIEW_PATTERN).await {
            Ok(0) => {}
            Ok(n) => debug!(url = %url, "Closed {} extraneous views", n),
            Err(e) => debug!(url = %url, "Could not close extraneous views: {}", e),
        }

        page.wait_for(
            WaitCondition::Hidden(MORE_BUTTON),
            self.settings.verification,
        )
        .await?;

        if let Some(connect) = self
            .visible_within(page, CONNECT_BUTTON, self.settings.verification)
            .await?
        {
            if connect.text().await?.contains(CONNECT_LABEL) {
                info!(url = %url, "Removal verified");
                return Ok(ProcessingResult::connected(true, MSG_REMOVED));
            }
        }

        if page.find_visible(MORE_BUTTON).await?.is_none() {
            info!(url = %url, "Removal verified (menu gone)");
            return Ok(ProcessingResult::connected(true, MSG_REMOVED));
        }

        warn!(url = %url, "Removal could not be verified");
        Ok(ProcessingResult::connected(
            false,
            MSG_VERIFICATION_INCONCLUSIVE,
        ))
    }

    async fn visible_within(
        &self,
        page: &dyn PageSurface,
        spec: SelectorSpec,
        timeout: Duration,
    ) -> Result<Option<Box<dyn Element>>, AutomationError> {
        if page.wait_for(WaitCondition::Visible(spec), timeout).await? {
            page.find_visible(spec).await
        } else {
            Ok(None)
        }
    }
}

fn fault(url: &str, e: AutomationError) -> ProcessingResult {
    debug!(url = %url, "Error processing connection removal: {}", e);
    ProcessingResult::unknown(format!("Error: {}", e)).with_rate_limit(e.is_rate_limit())
}
