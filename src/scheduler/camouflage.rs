//! Probabilistic innocuous browsing between workflow steps.
//!
//! Actions run on a detached view that is closed afterwards, so the primary
//! view is never touched. Failures are logged and swallowed.

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use super::DelayRange;
use crate::automation::selectors::{COMMENT_BUTTON, CONVERSATION, FEED_URL, MESSAGING_URL};
use crate::automation::{ClickMode, PageSurface, Result, ScrollTarget};

/// Conversations eligible for a random pick.
const CONVERSATION_CHOICES: usize = 5;

/// One innocuous interaction.
#[async_trait]
pub trait CamouflageAction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, page: &dyn PageSurface, pause: DelayRange) -> Result<()>;
}

/// Open the feed and the comments of the first post.
pub struct FeedComments;

#[async_trait]
impl CamouflageAction for FeedComments {
    fn name(&self) -> &'static str {
        "feed comments"
    }

    async fn run(&self, page: &dyn PageSurface, pause: DelayRange) -> Result<()> {
        page.visit(FEED_URL).await?;
        pause.pause().await;
        if let Some(button) = page.find_first(COMMENT_BUTTON).await? {
            button.click(ClickMode::Normal).await?;
            pause.pause().await;
        }
        Ok(())
    }
}

/// Open messaging, scroll the list and open a recent conversation.
pub struct MessagesConversation;

#[async_trait]
impl CamouflageAction for MessagesConversation {
    fn name(&self) -> &'static str {
        "messaging"
    }

    async fn run(&self, page: &dyn PageSurface, pause: DelayRange) -> Result<()> {
        page.visit(MESSAGING_URL).await?;
        pause.pause().await;

        let amount = rand::rng().random_range(200..=500);
        page.scroll(ScrollTarget::By(amount)).await?;
        pause.pause().await;

        let conversations = page.find(CONVERSATION).await?;
        let eligible = conversations.len().min(CONVERSATION_CHOICES);
        if eligible > 0 {
            let pick = rand::rng().random_range(0..eligible);
            conversations[pick].click(ClickMode::Normal).await?;
            pause.pause().await;
        }
        Ok(())
    }
}

/// Decides whether to run a camouflage action and runs it.
pub struct Camouflage {
    probability: f64,
    pause: DelayRange,
    actions: Vec<Box<dyn CamouflageAction>>,
}

impl Camouflage {
    /// The standard action set.
    pub fn new(probability: f64, pause: DelayRange) -> Self {
        Self::with_actions(
            probability,
            pause,
            vec![Box::new(FeedComments), Box::new(MessagesConversation)],
        )
    }

    pub fn with_actions(
        probability: f64,
        pause: DelayRange,
        actions: Vec<Box<dyn CamouflageAction>>,
    ) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            pause,
            actions,
        }
    }

    /// Never runs.
    pub fn disabled() -> Self {
        Self::with_actions(0.0, DelayRange::ZERO, Vec::new())
    }

    /// With the configured probability, run one action on a detached view.
    /// Returns the name of the action that was attempted.
    pub async fn maybe_run(&self, page: &dyn PageSurface) -> Option<&'static str> {
        if self.actions.is_empty() {
            return None;
        }

        // Keep the ThreadRng out of the await chain.
        let index = {
            let mut rng = rand::rng();
            if !rng.random_bool(self.probability) {
                return None;
            }
            rng.random_range(0..self.actions.len())
        };
        let action = &self.actions[index];
        info!("Performing camouflage action: {}", action.name());

        let view = match page.open_detached().await {
            Ok(view) => view,
            Err(e) => {
                debug!("Could not open a view for camouflage: {}", e);
                return Some(action.name());
            }
        };

        if let Err(e) = action.run(view.as_ref(), self.pause).await {
            debug!("Camouflage action {} failed: {}", action.name(), e);
        }
        if let Err(e) = view.close().await {
            debug!("Could not close camouflage view: {}", e);
        }
        Some(action.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::scripted::{ClickEffect, FakeElement, FakePage, ScriptedPage};

    fn site() -> ScriptedPage {
        ScriptedPage::new()
            .with_page(
                FEED_URL,
                FakePage::new().element(
                    FakeElement::new(r#"button[aria-label="Comment"]"#).on_click(
                        ClickEffect::Insert(vec![FakeElement::new("div.comments")]),
                    ),
                ),
            )
            .with_page(
                MESSAGING_URL,
                FakePage::new()
                    .element(FakeElement::new(r#"div[role="option"]"#).text("Ann"))
                    .element(FakeElement::new(r#"div[role="option"]"#).text("Ben")),
            )
    }

    #[tokio::test]
    async fn test_zero_probability_never_runs() {
        let page = site();
        let camouflage = Camouflage::new(0.0, DelayRange::ZERO);
        for _ in 0..20 {
            assert_eq!(camouflage.maybe_run(&page).await, None);
        }
        assert_eq!(page.detached_opened(), 0);
    }

    #[tokio::test]
    async fn test_runs_on_detached_view_and_closes_it() {
        let page = site();
        let camouflage = Camouflage::new(1.0, DelayRange::ZERO);

        let ran = camouflage.maybe_run(&page).await;

        assert!(ran.is_some());
        assert_eq!(page.detached_opened(), 1);
        assert_eq!(page.views_closed(), 1);
        assert_eq!(page.open_views(), 1);
        // Primary view untouched.
        assert!(page.navigations().is_empty());
        assert!(page.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_failing_action_is_swallowed() {
        let page = ScriptedPage::new().with_page(FEED_URL, FakePage::new().status(500));
        let camouflage =
            Camouflage::with_actions(1.0, DelayRange::ZERO, vec![Box::new(FeedComments)]);

        assert_eq!(camouflage.maybe_run(&page).await, Some("feed comments"));
        assert_eq!(page.open_views(), 1);
    }

    #[tokio::test]
    async fn test_messaging_opens_a_conversation() {
        let page = site();
        let view = page.open_detached().await.unwrap();
        MessagesConversation
            .run(view.as_ref(), DelayRange::ZERO)
            .await
            .unwrap();

        let actions = page.actions();
        assert!(actions.iter().any(|a| matches!(
            a,
            crate::automation::scripted::Action::Click { selector, .. }
                if selector == r#"div[role="option"]"#
        )));
    }
}
