use crate::catalog::AssetSymbol;
use crate::rule::{Direction, RuleRecord};
use crate::slack::SlackClient;
use crate::types::{Attachment, AttachmentField};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A rule that closed during a pass, with the price that closed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub owner: String,
    pub created_at: String,
    pub asset: AssetSymbol,
    pub threshold: f64,
    pub direction: Direction,
    pub price: f64,
}

impl Notification {
    pub fn from_rule(rule: &RuleRecord, price: f64) -> Self {
        Self {
            owner: rule.owner.clone(),
            created_at: rule.created_at.clone(),
            asset: rule.asset.clone(),
            threshold: rule.threshold,
            direction: rule.direction,
            price,
        }
    }

    pub fn to_attachment(&self, quote: &str) -> Attachment {
        let verb = match self.direction {
            Direction::Above => "risen above",
            Direction::Below => "fallen below",
        };
        Attachment {
            pretext: format!("<@{}> as you requested!", self.owner),
            text: format!(
                "{}: {} has {} {:.6} {} (now {} {})",
                self.direction.label(),
                self.asset,
                verb,
                self.threshold,
                quote,
                self.price,
                quote
            ),
            color: "#3aa030".to_string(),
            fields: vec![
                AttachmentField::new("Date", self.created_at.clone()),
                AttachmentField::new("Initializer", format!("<@{}>", self.owner)),
            ],
            image_url: None,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Posts alert notifications to a fixed Slack channel.
pub struct SlackNotifier {
    slack: Arc<SlackClient>,
    channel: String,
    quote: String,
}

impl SlackNotifier {
    pub fn new(slack: Arc<SlackClient>, channel: &str, quote: &str) -> Self {
        Self {
            slack,
            channel: channel.to_string(),
            quote: quote.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.slack
            .post_message(&self.channel, notification.to_attachment(&self.quote))
            .await
    }
}
