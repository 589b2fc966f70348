use crate::catalog::{AssetSymbol, SymbolCatalog};
use crate::chart::{ChartRange, ChartService};
use crate::price::PriceSource;
use crate::rule::{Direction, RuleRecord};
use crate::slack::SlackClient;
use crate::store::RuleStore;
use crate::types::{Attachment, AttachmentField, MentionEvent};
use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use tracing::{info, warn};

const RED: &str = "#ff0000";
const ORANGE: &str = "#ff8000";
const GREEN: &str = "#4af030";
const BLUE: &str = "#0000ff";

const HELP_TEXT: &str = "Available commands just for you
- @CryptoBot hello -> Greet me!
- @CryptoBot cryptoList -> Lists crypto names to show data or set rules
- @CryptoBot price any_crypto_name -> Gets the current price of the crypto (if it exists)
- @CryptoBot chart any_crypto_name DD-MM-YYYY DD-MM-YYYY -> Gets the historical market price within a range of dates
- @CryptoBot chart any_crypto_name 24h/30d/1y -> Gets the historical market price for the last 24 hours, 30 days or 1 year
- @CryptoBot setHigh any_crypto_name high_value -> Tells you when the crypto rises above that value
- @CryptoBot setLow any_crypto_name low_value -> Tells you when the crypto falls below that value
More to come!";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Hello,
    Help,
    CryptoList,
    Price { asset: Option<String> },
    Chart { args: Vec<String> },
    SetLimit { direction: Direction, args: Vec<String> },
    Unknown(String),
}

impl Command {
    /// Parses mention text such as `<@U0BOT> setHigh btc 50000`.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace().skip_while(|w| w.starts_with("<@"));
        let verb = match words.next() {
            Some(v) => v.to_ascii_lowercase(),
            None => return Command::Unknown(String::new()),
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        match verb.as_str() {
            "hello" => Command::Hello,
            "help" => Command::Help,
            "cryptolist" => Command::CryptoList,
            "price" => Command::Price {
                asset: args.into_iter().next(),
            },
            "chart" => Command::Chart { args },
            "sethigh" => Command::SetLimit {
                direction: Direction::Above,
                args,
            },
            "setlow" => Command::SetLimit {
                direction: Direction::Below,
                args,
            },
            _ => Command::Unknown(verb),
        }
    }
}

/// Maps inbound mentions to replies and, for `setHigh`/`setLow`, new rules.
pub struct CommandRouter {
    slack: Arc<SlackClient>,
    store: Arc<RuleStore>,
    prices: Arc<dyn PriceSource>,
    charts: ChartService,
    quote: String,
}

impl CommandRouter {
    pub fn new(
        slack: Arc<SlackClient>,
        store: Arc<RuleStore>,
        prices: Arc<dyn PriceSource>,
        charts: ChartService,
        quote: &str,
    ) -> Self {
        Self {
            slack,
            store,
            prices,
            charts,
            quote: quote.to_string(),
        }
    }

    /// Handles one mention end to end and posts the reply to its channel.
    pub async fn handle(&self, event: &MentionEvent) -> Result<()> {
        let date = now_string();
        let command = Command::parse(&event.text);
        info!(user = %event.user, channel = %event.channel, "Command {:?}", command);

        let fields = vec![
            AttachmentField::new("Date", date.clone()),
            AttachmentField::new("Initializer", format!("<@{}>", event.user)),
        ];

        let mut attachment = match command {
            Command::Hello => self.hello(&event.user).await,
            Command::Help => reply("Here is all I can do!", HELP_TEXT, BLUE),
            Command::CryptoList => crypto_list(),
            Command::Price { asset } => self.price(asset.as_deref()).await,
            Command::Chart { args } => self.chart(&args).await,
            Command::SetLimit { direction, args } => {
                self.set_limit(&event.user, &date, direction, &args).await
            }
            Command::Unknown(verb) => reply(
                "Command error",
                &format!("I don't know {:?}. Type help after tagging me to see what I can do!", verb),
                RED,
            ),
        };
        attachment.fields = fields;

        self.slack.post_message(&event.channel, attachment).await
    }

    async fn hello(&self, user: &str) -> Attachment {
        let name = match self.slack.user_name(user).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Could not look up user {}: {:#}", user, e);
                format!("<@{}>", user)
            }
        };
        reply("Greetings", &format!("Hello {}", name), GREEN)
    }

    async fn price(&self, asset: Option<&str>) -> Attachment {
        let Some(asset) = asset else {
            return sorry("You didn't enter any crypto id");
        };
        let Some(symbol) = SymbolCatalog::resolve(asset) else {
            return unsupported();
        };
        match self.prices.get_price(&symbol, &self.quote).await {
            Ok(price) => reply(
                "As you wanted",
                &format!("1 {} equals to {} {}", symbol, price, self.quote),
                ORANGE,
            ),
            Err(e) => {
                warn!("Price lookup for {} failed: {:#}", symbol, e);
                sorry("I couldn't get that price right now, please try again")
            }
        }
    }

    async fn chart(&self, args: &[String]) -> Attachment {
        let Some((asset, range_args)) = args.split_first() else {
            return reply("Command error", "Please try again", RED);
        };
        let Some(symbol) = SymbolCatalog::resolve(asset) else {
            return unsupported();
        };
        let range_args: Vec<&str> = range_args.iter().map(String::as_str).collect();
        let range = match ChartRange::parse(&range_args) {
            Ok(r) => r,
            Err(e) => return sorry(&e.to_string()),
        };

        match self.charts.chart_url(&symbol, &self.quote, range).await {
            Ok(url) => Attachment {
                image_url: Some(url),
                ..reply(
                    "As you wanted",
                    "Here is the historical market price for that date range",
                    BLUE,
                )
            },
            Err(e) => {
                warn!("Chart for {} failed: {:#}", symbol, e);
                sorry(&e.to_string())
            }
        }
    }

    async fn set_limit(&self, owner: &str, date: &str, direction: Direction, args: &[String]) -> Attachment {
        let [asset, value, ..] = args else {
            return reply("Command error", "Please try again", RED);
        };
        let Some(symbol) = SymbolCatalog::resolve(asset) else {
            return unsupported();
        };
        let threshold = match parse_threshold(value) {
            Ok(t) => t,
            Err(msg) => return reply("Try again!", msg, ORANGE),
        };

        match self.create_rule(owner, date, symbol, threshold, direction).await {
            Ok(()) => reply("Good work!", "I'll let you know when that happens", ORANGE),
            Err(e) => {
                warn!("Could not save rule for {}: {:#}", owner, e);
                sorry("Please try again")
            }
        }
    }

    async fn create_rule(
        &self,
        owner: &str,
        date: &str,
        asset: AssetSymbol,
        threshold: f64,
        direction: Direction,
    ) -> Result<()> {
        let rule = RuleRecord::new(owner, date, asset, threshold, direction)?;
        self.store.append(&rule).await?;
        info!(owner, asset = %rule.asset, threshold, %direction, "Rule created");
        Ok(())
    }
}

fn parse_threshold(value: &str) -> Result<f64, &'static str> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(_) => Err("That's not a valid value! It must be a positive number"),
        Err(_) => Err("That's not a number! Try something like 50000 or 0.25"),
    }
}

fn now_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn reply(pretext: &str, text: &str, color: &str) -> Attachment {
    Attachment {
        pretext: pretext.to_string(),
        text: text.to_string(),
        color: color.to_string(),
        ..Default::default()
    }
}

fn sorry(text: &str) -> Attachment {
    reply("I'm Sorry", text, RED)
}

fn unsupported() -> Attachment {
    sorry("I don't support that crypto ID or it doesn't exist (yet)")
}

fn crypto_list() -> Attachment {
    let mut text = String::from("Feel free to use either the full name or the abbreviation!");
    for (ticker, name) in SymbolCatalog::entries() {
        text.push_str(&format!("\n{} - {}", ticker, name));
    }
    reply("Here goes a list of cryptos you might be interested in", &text, BLUE)
}

/// Greeting posted once the bot is up.
pub fn startup_message() -> Attachment {
    Attachment {
        fields: vec![AttachmentField::new("Date", now_string())],
        ..reply(
            "Howdy!",
            "Hi! I'm on! Type help after tagging me to know what I can do!",
            GREEN,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbs_after_mention() {
        assert_eq!(Command::parse("<@U0BOT> hello"), Command::Hello);
        assert_eq!(Command::parse("<@U0BOT>   HELP"), Command::Help);
        assert_eq!(Command::parse("<@U0BOT> cryptoList"), Command::CryptoList);
        assert_eq!(
            Command::parse("<@U0BOT> price eth"),
            Command::Price {
                asset: Some("eth".into())
            }
        );
        assert_eq!(Command::parse("<@U0BOT> price"), Command::Price { asset: None });
        assert_eq!(
            Command::parse("<@U0BOT> chart btc 24h"),
            Command::Chart {
                args: vec!["btc".into(), "24h".into()]
            }
        );
    }

    #[test]
    fn set_limit_commands_map_to_directions() {
        assert_eq!(
            Command::parse("<@U0BOT> setHigh BTC 50000"),
            Command::SetLimit {
                direction: Direction::Above,
                args: vec!["BTC".into(), "50000".into()]
            }
        );
        assert_eq!(
            Command::parse("<@U0BOT> setlow sol 12.5"),
            Command::SetLimit {
                direction: Direction::Below,
                args: vec!["sol".into(), "12.5".into()]
            }
        );
    }

    #[test]
    fn unknown_and_empty_text() {
        assert_eq!(Command::parse("<@U0BOT> moon"), Command::Unknown("moon".into()));
        assert_eq!(Command::parse("<@U0BOT>"), Command::Unknown(String::new()));
    }

    #[test]
    fn threshold_must_be_positive_number() {
        assert_eq!(parse_threshold("50000"), Ok(50000.0));
        assert_eq!(parse_threshold("0.25"), Ok(0.25));
        assert!(parse_threshold("0").is_err());
        assert!(parse_threshold("-4").is_err());
        assert!(parse_threshold("inf").is_err());
        assert!(parse_threshold("lots").is_err());
    }

    fn router(dir: &tempfile::TempDir) -> (CommandRouter, Arc<RuleStore>) {
        let store = Arc::new(RuleStore::new(dir.path().join("alarms.txt")));
        let slack = Arc::new(SlackClient::new("http://127.0.0.1:9", "xoxb", "xapp"));
        let prices = Arc::new(crate::price::CexPriceSource::new("http://127.0.0.1:9"));
        let charts = ChartService::new("http://127.0.0.1:9", "http://127.0.0.1:9");
        (CommandRouter::new(slack, store.clone(), prices, charts, "USD"), store)
    }

    #[tokio::test]
    async fn set_high_appends_active_rule() {
        let dir = tempfile::TempDir::new().unwrap();
        let (router, store) = router(&dir);
        let args = vec!["bitcoin".to_string(), "50000".to_string()];

        let reply = router
            .set_limit("U061F7AUR", "2024-01-01 09:00:00", Direction::Above, &args)
            .await;
        assert_eq!(reply.pretext, "Good work!");

        let records = store.snapshot().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].asset.as_str(), "BTC");
        assert_eq!(records[0].owner, "U061F7AUR");
        assert!(records[0].is_active());
    }

    #[tokio::test]
    async fn invalid_set_limit_stores_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let (router, store) = router(&dir);

        let reply = router
            .set_limit("U1", "d", Direction::Below, &["doge".to_string(), "1".to_string()])
            .await;
        assert_eq!(reply.pretext, "I'm Sorry");
        let reply = router
            .set_limit("U1", "d", Direction::Below, &["eth".to_string(), "-1".to_string()])
            .await;
        assert_eq!(reply.pretext, "Try again!");
        let reply = router.set_limit("U1", "d", Direction::Below, &["eth".to_string()]).await;
        assert_eq!(reply.pretext, "Command error");

        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[test]
    fn crypto_list_mentions_every_asset() {
        let list = crypto_list();
        for (ticker, name) in SymbolCatalog::entries() {
            assert!(list.text.contains(&format!("{} - {}", ticker, name)));
        }
    }
}
