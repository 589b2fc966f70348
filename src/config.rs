use std::env;
use std::str::FromStr;
use std::time::Duration;
use dotenv::dotenv;
use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub slack_bot_token: String,
    pub slack_app_token: String,
    pub slack_channel_id: String,
    pub slack_api_url: String,
    pub alerts_file: String,
    pub check_interval: Duration,
    pub quote_currency: String,
    pub price_api_url: String,
    pub coingecko_api_url: String,
    pub quickchart_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let check_interval_secs: u64 = parse_var("CHECK_INTERVAL_SECS", 10)?;
        if check_interval_secs == 0 {
            bail!("CHECK_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            slack_bot_token: env::var("SLACK_AUTH_TOKEN").context("SLACK_AUTH_TOKEN must be set")?,
            slack_app_token: env::var("SLACK_APP_TOKEN").context("SLACK_APP_TOKEN must be set")?,
            slack_channel_id: env::var("SLACK_CHANNEL_ID").context("SLACK_CHANNEL_ID must be set")?,
            slack_api_url: env::var("SLACK_API_URL").unwrap_or_else(|_| "https://slack.com/api".to_string()),
            alerts_file: env::var("ALERTS_FILE").unwrap_or_else(|_| "alarms.txt".to_string()),
            check_interval: Duration::from_secs(check_interval_secs),
            quote_currency: env::var("QUOTE_CURRENCY").unwrap_or_else(|_| "USD".to_string()).to_uppercase(),
            price_api_url: env::var("PRICE_API_URL").unwrap_or_else(|_| "https://cex.io/api".to_string()),
            coingecko_api_url: env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            quickchart_url: env::var("QUICKCHART_URL").unwrap_or_else(|_| "https://quickchart.io".to_string()),
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}
