use crate::catalog::{AssetSymbol, SymbolCatalog};
use crate::types::{ChartCreateRequest, ChartCreateResponse, MarketChartResponse};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Months, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use tracing::debug;
use url::Url;

const MAX_POINTS: usize = 250;
const DATE_FORMAT: &str = "%d-%m-%Y";

/// Time window of a chart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartRange {
    Day,
    Month,
    Year,
    Between(NaiveDate, NaiveDate),
}

impl ChartRange {
    /// `24h`, `30d`, `1y`, or two `DD-MM-YYYY` dates.
    pub fn parse(args: &[&str]) -> Result<Self> {
        match args {
            [preset] => match preset.to_ascii_lowercase().as_str() {
                "24h" => Ok(ChartRange::Day),
                "30d" => Ok(ChartRange::Month),
                "1y" => Ok(ChartRange::Year),
                other => bail!("Unknown range {:?}, use 24h, 30d or 1y", other),
            },
            [from, to] => {
                let from = NaiveDate::parse_from_str(from, DATE_FORMAT)
                    .with_context(|| format!("Invalid date {:?}, expected DD-MM-YYYY", from))?;
                let to = NaiveDate::parse_from_str(to, DATE_FORMAT)
                    .with_context(|| format!("Invalid date {:?}, expected DD-MM-YYYY", to))?;
                Ok(ChartRange::Between(from, to))
            }
            _ => bail!("Please give a range (24h, 30d, 1y) or two dates"),
        }
    }

    pub fn bounds(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (from, to) = match *self {
            ChartRange::Day => (now - Duration::days(1), now),
            ChartRange::Month => (
                now.checked_sub_months(Months::new(1)).ok_or_else(|| anyhow!("Date out of range"))?,
                now,
            ),
            ChartRange::Year => (
                now.checked_sub_months(Months::new(12)).ok_or_else(|| anyhow!("Date out of range"))?,
                now,
            ),
            ChartRange::Between(from, to) => (start_of_day(from)?, start_of_day(to)?),
        };
        if from >= to {
            bail!("Date range is not valid");
        }
        Ok((from, to))
    }
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("Invalid date"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Renders price history charts through QuickChart.
pub struct ChartService {
    client: Client,
    market_url: String,
    chart_url: String,
}

impl ChartService {
    pub fn new(market_url: &str, chart_url: &str) -> Self {
        Self {
            client: Client::new(),
            market_url: market_url.trim_end_matches('/').to_string(),
            chart_url: chart_url.trim_end_matches('/').to_string(),
        }
    }

    /// Short URL of a line chart for `asset` over `range`.
    pub async fn chart_url(&self, asset: &AssetSymbol, quote: &str, range: ChartRange) -> Result<String> {
        let name = SymbolCatalog::full_name(asset)
            .ok_or_else(|| anyhow!("I don't support that crypto ID or it doesn't exist (yet)"))?;
        let (from, to) = range.bounds(Utc::now())?;

        let url = self.history_url(name, quote, from, to)?;
        let history: MarketChartResponse = self
            .client
            .get(url)
            .send()
            .await
            .context("Market history request failed")?
            .error_for_status()
            .context("Market history request rejected")?
            .json()
            .await
            .context("Malformed market history response")?;
        debug!("{} history points for {}", history.prices.len(), name);

        let config = build_chart_config(name, &history.prices)?;
        self.create_chart(config).await
    }

    fn history_url(&self, name: &str, quote: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Url> {
        let mut url = Url::parse(&self.market_url).context("Invalid COINGECKO_API_URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("COINGECKO_API_URL cannot be a base URL"))?
            .extend(["coins", name, "market_chart", "range"]);
        url.query_pairs_mut()
            .append_pair("vs_currency", &quote.to_ascii_lowercase())
            .append_pair("from", &from.timestamp().to_string())
            .append_pair("to", &to.timestamp().to_string());
        Ok(url)
    }

    async fn create_chart(&self, config: String) -> Result<String> {
        let body = ChartCreateRequest {
            width: 800,
            height: 600,
            device_pixel_ratio: 1.0,
            format: "png".to_string(),
            background_color: "#ffffff".to_string(),
            chart: config,
        };

        let resp: ChartCreateResponse = self
            .client
            .post(format!("{}/chart/create", self.chart_url))
            .json(&body)
            .send()
            .await
            .context("Chart request failed")?
            .error_for_status()
            .context("Chart request rejected")?
            .json()
            .await
            .context("Malformed chart response")?;

        if resp.success == Some(false) || resp.url.is_empty() {
            bail!("Chart service did not return a URL");
        }
        Ok(resp.url)
    }
}

/// Chart.js line config, sampled down to at most `MAX_POINTS` points.
fn build_chart_config(label: &str, prices: &[[f64; 2]]) -> Result<String> {
    if prices.is_empty() {
        bail!("No price history for that date range");
    }
    let stride = prices.len().div_ceil(MAX_POINTS);

    let mut labels = Vec::new();
    let mut values = Vec::new();
    for [ts_ms, price] in prices.iter().step_by(stride) {
        let at = Utc
            .timestamp_millis_opt(*ts_ms as i64)
            .single()
            .ok_or_else(|| anyhow!("Invalid timestamp {}", ts_ms))?;
        labels.push(format!("'{}'", at.format("%-d %b %Y %H:%M:%S")));
        values.push(format!("'{:.3}'", price));
    }

    Ok(format!(
        "{{type:'line',data:{{labels:[{}],datasets:[{{label:'{}',data:[{}]}}]}}}}",
        labels.join(","),
        label,
        values.join(",")
    ))
}
