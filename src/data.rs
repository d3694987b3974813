/// data.rs — AlphaVantage daily-bar client and return-series wrangling
///
/// The provider's `TIME_SERIES_DAILY` payload keys each bar by date string
/// and each field by a numbered name ("1. open", "4. close", ...). This
/// module normalises that shape into `PriceBar` rows sorted ascending by
/// date, and derives the percentage-return series the GARCH model consumes:
///
///   r_i = (close_i − close_{i−1}) / close_{i−1} × 100
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{EngineError, Result};

/// One calendar day's OHLCV record for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Percentage returns derived from consecutive closes, plus the final
/// observed bar date (used to key forecasts by forward business days).
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    pub values: Vec<f64>,
    pub last_date: NaiveDate,
}

/// Compute percentage returns over a window of ascending price bars.
///
/// The earliest bar has no defined return and is dropped, so the output
/// length is `bars.len() - 1`. Fewer than 2 bars cannot yield a single
/// return and fail with `InsufficientData`.
pub fn percentage_returns(bars: &[PriceBar]) -> Result<ReturnSeries> {
    if bars.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "need at least 2 price bars to compute returns, got {}",
            bars.len()
        )));
    }
    let values = bars
        .windows(2)
        .map(|w| (w[1].close - w[0].close) / w[0].close * 100.0)
        .collect();
    Ok(ReturnSeries {
        values,
        last_date: bars[bars.len() - 1].date,
    })
}

/// Client for the AlphaVantage daily time-series endpoint.
pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: String,
    output_size: String,
}

impl AlphaVantageClient {
    pub fn new(base_url: &str, api_key: &str, output_size: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            output_size: output_size.to_owned(),
        }
    }

    /// Fetch the daily price history for `ticker`, ascending by date.
    ///
    /// Non-success HTTP status and unexpected payload shape are both
    /// surfaced as `DataFetch` — never an empty result.
    pub async fn fetch_daily(&self, ticker: &str) -> Result<Vec<PriceBar>> {
        let url = format!(
            "{}/query?function=TIME_SERIES_DAILY&symbol={}&outputsize={}&apikey={}",
            self.base_url, ticker, self.output_size, self.api_key
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::DataFetch(format!(
                "API request for '{ticker}' failed with status {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EngineError::DataFetch(format!("invalid JSON body: {e}")))?;

        let bars = parse_daily_payload(&payload)?;
        info!(ticker, bars = bars.len(), "fetched daily history");
        Ok(bars)
    }
}

/// Normalise an AlphaVantage `TIME_SERIES_DAILY` payload into ascending
/// `PriceBar` rows. A payload without the time-series key (rate-limit
/// notes, error messages) fails with `DataFetch` carrying the body.
pub fn parse_daily_payload(payload: &Value) -> Result<Vec<PriceBar>> {
    let series = payload
        .get("Time Series (Daily)")
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::DataFetch(format!("unexpected API response: {payload}")))?;

    let mut bars = Vec::with_capacity(series.len());
    for (date_str, fields) in series {
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| EngineError::DataFetch(format!("bad date key '{date_str}': {e}")))?;
        bars.push(PriceBar {
            date,
            open: numeric_field(fields, "1. open")?,
            high: numeric_field(fields, "2. high")?,
            low: numeric_field(fields, "3. low")?,
            close: numeric_field(fields, "4. close")?,
            volume: numeric_field(fields, "5. volume")?,
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn numeric_field(fields: &Value, key: &str) -> Result<f64> {
    let raw = fields
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::DataFetch(format!("missing field '{key}' in daily bar")))?;
    raw.parse::<f64>()
        .map_err(|e| EngineError::DataFetch(format!("non-numeric field '{key}' = '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bar(date: &str, close: f64) -> PriceBar {
        PriceBar {
            date: date.parse().unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn returns_are_percentage_changes() {
        let bars = vec![
            bar("2024-01-02", 100.0),
            bar("2024-01-03", 110.0),
            bar("2024-01-04", 99.0),
        ];
        let series = percentage_returns(&bars).unwrap();
        assert_eq!(series.values.len(), 2);
        assert!((series.values[0] - 10.0).abs() < 1e-12);
        assert!((series.values[1] - (-10.0)).abs() < 1e-12);
        assert_eq!(series.last_date, "2024-01-04".parse().unwrap());
    }

    #[test]
    fn two_bars_yield_one_return() {
        let bars = vec![bar("2024-01-02", 100.0), bar("2024-01-03", 101.0)];
        let series = percentage_returns(&bars).unwrap();
        assert_eq!(series.values.len(), 1);
    }

    #[test]
    fn one_bar_is_insufficient() {
        let bars = vec![bar("2024-01-02", 100.0)];
        assert!(matches!(
            percentage_returns(&bars),
            Err(EngineError::InsufficientData(_))
        ));
        assert!(matches!(
            percentage_returns(&[]),
            Err(EngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn parse_daily_payload_ascending() {
        let payload = json!({
            "Time Series (Daily)": {
                "2024-01-03": {
                    "1. open": "101.0", "2. high": "103.0", "3. low": "100.0",
                    "4. close": "102.0", "5. volume": "120000"
                },
                "2024-01-02": {
                    "1. open": "100.0", "2. high": "101.0", "3. low": "99.0",
                    "4. close": "100.5", "5. volume": "100000"
                }
            }
        });
        let bars = parse_daily_payload(&payload).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].date < bars[1].date);
        assert!((bars[1].close - 102.0).abs() < 1e-12);
        assert!((bars[0].volume - 100000.0).abs() < 1e-12);
    }

    #[test]
    fn missing_series_key_is_fetch_error() {
        let payload = json!({ "Note": "API call frequency exceeded" });
        let err = parse_daily_payload(&payload).unwrap_err();
        assert!(matches!(err, EngineError::DataFetch(_)));
        assert!(err.to_string().contains("unexpected API response"));
    }

    #[test]
    fn malformed_field_is_fetch_error() {
        let payload = json!({
            "Time Series (Daily)": {
                "2024-01-02": { "1. open": "100.0", "2. high": "101.0",
                                "3. low": "99.0", "5. volume": "100000" }
            }
        });
        assert!(matches!(
            parse_daily_payload(&payload),
            Err(EngineError::DataFetch(_))
        ));
    }
}
