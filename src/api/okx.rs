use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::num::NonZeroU32;
use tokio::time::{sleep, Duration};

use crate::api::ExchangeError;
use crate::config::ExchangeConfig;
use crate::models::{Bar, OrderIntent, OrderStatus, OrderType};
use crate::Result;

const INITIAL_BACKOFF_MS: u64 = 500;

type HmacSha256 = Hmac<Sha256>;

/// REST client for an OKX-style v5 exchange API
///
/// All calls are rate-limited and retried with exponential backoff up to the
/// configured attempt budget. Venue-level rejections (non-zero response code)
/// are returned immediately, not retried.
pub struct OkxClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    passphrase: String,
    retries: u32,
    limiter: DefaultDirectRateLimiter,
}

/// Point-in-time order state as reported by the venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub status: OrderStatus,
    pub avg_price: f64,
    pub filled_qty: f64,
    pub cost: f64,
    pub fee: f64,
}

#[derive(Debug, Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Value>,
}

impl OkxClient {
    pub fn new(cfg: &ExchangeConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let rps = NonZeroU32::new(cfg.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http: builder.build()?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
            passphrase: cfg.passphrase.clone(),
            retries: cfg.retries.max(1),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// Fetch up to `limit` most recent candles, returned oldest-first
    ///
    /// The venue reports newest-first and includes the still-open interval;
    /// callers drop the newest row when they need closed bars only.
    pub async fn candles(&self, inst_id: &str, bar: &str, limit: u32) -> Result<Vec<Bar>> {
        let path = format!(
            "/api/v5/market/candles?instId={}&bar={}&limit={}",
            inst_id, bar, limit
        );
        let data = self.get(&path, false).await?;

        let mut bars = data
            .iter()
            .map(|row| parse_candle(inst_id, row))
            .collect::<Result<Vec<Bar>>>()?;
        bars.reverse();
        Ok(bars)
    }

    /// Submit an order, returning the exchange order id
    pub async fn place_order(&self, intent: &OrderIntent) -> Result<String> {
        let ord_type = match intent.order_type {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        };

        let mut body = json!({
            "instId": intent.symbol,
            "tdMode": "cash",
            "clOrdId": intent.client_id.simple().to_string(),
            "side": intent.side.as_str(),
            "ordType": ord_type,
            "sz": format!("{}", intent.quantity),
            // Size market orders in base units on both sides
            "tgtCcy": "base_ccy",
        });
        if let Some(px) = intent.price_hint {
            if intent.order_type == OrderType::Limit {
                body["px"] = json!(format!("{}", px));
            }
        }

        let data = self.post("/api/v5/trade/order", &body).await?;
        let first = data.first().ok_or("empty order response")?;

        let s_code = first.get("sCode").and_then(Value::as_str).unwrap_or("0");
        if s_code != "0" {
            let s_msg = first.get("sMsg").and_then(Value::as_str).unwrap_or("");
            return Err(ExchangeError::OrderRejected {
                code: s_code.to_string(),
                msg: s_msg.to_string(),
            }
            .into());
        }

        first
            .get("ordId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "order response missing ordId".into())
    }

    /// Query the current state of an order
    pub async fn order_state(&self, inst_id: &str, ord_id: &str) -> Result<OrderSnapshot> {
        let path = format!(
            "/api/v5/trade/order?instId={}&ordId={}",
            inst_id, ord_id
        );
        let data = self.get(&path, true).await?;
        let first = data.first().ok_or("order not found")?;

        let state = first
            .get("state")
            .and_then(Value::as_str)
            .ok_or("order response missing state")?;

        let status = match state {
            "live" | "partially_filled" => OrderStatus::Accepted,
            "filled" => OrderStatus::Filled,
            "canceled" => OrderStatus::Canceled,
            other => return Err(ExchangeError::UnknownOrderState(other.to_string()).into()),
        };

        let avg_price = num_field(first, "avgPx");
        let filled_qty = num_field(first, "accFillSz");
        // Fees are reported as negative quote amounts
        let fee = num_field(first, "fee").abs();

        Ok(OrderSnapshot {
            status,
            avg_price,
            filled_qty,
            cost: avg_price * filled_qty,
            fee,
        })
    }

    /// (available, total) balance for one asset
    ///
    /// An asset the account has never held is an error, which callers treat
    /// as fatal rather than a zero balance.
    pub async fn wallet_balance(&self, asset: &str) -> Result<(f64, f64)> {
        let path = format!("/api/v5/account/balance?ccy={}", asset);
        let data = self.get(&path, true).await?;

        let details = data
            .first()
            .and_then(|d| d.get("details"))
            .and_then(Value::as_array)
            .ok_or("malformed balance response")?;

        let entry = details
            .iter()
            .find(|d| d.get("ccy").and_then(Value::as_str) == Some(asset))
            .ok_or_else(|| ExchangeError::UnfundedWallet(asset.to_string()))?;

        Ok((num_field(entry, "availBal"), num_field(entry, "eq")))
    }

    async fn get(&self, path_and_query: &str, auth: bool) -> Result<Vec<Value>> {
        self.request("GET", path_and_query, None, auth).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Vec<Value>> {
        self.request("POST", path, Some(body), true).await
    }

    async fn request(
        &self,
        method: &str,
        path_and_query: &str,
        body: Option<&Value>,
        auth: bool,
    ) -> Result<Vec<Value>> {
        let mut last_error = None;

        for attempt in 1..=self.retries {
            self.limiter.until_ready().await;

            match self.send_once(method, path_and_query, body, auth).await {
                Ok(resp) => {
                    if resp.code != "0" {
                        return Err(ExchangeError::Api {
                            code: resp.code,
                            msg: resp.msg,
                        }
                        .into());
                    }
                    if attempt > 1 {
                        tracing::info!(
                            "{} {} succeeded after {} attempts",
                            method,
                            path_and_query,
                            attempt
                        );
                    }
                    return Ok(resp.data);
                }
                Err(e) => {
                    last_error = Some(e);

                    if attempt < self.retries {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "attempt {}/{} failed for {} {}: {}. Retrying in {}ms...",
                            attempt,
                            self.retries,
                            method,
                            path_and_query,
                            last_error.as_ref().unwrap(),
                            backoff_ms
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "all retry attempts failed".into()))
    }

    async fn send_once(
        &self,
        method: &str,
        path_and_query: &str,
        body: Option<&Value>,
        auth: bool,
    ) -> Result<OkxResponse> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let body_str = body.map(Value::to_string).unwrap_or_default();

        let mut request = match method {
            "POST" => self.http.post(&url).body(body_str.clone()),
            _ => self.http.get(&url),
        };

        if auth {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
            let signature = self.sign(&timestamp, method, path_and_query, &body_str);

            request = request
                .header("OK-ACCESS-KEY", &self.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", &self.passphrase);
        }
        if body.is_some() {
            request = request.header("Content-Type", "application/json");
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<OkxResponse>().await?)
    }

    /// Base64 HMAC-SHA256 over `timestamp + method + path + body`
    fn sign(&self, timestamp: &str, method: &str, path_and_query: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path_and_query.as_bytes());
        mac.update(body.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

fn num_field(value: &Value, key: &str) -> f64 {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn parse_candle(symbol: &str, row: &Value) -> Result<Bar> {
    let text = |i: usize| -> Result<&str> {
        row.get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("malformed candle row: {}", row).into())
    };
    let num = |i: usize| -> Result<f64> { Ok(text(i)?.parse::<f64>()?) };

    let millis = text(0)?.parse::<i64>()?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or("candle timestamp out of range")?;

    Ok(Bar {
        symbol: symbol.to_string(),
        timestamp,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
    })
}
