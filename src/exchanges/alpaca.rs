//! Alpaca REST venue

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::config::{KEY_ID_HEADER, SECRET_KEY_HEADER};
use crate::core::{
    CloseAmount, CloseResult, Credentials, Error, OrderAck, OrderRequest, PositionSnapshot,
    Result, Symbol, Venue,
};

/// Alpaca trading API adapter (paper or live, chosen by base URL)
pub struct Alpaca {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    symbol: String,
    qty: Value,
}

#[derive(Debug, Deserialize)]
struct WireCloseResult {
    symbol: String,
    status: u16,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    body: Value,
}

fn parse_qty(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl Alpaca {
    pub fn new(base_url: impl Into<String>, credentials: &Credentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&credentials.key_id)
            .map_err(|e| Error::Config(format!("invalid key id: {}", e)))?;
        let mut secret = HeaderValue::from_str(&credentials.secret_key)
            .map_err(|e| Error::Config(format!("invalid secret key: {}", e)))?;
        secret.set_sensitive(true);
        headers.insert(KEY_ID_HEADER, key);
        headers.insert(SECRET_KEY_HEADER, secret);

        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            name: "alpaca".to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    /// Request body for `POST /v2/orders`. Always limit + IOC.
    fn order_body(order: &OrderRequest) -> Value {
        json!({
            "symbol": order.symbol.as_str(),
            "qty": order.quantity,
            "side": order.side.as_str(),
            "type": "limit",
            "limit_price": order.price,
            "time_in_force": "ioc",
            "client_order_id": order.client_order_id,
        })
    }

    async fn rejection(resp: reqwest::Response) -> Error {
        let status = resp.status().as_u16();
        let reason = resp.text().await.unwrap_or_default();
        Error::VenueRejection { status, reason }
    }

    fn snapshot_rows(rows: Vec<WirePosition>) -> Vec<PositionSnapshot> {
        rows.into_iter()
            .filter_map(|row| match parse_qty(&row.qty) {
                Some(quantity) => Some(PositionSnapshot {
                    symbol: Symbol::new(row.symbol),
                    quantity,
                }),
                None => {
                    warn!("Skipping position {} with unreadable qty {}", row.symbol, row.qty);
                    None
                }
            })
            .collect()
    }

    fn close_results(rows: Vec<WireCloseResult>) -> Vec<CloseResult> {
        rows.into_iter()
            .map(|row| {
                let order_id = row.id.or_else(|| {
                    row.body
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                });
                CloseResult {
                    symbol: Symbol::new(row.symbol),
                    status: row.status,
                    order_id,
                    body: row.body,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Venue for Alpaca {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let body = Self::order_body(order);
        debug!("POST orders {}", body);
        let resp = self.client.post(self.url("orders")).json(&body).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(Self::rejection(resp).await);
        }
        Ok(resp.json::<OrderAck>().await?)
    }

    async fn fetch_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<PositionSnapshot>> {
        let path = match symbol {
            Some(s) => format!("positions/{}", s),
            None => "positions".to_string(),
        };
        let resp = self.client.get(self.url(&path)).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(Self::rejection(resp).await);
        }
        let rows = match symbol {
            Some(_) => vec![resp.json::<WirePosition>().await?],
            None => resp.json::<Vec<WirePosition>>().await?,
        };
        Ok(Self::snapshot_rows(rows))
    }

    async fn close_position(&self, symbol: &Symbol, amount: CloseAmount) -> Result<Value> {
        let query = match amount {
            CloseAmount::Qty(q) => [("qty", q.to_string())],
            CloseAmount::Percentage(p) => [("percentage", p.to_string())],
        };
        let resp = self
            .client
            .delete(self.url(&format!("positions/{}", symbol)))
            .query(&query)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(Self::rejection(resp).await);
        }
        Ok(resp.json::<Value>().await?)
    }

    async fn close_all_positions(&self, cancel_orders: bool) -> Result<Vec<CloseResult>> {
        let resp = self
            .client
            .delete(self.url("positions"))
            .query(&[("cancel_orders", cancel_orders)])
            .send()
            .await?;
        match resp.status() {
            StatusCode::MULTI_STATUS | StatusCode::OK => {
                let rows = resp.json::<Vec<WireCloseResult>>().await?;
                Ok(Self::close_results(rows))
            }
            _ => Err(Self::rejection(resp).await),
        }
    }
}
