use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

/// Body of `POST /open_orders`
#[derive(Debug, Default, Deserialize)]
struct OpenOrders {
    #[serde(default)]
    orders: Vec<Value>,
}

/// Client for the backend's order endpoints. Rows are passed through
/// untouched; only the renderer looks inside them.
#[derive(Debug, Clone)]
pub struct OrdersClient {
    base_url: String,
    http: reqwest::Client,
}

impl OrdersClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every currently open order
    pub async fn open_orders(&self) -> Result<Vec<Value>> {
        let url = format!("{}/open_orders", self.base_url);
        let response = self.http.post(&url).send().await?.error_for_status()?;
        let body: Value = response.json().await?;
        Ok(parse_orders(body))
    }
}

/// Pull the order rows out of a response body. Anything not shaped like
/// `{"orders": [..]}` yields no rows.
pub fn parse_orders(body: Value) -> Vec<Value> {
    serde_json::from_value::<OpenOrders>(body)
        .map(|o| o.orders)
        .unwrap_or_default()
}
