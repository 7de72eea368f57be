use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const MAX_ATTEMPTS: u32 = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Parsed structured output plus the bookkeeping the pipeline records.
#[derive(Debug, Clone)]
pub struct StructuredResponse<T> {
    pub output: T,
    pub model: String,
    pub total_tokens: Option<u64>,
}

pub struct ResponsesClient {
    http: Client,
    api_key: String,
    base: String,
}

impl ResponsesClient {
    pub fn new(api_key: String, base: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            api_key,
            base: base.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
        })
    }

    fn extract_structured_output<T: DeserializeOwned>(root: &Value) -> Option<T> {
        if let Some(parsed) = root
            .get("output_parsed")
            .and_then(|v| Self::parse_candidate::<T>(v))
        {
            return Some(parsed);
        }
        if let Some(parsed) = root
            .get("output_text")
            .and_then(|v| Self::parse_candidate::<T>(v))
        {
            return Some(parsed);
        }

        let items = root.get("output")?.as_array()?;
        for item in items {
            for key in ["parsed", "text"] {
                if let Some(parsed) = item.get(key).and_then(|v| Self::parse_candidate::<T>(v)) {
                    return Some(parsed);
                }
            }
            let Some(blocks) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for block in blocks {
                for key in ["parsed", "text"] {
                    if let Some(parsed) =
                        block.get(key).and_then(|v| Self::parse_candidate::<T>(v))
                    {
                        return Some(parsed);
                    }
                }
            }
        }
        None
    }

    fn parse_candidate<T: DeserializeOwned>(value: &Value) -> Option<T> {
        match value {
            Value::String(s) => serde_json::from_str::<T>(s)
                .or_else(|_| serde_json::from_value(Value::String(s.clone())))
                .ok(),
            Value::Array(items) => items
                .iter()
                .find_map(|item| Self::parse_candidate::<T>(item)),
            _ => serde_json::from_value(value.clone()).ok(),
        }
    }

    fn failure_detail(v: &Value) -> Option<&str> {
        v.get("error")
            .and_then(|e| e.get("message").and_then(|m| m.as_str()))
            .or_else(|| {
                v.get("last_error")
                    .and_then(|e| e.get("message").and_then(|m| m.as_str()))
            })
    }

    /// Polls a background response until it reaches a terminal status. The
    /// caller bounds the overall wait.
    async fn poll_response(&self, raw_response: Value, path: &str) -> anyhow::Result<Value> {
        let Some(id) = raw_response.get("id").and_then(|v| v.as_str()) else {
            anyhow::bail!("background response carried no id");
        };

        loop {
            let res = self
                .http
                .get(format!("{}/v1{}/{id}", self.base, path))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|err| anyhow::anyhow!("Network error | {err}"))?;

            if !res.status().is_success() {
                let status = res.status();
                let err_txt = res.text().await.unwrap_or_default();
                anyhow::bail!("LLM provider error {status} while polling: {err_txt}");
            }

            let v: Value = res
                .json()
                .await
                .with_context(|| format!("Error reading background response {id}"))?;
            match v.get("status").and_then(|v| v.as_str()) {
                Some("completed") => return Ok(v),
                Some(status @ ("failed" | "cancelled" | "incomplete")) => {
                    match Self::failure_detail(&v) {
                        Some(detail) => anyhow::bail!("background response {status} | {detail}"),
                        None => anyhow::bail!("background response {status}"),
                    }
                }
                other => debug!(response_id = id, status = ?other, "response still running"),
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Result<reqwest::Response> {
        self.http
            .post(format!("{}/v1{}", self.base, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }

    pub async fn responses_structured<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: Value,
        strict: bool,
    ) -> anyhow::Result<StructuredResponse<T>> {
        let response_format = json!({
            "type": "json_schema",
            "name": schema_name,
            "strict": strict,
            "schema": schema
        });

        let body = json!({
            "model": model,
            "input": [
                { "role": "system", "content": [{ "type": "input_text", "text": system }] },
                { "role": "user",   "content": [{ "type": "input_text", "text": user }] }
            ],
            "text": {"format": response_format},
            "background": true,
        });

        let mut delay = Duration::from_millis(300);
        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self.post_json("/responses", &body).await?;
            let status = resp.status();
            if status.is_success() {
                let v: Value = resp
                    .json()
                    .await
                    .context("Error reading responses api reply")?;
                let v = self
                    .poll_response(v, "/responses")
                    .await
                    .context("Error polling responses api")?;
                let Some(output) = Self::extract_structured_output::<T>(&v) else {
                    anyhow::bail!("Structured output not found in response");
                };
                return Ok(StructuredResponse {
                    output,
                    model: v
                        .get("model")
                        .and_then(Value::as_str)
                        .unwrap_or(model)
                        .to_string(),
                    total_tokens: v
                        .get("usage")
                        .and_then(|usage| usage.get("total_tokens"))
                        .and_then(Value::as_u64),
                });
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < MAX_ATTEMPTS {
                warn!(%status, attempt, "LLM provider busy, retrying");
                sleep(delay).await;
                delay = Duration::from_millis((delay.as_millis() as f64 * 1.8) as u64)
                    + Duration::from_millis(fastrand::u64(0..250));
                continue;
            }

            let err_txt = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM provider error {status}: {err_txt}");
        }
        anyhow::bail!("Retries exhausted")
    }
}
