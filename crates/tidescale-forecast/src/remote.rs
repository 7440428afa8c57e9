//! Client for an external prediction service.
//!
//! Speaks the service's JSON protocol over plain HTTP/1.1:
//!
//! ```text
//! GET {base}/predict?target=cpu
//! → {"values": [0.41, 0.57, ...], "features": {"trend": 0.1}, "timestamp": "..."}
//! ```

use std::collections::HashMap;
use std::time::Duration;

use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ForecastError;

/// Response body of `/predict`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
    pub values: Vec<f64>,
    #[serde(default)]
    pub features: HashMap<String, f64>,
    #[serde(default)]
    pub timestamp: String,
}

impl PredictionResponse {
    /// Largest predicted value, 0 when the service returned none.
    pub fn peak(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// Forecaster backed by a remote prediction service.
#[derive(Debug, Clone)]
pub struct RemoteForecaster {
    /// `host:port` to connect to.
    authority: String,
    /// Path prefix from the base URL, without trailing slash.
    base_path: String,
    timeout: Duration,
}

impl RemoteForecaster {
    /// Create a client for `base_url` (e.g. `http://predictor:8000`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ForecastError> {
        let uri: http::Uri = base_url
            .parse()
            .map_err(|e| ForecastError::Remote(format!("invalid base url {base_url:?}: {e}")))?;

        if uri.scheme_str() != Some("http") {
            return Err(ForecastError::Remote(format!(
                "unsupported scheme in {base_url:?}, expected http"
            )));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| ForecastError::Remote(format!("missing host in {base_url:?}")))?;
        let authority = match authority.port_u16() {
            Some(_) => authority.to_string(),
            None => format!("{}:80", authority.host()),
        };

        Ok(Self {
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Fetch the forecast for `metric` (e.g. `"cpu"`, `"memory"`).
    pub async fn query(&self, metric: &str) -> Result<PredictionResponse, ForecastError> {
        let path = format!("{}/predict?target={metric}", self.base_path);

        tokio::time::timeout(self.timeout, self.get(&path))
            .await
            .map_err(|_| {
                ForecastError::Remote(format!("request timed out after {:?}", self.timeout))
            })?
    }

    /// Largest predicted value for `metric`.
    pub async fn peak(&self, metric: &str) -> Result<f64, ForecastError> {
        Ok(self.query(metric).await?.peak())
    }

    /// Forecast load ratio: the larger of the CPU and memory peaks, each
    /// relative to its per-pod threshold.
    pub async fn peak_load_ratio(
        &self,
        cpu_threshold: f64,
        mem_threshold: f64,
    ) -> Result<f64, ForecastError> {
        let cpu = self.peak("cpu").await?;
        let memory = self.peak("memory").await?;
        Ok((cpu / cpu_threshold).max(memory / mem_threshold))
    }

    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.authority, self.base_path)
    }

    async fn get(&self, path: &str) -> Result<PredictionResponse, ForecastError> {
        let remote = |e: &dyn std::fmt::Display| ForecastError::Remote(e.to_string());

        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| remote(&e))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| remote(&e))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", &self.authority)
            .header("accept", "application/json")
            .header("user-agent", "tidescale-forecast/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| remote(&e))?;

        let resp = sender.send_request(req).await.map_err(|e| remote(&e))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| remote(&e))?
            .to_bytes();

        if !status.is_success() {
            debug!(%status, path, "prediction service returned non-2xx");
            return Err(ForecastError::Remote(format!("unexpected status {status}")));
        }

        serde_json::from_slice(&body)
            .map_err(|e| ForecastError::Remote(format!("failed to decode response: {e}")))
    }
}
