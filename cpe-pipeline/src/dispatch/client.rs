//! Prediction service client

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::EndpointAddr;
use crate::models::{PredictionRequest, PredictionResponse};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("prediction service answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// One long-lived connection to a prediction endpoint
pub trait PredictionClient: Send + Sync + 'static {
    fn endpoint(&self) -> &EndpointAddr;

    fn predict(
        &self,
        request: &PredictionRequest,
    ) -> impl Future<Output = Result<PredictionResponse, PredictError>> + Send;
}

/// JSON over HTTP: `POST http://{host}:{port}/predict`
pub struct HttpPredictionClient {
    endpoint: EndpointAddr,
    url: String,
    http: reqwest::Client,
}

impl HttpPredictionClient {
    pub fn new(endpoint: EndpointAddr) -> Result<Self, PredictError> {
        let http = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            url: format!("http://{}/predict", endpoint),
            endpoint,
            http,
        })
    }
}

impl PredictionClient for HttpPredictionClient {
    fn endpoint(&self) -> &EndpointAddr {
        &self.endpoint
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictError> {
        let response = self.http.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
