//! Prediction dispatch
//!
//! `dispatch` picks an endpoint, spawns the remote call and returns at once.
//! The call's outcome is handed to the callback pool as a job; the producing
//! path never waits on the network or on fan-out.

pub mod balancer;
pub mod client;
pub mod pool;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{FeatureVector, PredictionRequest, PredictionResult};

pub use balancer::RoundRobin;
pub use client::{HttpPredictionClient, PredictError, PredictionClient};
pub use pool::{CallbackError, CallbackHandle, CallbackJob, CallbackPool};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no prediction endpoints configured")]
    NoEndpoints,
}

/// Non-blocking hand-off of a feature vector; returns the selected endpoint index
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, features: FeatureVector) -> usize;
}

/// Consumer of successful predictions, run on the callback pool
pub trait ResultHandler: Send + Sync + 'static {
    fn handle(&self, result: PredictionResult) -> impl Future<Output = Result<(), CallbackError>> + Send;
}

pub struct PredictionDispatcher<C, H> {
    balancer: RoundRobin<Arc<C>>,
    callbacks: CallbackHandle,
    handler: Arc<H>,
}

impl<C: PredictionClient, H: ResultHandler> PredictionDispatcher<C, H> {
    pub fn new(clients: Vec<C>, callbacks: CallbackHandle, handler: Arc<H>) -> Result<Self, DispatchError> {
        let balancer = RoundRobin::new(clients.into_iter().map(Arc::new).collect())?;
        for client in balancer.targets() {
            tracing::info!(endpoint = %client.endpoint(), "prediction endpoint registered");
        }
        Ok(Self {
            balancer,
            callbacks,
            handler,
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.balancer.len()
    }
}

impl<C: PredictionClient, H: ResultHandler> Dispatch for PredictionDispatcher<C, H> {
    fn dispatch(&self, features: FeatureVector) -> usize {
        let (index, client) = self.balancer.next();
        let client = Arc::clone(client);
        let callbacks = self.callbacks.clone();
        let handler = Arc::clone(&self.handler);
        let request = PredictionRequest::from(&features);
        let device_id = features.device_id;

        tracing::debug!(device = %device_id, endpoint = %client.endpoint(), "dispatching feature vector");

        tokio::spawn(async move {
            let outcome = client.predict(&request).await;
            let endpoint = client.endpoint().to_string();

            let job: CallbackJob = Box::pin(async move {
                match outcome {
                    Ok(response) => {
                        let result = PredictionResult::new(device_id, response.has_packet_loss);
                        handler.handle(result).await
                    }
                    Err(e) => {
                        tracing::error!(endpoint = %endpoint, device = %device_id, error = %e, "prediction request failed");
                        Ok(())
                    }
                }
            });

            if callbacks.submit(job).await.is_err() {
                tracing::warn!(endpoint = %client.endpoint(), "callback pool closed, prediction outcome dropped");
            }
        });

        index
    }
}
