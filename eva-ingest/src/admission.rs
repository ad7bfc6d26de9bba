//! Admission endpoint client
//!
//! Delivers envelopes to eva-api. Duplicates are a normal outcome, not an
//! error; the endpoint dedupes on `(source, platform_id)`.

use eva_common::api::{Envelope, IntakeResponse};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Admission rejected envelope ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Admission endpoint error {status}: {message}")]
    Server { status: u16, message: String },
}

/// Outcome of posting one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted(i64),
    Duplicate(i64),
}

pub struct AdmissionClient {
    http_client: reqwest::Client,
    api_url: String,
}

impl AdmissionClient {
    pub fn new(api_url: String) -> Result<Self, AdmissionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdmissionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Post one envelope. 4xx means this envelope is malformed (skip it);
    /// 5xx and transport errors mean the endpoint is unhealthy (caller
    /// decides whether to keep going).
    pub async fn post_envelope(&self, envelope: &Envelope) -> Result<Delivery, AdmissionError> {
        let response = self
            .http_client
            .post(&self.api_url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| AdmissionError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdmissionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdmissionError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let result: IntakeResponse = response
            .json()
            .await
            .map_err(|e| AdmissionError::Network(e.to_string()))?;

        if result.duplicate {
            Ok(Delivery::Duplicate(result.id))
        } else {
            Ok(Delivery::Accepted(result.id))
        }
    }
}
