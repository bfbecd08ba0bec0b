//! HTTP delivery of scan events to the collector.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager ──ScanEvent──► DeliveryPipeline ──spawn──► DeliveryClient::deliver
//!                                                                │
//!                                                   POST (JSON) ─┴─► Collector
//! ```
//!
//! # Retry Policy
//!
//! Each event gets up to `max_attempts` POSTs with a fixed `retry_delay`
//! between them. There is no exponential back-off, no dead-letter queue and
//! no persistence: after the last failed attempt the event is dropped and a
//! give-up is logged. Retry sequences of different events are independent.
//!
//! # Example
//!
//! ```no_run
//! use cardgate_network::{DeliveryClient, DeliveryConfig};
//!
//! # async fn example(event: cardgate_core::ScanEvent) -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeliveryConfig::new("https://collector.example.com/scans".parse()?)
//!     .with_auth_token("secret");
//! let client = DeliveryClient::new(config)?;
//!
//! let outcome = client.deliver(event).await;
//! println!("delivered: {}", outcome.is_delivered());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use cardgate_core::ScanEvent;
use cardgate_core::constants::{DEFAULT_SEND_RETRIES, DEFAULT_SEND_RETRY_DELAY_MS, DEFAULT_SEND_TIMEOUT_MS};
use reqwest::Url;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{DeliveryError, Result};

/// Configuration for the delivery client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Collector URL receiving the POSTs.
    pub endpoint: Url,

    /// Bearer token sent as `Authorization`, if any.
    pub auth_token: Option<String>,

    /// Total attempts per event, including the first.
    pub max_attempts: u32,

    /// Fixed wait between attempts.
    pub retry_delay: Duration,

    /// Upper bound on a single request.
    pub request_timeout: Duration,
}

impl DeliveryConfig {
    /// Configuration with default retry settings.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            auth_token: None,
            max_attempts: DEFAULT_SEND_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_SEND_RETRY_DELAY_MS),
            request_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Final result of delivering one event.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The collector accepted the event.
    Delivered { event_id: Uuid, attempts: u32 },

    /// Every attempt failed; the event was dropped.
    GaveUp {
        event_id: Uuid,
        attempts: u32,
        last_error: DeliveryError,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            Self::Delivered { event_id, .. } | Self::GaveUp { event_id, .. } => *event_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. } | Self::GaveUp { attempts, .. } => *attempts,
        }
    }
}

/// Posts scan events to the collector.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    config: DeliveryConfig,
}

impl DeliveryClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Client` if the TLS backend cannot be
    /// initialized.
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("cardgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Make a single POST attempt.
    ///
    /// # Errors
    ///
    /// Any non-2xx status or transport failure.
    pub async fn post(&self, event: &ScanEvent) -> Result<()> {
        let mut request = self.http.post(self.config.endpoint.clone()).json(event);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::from_request(e, self.config.request_timeout))?;

        let status = response.status();
        if status.is_success() {
            debug!(event_id = %event.id(), status = status.as_u16(), "Collector accepted event");
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }

    /// Deliver an event with bounded retries.
    ///
    /// Never fails: exhaustion is reported as [`DeliveryOutcome::GaveUp`]
    /// and the event is dropped with it.
    pub async fn deliver(&self, event: ScanEvent) -> DeliveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let event_id = event.id();
        let mut attempt = 1;

        loop {
            match self.post(&event).await {
                Ok(()) => {
                    info!(
                        event_id = %event_id,
                        card_id = %event.card_id(),
                        attempt,
                        "Scan delivered"
                    );
                    return DeliveryOutcome::Delivered {
                        event_id,
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= max_attempts => {
                    error!(
                        event_id = %event_id,
                        card_id = %event.card_id(),
                        attempts = attempt,
                        error = %e,
                        "Giving up on scan delivery, event dropped"
                    );
                    return DeliveryOutcome::GaveUp {
                        event_id,
                        attempts: attempt,
                        last_error: e,
                    };
                }
                Err(e) => {
                    warn!(
                        event_id = %event_id,
                        attempt,
                        max_attempts,
                        retry_in_ms = self.config.retry_delay.as_millis() as u64,
                        error = %e,
                        "Delivery attempt failed"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
