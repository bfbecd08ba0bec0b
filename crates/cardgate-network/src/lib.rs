//! Delivery of scan events to the remote HTTP collector.
//!
//! # Components
//!
//! - **DeliveryClient**: one event, one POST per attempt, bounded fixed-delay
//!   retries
//! - **DeliveryPipeline**: runs deliveries concurrently and abandons them on
//!   shutdown
//!
//! # Wire Format
//!
//! ```text
//! POST <endpoint>
//! Content-Type: application/json
//! Authorization: Bearer <token>        (only when configured)
//!
//! {"id":"<uuid>","cardId":"000111111","deviceId":"gate-01","timestamp":"2025-05-10T12:46:06Z"}
//! ```

mod client;
mod error;
mod pipeline;

pub use client::{DeliveryClient, DeliveryConfig, DeliveryOutcome};
pub use error::{DeliveryError, Result};
pub use pipeline::DeliveryPipeline;
pub use reqwest::Url;
