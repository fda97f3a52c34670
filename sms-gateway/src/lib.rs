//! SMS gateway client
//!
//! Thin client over the provider's Messages API. Network and protocol
//! failures never escape as errors — every outcome normalizes into a
//! [`SendResult`] so callers branch on one shape. Tenant-provided
//! credentials override the process defaults per call.

#![forbid(unsafe_code)]

pub mod client;
pub mod phone;
pub mod types;

pub use client::{GatewayClient, GatewayConfig};
pub use phone::normalize_phone;
pub use types::{Credentials, SendRequest, SendResult, SmsSender};
