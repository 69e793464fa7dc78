//! webhook-cert-operator: TLS certificate lifecycle for a mutating admission
//! webhook
//!
//! This crate keeps a self-signed CA, the webhook's serving certificate, the
//! Secret that stores both, and the webhook configuration's `caBundle`
//! consistent and unexpired.

pub mod config;
pub mod controller;
pub mod error;
pub mod pki;

pub use crate::error::{Error, Result};
