//! # votifier-client
//!
//! Client library for votifier.
//!
//! This crate provides:
//! - Async TCP client that performs the greeting exchange
//! - Vote encryption with the receiver's public key
//! - Connect and I/O timeouts

pub mod client;
pub mod error;

pub use client::{ClientConfig, SendReceipt, VoteClient};
pub use error::ClientError;
