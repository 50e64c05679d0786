//! Client plumbing for the Meta Graph API.
//!
//! Covers the versioned REST client, positional batch correlation, inbound
//! webhook signature verification, and the webhook envelope types.

pub mod batch;
pub mod client;
pub mod error;
pub mod event;
pub mod signed_request;
pub mod webhook;

pub use {
    batch::{
        BATCH_LIMIT, BatchKind, BatchOperation, BatchOutcome, BatchResult, Header, ItemError, Method,
    },
    client::{Deadline, GraphClient, GraphEndpoint, RequestSigner, appsecret_proof},
    error::{Error, GraphError, Result},
    webhook::{SignatureError, VerifiedReader},
};
