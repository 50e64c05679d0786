//! OAuth token broker for the Meta platform.
//!
//! Exchanges authorization codes, introspects tokens for implicitly shared
//! resources, and memoizes per-token request signing proofs.

pub mod broker;
pub mod error;
pub mod flow;
pub mod proof;
pub mod types;

pub use {
    broker::TokenBroker,
    error::{AuthorizationReason, Error, Result},
    flow::{AuthorizationFlow, AuthorizationRequest, CallbackParams},
    proof::{SigningProofCache, signing_proof},
    types::{Credential, GrantedScope, TokenInspection, serialize_secret},
};
