//! Request authorization gateway for S3-compatible proxies
//!
//! `s3s-gate` sits in front of an S3-compatible backend and decides, per request, whether the
//! request may proceed. It is a generic [hyper](https://github.com/hyperium/hyper) and
//! [tower](https://github.com/tower-rs/tower) service.
//!
//! # Architecture
//!
//! ```text
//!  request ──► operation lookup ──► access requirement
//!                                     │
//!                 Public ◄────────────┴────────────► SigV4(service)
//!                   │                                  │
//!                   │                       identity resolver
//!                   │                                  │
//!                   │                         request parser
//!                   │                                  │
//!                   │                 provider.facade_for(..).decide(action)
//!                   │                                  │
//!                   │                   Success ◄──────┴──────► Failure
//!                   ▼                      ▼                       ▼
//!               operation             operation              denial response
//! ```
//!
//! # Modules
//!
//! - [`access`]: Access requirements and the registry that declares them
//! - [`auth`]: Identity resolution for SigV4 operations
//! - [`request`]: Parsing requests into bucket, key and action
//! - [`security`]: Security facades, including the OPA-backed provider
//! - [`outcome`]: Mapping a deny verdict to a client response
//! - [`ops`]: Operations and the authorization pipeline
//! - [`service`]: The service and its builder
//! - [`config`]: Startup configuration
//!
//! # Security
//!
//! The gateway trusts its [`IdentityResolver`](auth::IdentityResolver) to verify signatures.
//! [`SimpleIdentityResolver`](auth::SimpleIdentityResolver) does not, and is only meant for
//! tests and local development.

#![allow(
    clippy::multiple_crate_versions, // Sometimes not fixable
    clippy::module_name_repetitions,
    clippy::single_match_else,
)]

#[macro_use]
mod error;

pub use self::error::*;

pub mod access;
pub mod auth;
pub mod config;
pub mod ops;
pub mod outcome;
pub mod request;
pub mod security;
pub mod service;
