//! Connector agent: registration, bootstrap and credential reconciliation
//!
//! - **keys**: RSA key pair and fingerprint generation
//! - **ssm**: [`RegistrationClient`] and its HTTP implementation
//! - **registration**: one registration against the activation service
//! - **initializer**: one-shot bootstrap run by the init container
//! - **sync**: [`Reconciler`] keeping the durable record current
//! - **watch**: the local-file watch that drives the reconciler

#![deny(missing_docs)]

pub mod initializer;
pub mod keys;
pub mod registration;
pub mod ssm;
pub mod sync;
pub mod watch;

#[cfg(test)]
mod testing;

pub use initializer::{InitOutcome, Initializer};
pub use registration::{Registration, SsmRegistration};
pub use ssm::{RegistrationClient, SsmClient};
pub use sync::{Reconciler, SyncOutcome};
