//! Connector state: the registered identity, its serialized form, and the
//! two stores it is kept in.
//!
//! - **state**: [`ConnectorState`] and [`SerializedState`]
//! - **codec**: conversion between the two, in the companion agent's formats
//! - **persistence**: the [`Persistence`] trait with filesystem and Secret
//!   backends

#![deny(missing_docs)]

pub mod codec;
pub mod persistence;
pub mod state;

pub use persistence::{
    registration_key_path, FileSystemPersistence, KubeSecretStore, Persistence,
    SecretPersistence, SecretStore,
};
pub use state::{ConnectorState, SerializedState, StateKey};
