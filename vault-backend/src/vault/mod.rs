//! Integration credential vault: storage, masked projection and outbound dispatch

pub mod masking;
mod resolver;
mod store;

pub use resolver::{DispatchResolver, ProviderHandle};
pub use store::CredentialStore;
