//! Credential resolution and client construction for Cosmos DB accounts
//!
//! Turns an account endpoint plus a preferred authentication method into a
//! connected document-store client:
//!
//! 1. `CredentialResolver::resolve()` discovers usable credentials (account
//!    key via the management plane or a supplied key, federated identity,
//!    managed identity) and orders them by preference
//! 2. The resulting `CredentialSet` is bound to an endpoint as a `Connection`
//!    and optionally remembered in a `CredentialCache`
//! 3. `ClientFactory::build()` creates a client for the connection: key-based
//!    clients sign requests directly, identity-based clients get a
//!    `TokenProvider` that walks the credential set with a three-step fallback
//!    and shares the factory's `TokenCache`

pub mod client;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod keys;
pub mod probe;
pub mod resolver;
pub mod token;

pub use client::{ClientBuilder, ClientFactory};
pub use credentials::{AuthMethod, Connection, Credential, CredentialCache, CredentialSet};
pub use error::{Error, Result};
pub use identity::{AzureCliIdentity, IdentityProvider, IdentityProviders, ImdsIdentity, TokenRequest};
pub use keys::{ArmKeySource, KeySource, ManagedAccount};
pub use probe::{ConnectivityProbe, HttpConnectivityProbe, ProbeOutcome};
pub use resolver::{CredentialResolver, ResolveRequest};
pub use token::{TokenCache, TokenProvider, normalize_scope};
