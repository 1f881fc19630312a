//! `tradedesk-auth`: permission checks consumed as a capability oracle.
//!
//! This crate is intentionally decoupled from HTTP and storage: the session
//! layer resolves who the actor is, and domain code only asks yes/no
//! questions through [`CapabilityOracle`].

pub mod authorize;
pub mod capability;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError, Principal};
pub use capability::{Capability, CapabilityOracle, CapabilitySet};
pub use permissions::Permission;
pub use principal::{Membership, PrincipalId};
pub use roles::Role;
