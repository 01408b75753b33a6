//! Auth-domain identifiers, scopes, token records, and pending PKCE authorizations.

pub mod id;
pub mod pending;
pub mod scope;
pub mod token;

pub use id::*;
pub use pending::*;
pub use scope::*;
pub use token::{record::*, secret::*};
