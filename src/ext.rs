//! Extension contracts for attaching credentials to outbound requests.

pub mod request_signer;

pub use request_signer::*;
