//! Bearer credential models.

pub mod record;
pub mod secret;
