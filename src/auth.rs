//! Session credential models: bearer secrets, identity claims, and wire grants.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
