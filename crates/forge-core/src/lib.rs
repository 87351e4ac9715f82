pub mod admin;
pub mod backend;
pub mod cancel;
pub mod checkout;
pub mod config;
pub mod entitlements;
pub mod envcheck;
pub mod error;
pub mod gate;
pub mod io;
pub mod manager;
pub mod paths;
pub mod paywall;
pub mod plan;

pub use error::{ForgeError, Result};
