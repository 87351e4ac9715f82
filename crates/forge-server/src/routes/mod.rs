pub mod admin;
pub mod checkout;
pub mod entitlements;
pub mod health;
pub mod paywall;
