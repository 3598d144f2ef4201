//! Authentication helpers.
//!
//! - `token_manager`: coalesced, cached exchange of long-lived credentials for
//!   short-lived bearer tokens
//! - `service_account`: Google service-account JWT grant (feature `gcp`)

pub mod token_manager;

#[cfg(feature = "gcp")]
pub mod service_account;

pub use token_manager::{
    CachedToken, EXPIRY_SAFETY_WINDOW_SECS, TokenExchanger, TokenManager, fingerprint,
};

#[cfg(feature = "gcp")]
pub use service_account::{ServiceAccountCredentials, ServiceAccountExchanger};
