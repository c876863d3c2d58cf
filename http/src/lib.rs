//! # Gophr HTTP
//!
//! [`Transport`](gophr_core::Transport) implementation over HTTP, speaking to
//! the site's JSON API (`/api/v0` by default).
//!
//! ## Example
//!
//! ```no_run
//! use gophr_http::HttpTransport;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::from_env()?.with_timeout(Duration::from_secs(10))?;
//! println!("calling {}", transport.base_url());
//! # Ok(())
//! # }
//! ```

/// The transport
pub mod client;

/// Error types
pub mod error;

pub use client::{HttpTransport, API_URL_VAR, DEFAULT_API_URL};
pub use error::ConfigError;
