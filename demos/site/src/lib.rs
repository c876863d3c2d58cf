//! # Gophr Site
//!
//! The package site's client state, fed entirely by lifecycle events from the
//! dispatch pipeline.
//!
//! - [`SiteState`]: packages, search results, session, profile, tokens
//! - [`SiteReducer`]: routes events by tag via [`Intent::for_tag`](gophr_core::Intent::for_tag)
//! - [`fetch_package`]: cached package lookup
//! - [`SiteConfig`]: `GOPHR_*` environment settings
//!
//! ## Example
//!
//! ```no_run
//! use gophr_http::HttpTransport;
//! use gophr_runtime::{DispatchPipeline, Store};
//! use gophr_core::environment::SystemClock;
//! use gophr_site::{fetch_package, SiteEnvironment, SiteReducer, SiteState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = DispatchPipeline::new().with_transport(HttpTransport::from_env()?);
//! let store = Store::with_pipeline(
//!     SiteState::default(),
//!     SiteReducer::new(),
//!     SiteEnvironment::new(SystemClock),
//!     pipeline,
//! );
//!
//! let mut receipt = store.dispatch(fetch_package("gorilla/mux").into()).await?;
//! receipt.handle.wait().await;
//! let loaded = store.state(|s| s.has_package("gorilla/mux")).await;
//! # let _ = loaded;
//! # Ok(())
//! # }
//! ```

pub mod environment;
pub mod reducer;
pub mod types;

pub use environment::{SiteConfig, SiteConfigError, SiteEnvironment};
pub use reducer::{fetch_package, SiteReducer};
pub use types::{Form, Session, SiteAction, SiteState};
