//! Buildpack Store - buildpack acquisition and caching
//!
//! Resolves a buildpack reference (a local directory, a
//! `github.com/<org>/<repo>` coordinate, or a packaged registry image) into
//! a packaged artifact on disk, reusing cached artifacts across test runs.
//!
//! ```no_run
//! use buildpack_store::{AcquisitionRequest, BuildpackStore, ConfigLoader};
//!
//! # async fn example() -> buildpack_store::StoreResult<()> {
//! let config = ConfigLoader::new().load().await?;
//! let store = BuildpackStore::from_config(&config);
//! let artifact = store
//!     .resolve(&AcquisitionRequest::new("github.com/paketo-buildpacks/go-dist").with_version("2.3.4"))
//!     .await?;
//! println!("{}", artifact.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod reference;
pub mod request;
pub mod store;

pub use config::{ConfigLoader, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use request::{AcquisitionRequest, Target};
pub use store::BuildpackStore;
