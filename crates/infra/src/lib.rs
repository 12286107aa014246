//! Infrastructure layer: configuration, the transactional tenant store, the
//! application services that compose the pure domain crates inside
//! transactions, and background jobs.

pub mod config;
pub mod error;
pub mod event_store;
pub mod jobs;
pub mod services;
pub mod store;

mod integration_tests;

pub use config::Settings;
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use services::{ServiceConfig, ServiceContext, Services};
pub use store::InMemoryStore;
