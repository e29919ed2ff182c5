pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod places;
pub mod remote;
pub mod repository;

pub use error::SyncError;
pub use model::{ReconcileMode, WorkPlace, Workflow};
pub use repository::WorkPlaceRepository;
