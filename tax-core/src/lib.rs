pub mod calculations;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;
pub mod validation;

pub use calculations::{ProgressiveCalculator, RoundingPolicy};
pub use db::repository::{RepositoryError, TaxRepository};
pub use engine::{ReloadError, TaxEngine};
pub use error::{
    CalculationError, ConfigurationError, InvalidInputError, NotFoundError, PrecisionError,
};
pub use models::*;
pub use store::{TableSnapshot, TableStore};
