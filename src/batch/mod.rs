pub mod aggregation;
pub mod executor;
pub mod types;

pub use aggregation::*;
pub use executor::*;
pub use types::*;
