pub mod linker;
pub mod types;

pub use linker::*;
pub use types::*;
