pub mod error;
pub mod flatten;
pub mod record;

pub use error::*;
pub use record::*;
