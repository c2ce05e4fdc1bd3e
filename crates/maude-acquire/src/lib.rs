pub mod batch;
pub mod detect;
pub mod fda;
pub mod links;
pub mod output;

pub use batch::{extract_batch, BatchOptions, BatchOutput, RecordSource};
pub use fda::{ClientConfig, FdaClient, FetchOutcome};
