pub mod database;
pub mod error;
pub mod filter;

pub use database::{Store, DEFAULT_LINK_STRENGTH, DEFAULT_RELATED_LIMIT};
pub use error::StoreError;
pub use filter::FragmentFilter;
