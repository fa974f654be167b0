pub mod assembly;
pub mod highlight;
pub mod latest;
pub mod text;

pub use assembly::build_graph;
pub use highlight::{highlight, Segment};
pub use latest::{LatestOnly, Ticket};
pub use text::{matches_text, tokenize, truncate};
