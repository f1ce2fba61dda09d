pub mod fixtures;
pub mod mock_upstream;

pub use mock_upstream::{MockUpstream, RecordedCall};
