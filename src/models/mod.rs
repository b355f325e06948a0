mod priority;
mod quote;

pub use priority::{CacheTier, RequestPriority};
pub use quote::Quote;
