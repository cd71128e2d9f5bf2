//! External sheet service adapters.

pub mod http;
pub mod memory;

pub use http::HttpSheetService;
pub use memory::{InMemorySheetService, InjectedFailure};
