pub mod audit;
pub mod context;
pub mod edit;
pub mod show;
pub mod sync;
