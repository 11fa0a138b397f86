//! Backend lifetime: snapshot hydrate/dehydrate and the close-once scope.

pub mod error;
pub mod scope;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{LifecycleError, LifecycleResult};
pub use scope::BackendScope;
pub use snapshot::{SNAPSHOT_VERSION, ScoreSnapshot, dehydrate, hydrate};
pub use types::{DehydrationResult, HydrationResult};
