pub mod assess;
pub mod executor;
pub mod persist;
pub mod reconcile;
pub mod schedule;
pub mod tasks;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export everything so callers can use `controller::analysis::*`
pub use assess::*;
pub use executor::*;
pub use persist::*;
pub use reconcile::*;
pub use schedule::*;
pub use tasks::*;
pub use validation::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "analysis_test.rs"]
mod tests;
