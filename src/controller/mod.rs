pub mod analysis;
pub mod clock;
pub mod provider;

pub use analysis::{reconcile, Context, ReconcileError};
