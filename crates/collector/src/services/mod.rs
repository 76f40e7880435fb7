pub mod collector;

#[cfg(test)]
pub(crate) mod test_support;

pub use collector::{CollectorService, StoreError};
