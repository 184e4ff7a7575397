pub mod cache;
pub mod error;
pub mod provider;
pub mod service;
pub mod settings;
pub mod types;

pub use cache::{CacheSlot, CacheStats, Clock, EmbedConfigCache, SystemClock, DEFAULT_EXPIRY_MARGIN};
pub use error::{EmbedError, ProviderError, Result};
pub use provider::{EmbedTokenProvider, ProviderResult};
pub use service::EmbedService;
pub use settings::{validate, EmbedSettings, ValidatedSettings};
pub use types::*;

#[cfg(test)]
mod tests;
