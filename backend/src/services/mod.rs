pub mod admission;
pub mod client_registry;
pub mod identity_cache;
pub mod session;

pub use admission::{AdmissionLimiter, SessionCeiling};
pub use client_registry::ClientRegistry;
pub use identity_cache::{CacheError, CacheStore, IdentityCache, MemoryCacheStore, RedisCacheStore};
pub use session::{SessionService, TokenPair};
