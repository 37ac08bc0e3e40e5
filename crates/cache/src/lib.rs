//! Quillhost cache-aside primitives
//!
//! Generic key-value caching with TTL and stale-while-revalidate
//! refresh, shared by every component that talks to a slow backend
//! (tenant resolution, feeds, image metadata). The backend is a trait
//! so production uses Redis while tests inject an in-memory map.

pub mod backend;
pub mod key;
pub mod refresh;
pub mod store;

pub use backend::{BackendError, CacheBackend, MemoryBackend, RedisBackend};
pub use key::{compose_key, KeyPart};
pub use refresh::RefreshPool;
pub use store::{CacheError, CacheOptions, CacheStore};
