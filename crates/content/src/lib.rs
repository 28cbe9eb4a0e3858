//! Content-addressed storage for uploaded file bytes.
//!
//! A [`ContentStore`] persists byte payloads and hands back an identifier
//! derived solely from those bytes, the payload size, and a locator the
//! browser can follow to retrieve them. `hash_only` computes the identifier
//! without persisting anything and must agree with `store` for the same bytes.

pub mod fs;
pub mod hash;
pub mod ipfs;
pub mod store;

pub use fs::FsContentStore;
pub use hash::ContentHash;
pub use ipfs::IpfsContentStore;
pub use store::{ContentDigest, ContentError, ContentStore, MemoryContentStore, Result, StoredContent};
