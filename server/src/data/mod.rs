//! Data layer: the two collaborator primitives the engine is built on.
//!
//! - `store` — TTL-bound key/value state store (§4.B)
//! - `stream` — at-least-once message stream with consumer groups (§4.A)

pub mod store;
pub mod stream;

pub use store::{StateStoreService, StoreError};
pub use stream::{StreamError, StreamService};
