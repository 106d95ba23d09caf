//! Client side of the catalogue: an HTTP client that owns the signed-in
//! session, plus the cached views (artifact catalog, message threads) that
//! re-read the server after every write.

pub mod client;
pub mod error;
pub mod session;
pub mod sync;

pub use client::AtlasClient;
pub use error::ClientError;
pub use session::{Session, SessionStore};
pub use sync::{ArtifactCatalog, MessageThread, ThreadChange, ThreadPoller};
