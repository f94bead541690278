//! Catalog services
//!
//! Track and book operations on top of the SQLite store, the shared
//! similarity query path, and the text-embedding provider client.

pub mod book_service;
pub mod similarity;
pub mod text_embedder;
pub mod track_service;

pub use book_service::{BookError, BookService};
pub use similarity::{rank_stored, resolve_bounds, SearchBounds};
pub use text_embedder::{EmbedderError, OpenAiEmbedder, TextEmbedder};
pub use track_service::TrackService;
