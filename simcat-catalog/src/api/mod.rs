//! HTTP API handlers for simcat-catalog

pub mod books;
pub mod health;
pub mod search;
pub mod stats;
pub mod tracks;

pub use books::book_routes;
pub use health::health_routes;
pub use search::search_routes;
pub use stats::stats_routes;
pub use tracks::track_routes;
