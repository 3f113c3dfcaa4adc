//! HTTP API handlers

pub mod albums;
pub mod health;
pub mod notes;
pub mod stats;
pub mod sync;

pub use albums::album_routes;
pub use health::health_routes;
pub use notes::note_routes;
pub use stats::stats_routes;
pub use sync::sync_routes;
