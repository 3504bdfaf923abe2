pub mod api;
pub mod dedup;
pub mod error;
pub mod events;
pub mod models;
