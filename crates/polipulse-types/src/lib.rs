pub mod api;
pub mod compliance;
pub mod events;
pub mod inbox;
pub mod models;
