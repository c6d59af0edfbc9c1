//! HTTP API handlers for mlib-catalog

pub mod auth;
pub mod entries;
pub mod health;
pub mod timing;

pub use auth::{auth_middleware, Principal};
pub use entries::{
    admin_get_entry, admin_list_entries, create_entry, delete_entry, get_entry, list_entries,
    update_entry,
};
pub use health::health_routes;
pub use timing::request_timing;
