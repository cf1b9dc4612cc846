//! HTTP routes for Lintel

pub mod auth_routes;
pub mod dashboard;
pub mod health;
pub mod response;

pub use auth_routes::handle_auth_request;
pub use dashboard::handle_dashboard_request;
pub use health::{health_check, version_info};
pub use response::{
    cors_preflight, empty_body, error_response, from_upstream, full_body, json_response,
    not_found, BoxBody,
};
