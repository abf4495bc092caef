//! HTTP server: warp routes over the access gateway

pub mod api;
pub mod core;

pub use self::api::create_api_routes;
pub use self::core::MedauthServer;
