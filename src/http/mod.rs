//! HTTP resource API

pub mod routes;

pub use routes::build_router;
