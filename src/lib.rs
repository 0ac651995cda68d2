pub mod auth;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod models;
pub mod openapi;
pub mod otp;
pub mod repo;
pub mod routes;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use gateway::{AccessPolicy, AuthGateway, Decision};
pub use routes::{config, AppState};
