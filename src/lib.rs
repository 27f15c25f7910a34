// Domain records shared by every layer
pub mod models;

// Configuration (TOML file + environment overrides)
pub mod config;

// SQLite persistence
pub mod store;

// Token encryption at rest
pub mod credentials;

// Password hashing and session token extraction
pub mod auth;

// Instagram and TikTok API clients
pub mod platforms;

// OAuth account linking
pub mod link;

// Content sync and metrics snapshots
pub mod analytics;

// HTTP API
pub mod api;

// Demo data
pub mod seed;
