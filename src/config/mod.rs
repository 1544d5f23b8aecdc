//! Configuration loaded once at startup

pub mod app;
pub mod roles;

pub use app::{AppConfig, TlsConfig};
pub use roles::{PriorityTier, RoleConfig};
