//! Guild membership lookups and role classification

pub mod classifier;
pub mod client;

pub use classifier::{classify, RoleClassification};
pub use client::{DiscordGuildApi, GuildApi, GuildMember};
