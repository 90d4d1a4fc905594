//! Chat Playback: Scripted onboarding playback for a chat dashboard.

pub mod config;
pub mod error;
pub mod playback;
pub mod store;
