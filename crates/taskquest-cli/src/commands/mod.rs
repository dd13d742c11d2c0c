pub mod achievements;
pub mod avatar;
pub mod config;
pub mod league;
pub mod profile;
pub mod session;
pub mod task;
