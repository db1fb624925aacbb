pub mod app;
pub mod compose;
pub mod config;
pub mod emoji;
pub mod identity;
pub mod models;
pub mod prefs;
pub mod projection;
pub mod render;
pub mod storage;
pub mod theme;
