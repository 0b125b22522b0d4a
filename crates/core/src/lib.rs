pub mod annotation;
pub mod config;
pub mod coords;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod logger;
pub mod lua_rt;
pub mod navigator;
pub mod orchestrator;
pub mod platform;
pub mod settings;
pub mod sleep;
pub mod types;
pub mod vision;
