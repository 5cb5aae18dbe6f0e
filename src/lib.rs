pub mod app;
pub mod colors;
pub mod config;
pub mod constants;
pub mod env_state;
pub mod frames;
pub mod kp;
pub mod latis;
pub mod maven_errors;
pub mod metadata;
pub mod mgitm;
pub mod pipeline;
pub mod properties;
pub mod readiness;
pub mod requirements;
pub mod time;
