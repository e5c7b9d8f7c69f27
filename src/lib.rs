// src/lib.rs

//! Wayback Machine history downloader library

pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod resilience;
pub mod services;
pub mod storage;
pub mod utils;
