// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod auth;
pub mod common;
pub mod context;
pub mod database;
pub mod error;
pub mod events;
pub mod logger;
pub mod metrics;
pub mod network;
pub mod request;
pub mod scheduler;
pub mod settings;
#[cfg(test)]
pub mod testing;
pub mod unknown;
pub mod utils;
