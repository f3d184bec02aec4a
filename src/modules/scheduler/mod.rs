// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod handlers;
pub mod health;
pub mod model;
pub mod nativedb;
pub mod periodic;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod store;
