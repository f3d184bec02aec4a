// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Offline-durable task execution core: API calls are persisted as tasks,
//! executed by a background runner with retry and token refresh, and their
//! results routed back to the original caller.

pub mod modules;
