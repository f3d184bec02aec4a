pub mod bridge;
pub mod creator;
pub mod metadata;
pub mod model;
pub mod processor;
pub mod types;
