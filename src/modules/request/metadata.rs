use std::sync::RwLock;

use crate::modules::{
    request::model::{DeviceMetadata, Identity},
    settings::config::SdkConfig,
};

/// Supplies the values stamped into every request envelope.
pub trait ApiMetadataProvider: Send + Sync {
    fn api_key(&self) -> String;
    fn endpoint(&self) -> String;
    fn device_metadata(&self) -> DeviceMetadata;
    fn identity(&self) -> Identity;
    fn set_identity(&self, identity: Identity);
}

pub struct StaticMetadataProvider {
    api_key: String,
    endpoint: String,
    device_metadata: DeviceMetadata,
    identity: RwLock<Identity>,
}

impl StaticMetadataProvider {
    pub fn new(config: &SdkConfig, device_metadata: DeviceMetadata) -> Self {
        Self {
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            device_metadata,
            identity: RwLock::new(Identity::default()),
        }
    }
}

impl ApiMetadataProvider for StaticMetadataProvider {
    fn api_key(&self) -> String {
        self.api_key.clone()
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn device_metadata(&self) -> DeviceMetadata {
        self.device_metadata.clone()
    }

    fn identity(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_identity(&self, identity: Identity) {
        *self
            .identity
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = identity;
    }
}
