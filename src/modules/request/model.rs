// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::modules::{
    error::{code::ErrorCode, PushlineResult},
    network::transport::HttpRequest,
};
use crate::{pushline_version, raise_error};

pub const API_ENVELOPE_VERSION: u32 = 1;

pub const HEADER_API_KEY: &str = "Api-Key";
pub const HEADER_SDK_PLATFORM: &str = "SDK-Platform";
pub const HEADER_SDK_VERSION: &str = "SDK-Version";
pub const HEADER_SENT_AT: &str = "Sent-At";
pub const HEADER_REQUEST_PROCESSOR: &str = "SDK-Request-Processor";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

pub const PROCESSOR_OFFLINE: &str = "Offline";

/// Who the request is sent for. At most one of the two is set.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub email: Option<String>,
    pub user_id: Option<String>,
}

impl Identity {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            user_id: None,
        }
    }

    pub fn user_id(user_id: impl Into<String>) -> Self {
        Self {
            email: None,
            user_id: Some(user_id.into()),
        }
    }

    pub fn is_known(&self) -> bool {
        self.email.is_some() || self.user_id.is_some()
    }

    /// Inserts `email` or `userId` under the requested key names.
    pub fn add_to(&self, body: &mut serde_json::Map<String, Value>, email_key: &str, user_id_key: &str) {
        if let Some(email) = &self.email {
            body.insert(email_key.into(), json!(email));
        } else if let Some(user_id) = &self.user_id {
            body.insert(user_id_key.into(), json!(user_id));
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub device_id: String,
    pub platform: String,
    pub app_package_name: String,
}

impl DeviceMetadata {
    pub fn as_json(&self) -> Value {
        json!({
            "deviceId": self.device_id,
            "platform": self.platform,
            "appPackageName": self.app_package_name,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SdkRequest {
    Get {
        path: String,
        args: BTreeMap<String, String>,
    },
    Post {
        path: String,
        args: BTreeMap<String, String>,
        body: Option<Value>,
    },
}

impl SdkRequest {
    pub fn post(path: &str, body: Value) -> Self {
        SdkRequest::Post {
            path: path.to_string(),
            args: BTreeMap::new(),
            body: Some(body),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            SdkRequest::Get { path, .. } | SdkRequest::Post { path, .. } => path,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            SdkRequest::Get { .. } => None,
            SdkRequest::Post { body, .. } => body.as_ref(),
        }
    }

    /// Copy of a POST body with `createdAt` (seconds) stamped in. A body that
    /// already carries `createdAt` keeps it.
    pub fn adding_created_at(&self, requested_at_millis: i64) -> Self {
        match self {
            SdkRequest::Post { path, args, body } => {
                let body = match body {
                    Some(Value::Object(map)) => {
                        let mut map = map.clone();
                        map.entry("createdAt")
                            .or_insert_with(|| json!(requested_at_millis / 1000));
                        Some(Value::Object(map))
                    }
                    other => other.clone(),
                };
                SdkRequest::Post {
                    path: path.clone(),
                    args: args.clone(),
                    body,
                }
            }
            get => get.clone(),
        }
    }
}

/// The envelope persisted as a task's `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiCallRequest {
    pub version: u32,
    pub api_key: String,
    pub endpoint: String,
    pub auth_token: Option<String>,
    pub device_metadata: DeviceMetadata,
    pub request: SdkRequest,
}

impl ApiCallRequest {
    pub fn encode(&self) -> PushlineResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SerializationError))
    }

    pub fn decode(data: &[u8]) -> PushlineResult<Self> {
        let request: ApiCallRequest = serde_json::from_slice(data)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SerializationError))?;
        if request.version > API_ENVELOPE_VERSION {
            return Err(raise_error!(
                format!(
                    "Unsupported request envelope version {}, expected at most {}",
                    request.version, API_ENVELOPE_VERSION
                ),
                ErrorCode::SerializationError
            ));
        }
        Ok(request)
    }

    pub fn with_auth_token(mut self, auth_token: Option<String>) -> Self {
        if auth_token.is_some() {
            self.auth_token = auth_token;
        }
        self
    }

    /// Builds the wire request. `sent_at` is in milliseconds.
    pub fn to_http_request(&self, sent_at: i64) -> PushlineResult<HttpRequest> {
        let base = Url::parse(&self.endpoint).map_err(|e| {
            raise_error!(
                format!("Invalid endpoint '{}': {}", self.endpoint, e),
                ErrorCode::MissingConfiguration
            )
        })?;
        let mut url = base.join(self.request.path()).map_err(|e| {
            raise_error!(
                format!("Invalid path '{}': {}", self.request.path(), e),
                ErrorCode::InvalidParameter
            )
        })?;

        let (method, args, body) = match &self.request {
            SdkRequest::Get { args, .. } => (Method::GET, args, None),
            SdkRequest::Post { args, body, .. } => (Method::POST, args, body.as_ref()),
        };
        if !args.is_empty() {
            url.query_pairs_mut().extend_pairs(args.iter());
        }

        let mut headers = BTreeMap::new();
        headers.insert(HEADER_CONTENT_TYPE.into(), "application/json".into());
        headers.insert(HEADER_API_KEY.into(), self.api_key.clone());
        headers.insert(
            HEADER_SDK_PLATFORM.into(),
            self.device_metadata.platform.clone(),
        );
        headers.insert(HEADER_SDK_VERSION.into(), pushline_version!().into());
        headers.insert(HEADER_SENT_AT.into(), (sent_at / 1000).to_string());
        headers.insert(HEADER_REQUEST_PROCESSOR.into(), PROCESSOR_OFFLINE.into());
        if let Some(token) = &self.auth_token {
            headers.insert(HEADER_AUTHORIZATION.into(), format!("Bearer {}", token));
        }

        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SerializationError))?;

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use http::Method;
    use serde_json::json;

    use super::*;

    fn envelope(request: SdkRequest, auth_token: Option<&str>) -> ApiCallRequest {
        ApiCallRequest {
            version: API_ENVELOPE_VERSION,
            api_key: "key-1".into(),
            endpoint: "https://api.pushline.io/api/".into(),
            auth_token: auth_token.map(str::to_string),
            device_metadata: DeviceMetadata {
                device_id: "device-1".into(),
                platform: "iOS".into(),
                app_package_name: "io.pushline.demo".into(),
            },
            request,
        }
    }

    #[test]
    fn post_request_carries_headers_and_body() {
        let request = envelope(
            SdkRequest::post("events/track", json!({"eventName": "open"})),
            Some("jwt-token"),
        );
        let http = request.to_http_request(1_700_000_000_123).unwrap();
        assert_eq!(http.method, Method::POST);
        assert_eq!(http.url, "https://api.pushline.io/api/events/track");
        assert_eq!(http.header(HEADER_API_KEY), Some("key-1"));
        assert_eq!(http.header(HEADER_SDK_PLATFORM), Some("iOS"));
        assert_eq!(http.header(HEADER_SENT_AT), Some("1700000000"));
        assert_eq!(http.header(HEADER_REQUEST_PROCESSOR), Some("Offline"));
        assert_eq!(http.header(HEADER_AUTHORIZATION), Some("Bearer jwt-token"));
        assert_eq!(http.json_body(), Some(json!({"eventName": "open"})));
    }

    #[test]
    fn get_request_encodes_query_and_omits_missing_token() {
        let mut args = BTreeMap::new();
        args.insert("email".to_string(), "a@b.c".to_string());
        let request = envelope(
            SdkRequest::Get {
                path: "inApp/getMessages".into(),
                args,
            },
            None,
        );
        let http = request.to_http_request(0).unwrap();
        assert_eq!(http.method, Method::GET);
        assert_eq!(
            http.url,
            "https://api.pushline.io/api/inApp/getMessages?email=a%40b.c"
        );
        assert_eq!(http.header(HEADER_AUTHORIZATION), None);
        assert!(http.body.is_none());
    }

    #[test]
    fn created_at_is_stamped_in_seconds() {
        let request = SdkRequest::post("events/track", json!({"eventName": "open"}));
        let stamped = request.adding_created_at(1_700_000_000_999);
        assert_eq!(
            stamped.body(),
            Some(&json!({"eventName": "open", "createdAt": 1_700_000_000}))
        );
    }

    #[test]
    fn envelope_round_trips_and_rejects_newer_versions() {
        let request = envelope(SdkRequest::post("events/track", json!({})), None);
        let decoded = ApiCallRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);

        let mut newer = request.clone();
        newer.version = API_ENVELOPE_VERSION + 1;
        assert!(ApiCallRequest::decode(&newer.encode().unwrap()).is_err());
    }

    #[test]
    fn current_token_replaces_stored_one() {
        let request = envelope(SdkRequest::post("events/track", json!({})), Some("old"));
        assert_eq!(
            request.clone().with_auth_token(Some("new".into())).auth_token.as_deref(),
            Some("new")
        );
        assert_eq!(request.with_auth_token(None).auth_token.as_deref(), Some("old"));
    }
}
