// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::PushlineResult;
use crate::modules::network::transport::{
    HttpRequest, HttpResponse, NetworkTransport, TransportFuture,
};
use crate::{pushline_version, raise_error};

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> PushlineResult<ReqwestTransport> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(format!("pushline/{}", pushline_version!()))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                raise_error!(
                    format!("Failed to build HTTP client: {:#?}", e),
                    ErrorCode::InternalError
                )
            })?;
        Ok(Self { client })
    }

    async fn execute(client: reqwest::Client, request: HttpRequest) -> PushlineResult<HttpResponse> {
        let mut request_builder = client.request(request.method, &request.url);
        for (key, value) in &request.headers {
            request_builder = request_builder.header(key, value);
        }
        if let Some(body) = request.body {
            request_builder = request_builder.body(body);
        }

        let response = request_builder.send().await.map_err(|e| {
            let code = if e.is_timeout() {
                ErrorCode::ConnectionTimeout
            } else {
                ErrorCode::NetworkError
            };
            raise_error!(format!("{:#?}", e), code)
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

impl NetworkTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture {
        let client = self.client.clone();
        Box::pin(Self::execute(client, request))
    }
}
