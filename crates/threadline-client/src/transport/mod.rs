//! HTTP transport for the client.
//!
//! Provides [`HttpTransport`], which executes [`ApiRequest`]s against the
//! messenger server and decodes the responses. Protocol logic stays in the
//! Sans-IO [`crate::Client`]; this layer only moves bytes.
//!
//! The [`push`] submodule speaks the Pusher websocket protocol for realtime
//! delivery.

pub mod push;

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use threadline_proto::{ApiRequest, ApiResponse, Channel, Method, UserId, request::EditBody};
use tracing::{debug, trace};

use crate::{RequestId, TransportError};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON body of a send without attachment.
#[derive(Debug, Serialize)]
struct SendBody<'a> {
    receiver_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Response of the channel authorization endpoint.
#[derive(Debug, Deserialize)]
struct ChannelAuth {
    auth: String,
}

/// HTTP client bound to a messenger server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `https://app.example.com`).
    ///
    /// `token` is sent as a bearer token on every request when present.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network { reason: e.to_string() })?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, token })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request and decode its response.
    pub async fn execute(
        &self,
        request_id: RequestId,
        request: &ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let route = request.route();
        let url = format!("{}{}", self.base_url, route.path);
        trace!(%request_id, ?route.method, %url, "executing request");

        let builder = match route.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        };
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let builder = match request {
            ApiRequest::Send { receiver_id, body, attachment: Some(file) } => {
                let mut form = Form::new().text("receiver_id", receiver_id.to_string());
                if let Some(body) = body {
                    form = form.text("message", body.clone());
                }
                let part = Part::bytes(file.content.to_vec()).file_name(file.file_name.clone());
                builder.multipart(form.part("attachment", part))
            },
            ApiRequest::Send { receiver_id, body, attachment: None } => {
                builder.json(&SendBody { receiver_id: *receiver_id, message: body.as_deref() })
            },
            ApiRequest::Edit { body, .. } => builder.json(&EditBody { body }),
            _ => builder,
        };

        let response =
            builder.send().await.map_err(|e| TransportError::Network { reason: e.to_string() })?;
        let status = response.status();
        if !status.is_success() {
            debug!(%request_id, status = status.as_u16(), "request failed");
            return Err(TransportError::Status { request_id, status: status.as_u16() });
        }

        let body =
            response.bytes().await.map_err(|e| TransportError::Network { reason: e.to_string() })?;
        Ok(ApiResponse::decode(request.kind(), &body)?)
    }

    /// Fire a request whose response is irrelevant. Failures are logged.
    pub async fn beacon(&self, request: &ApiRequest) {
        if let Err(error) = self.execute(RequestId::new(0), request).await {
            debug!(?request, %error, "beacon failed");
        }
    }

    /// Obtain the signature for subscribing `socket_id` to a private channel.
    pub async fn authorize(
        &self,
        socket_id: &str,
        channel: &Channel,
    ) -> Result<String, TransportError> {
        let url = format!("{}/broadcasting/auth", self.base_url);
        let name = channel.name();
        let builder =
            self.http.post(&url).form(&[("socket_id", socket_id), ("channel_name", &name)]);
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response =
            builder.send().await.map_err(|e| TransportError::Network { reason: e.to_string() })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                request_id: RequestId::new(0),
                status: status.as_u16(),
            });
        }
        let auth: ChannelAuth =
            response.json().await.map_err(|e| TransportError::Decode { reason: e.to_string() })?;
        Ok(auth.auth)
    }
}
