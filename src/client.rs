//! Authenticated HTTP client for the Eight Sleep REST API.
//!
//! [`EightSleepClient`] wraps two `reqwest::Client`s: one for the token
//! endpoint and one for resource calls. All resource responses are returned
//! as `serde_json::Value`; the [`api`](crate::api) facade reshapes them.
//!
//! ## Authentication
//!
//! The first resource call logs in with the password grant. The token is then
//! attached as `Authorization: Bearer <token>` to every request. Expiry is
//! discovered reactively: a 401 drops the token, triggers one re-login and one
//! retry of the same request. A second 401 is an authentication failure.
//!
//! The login response's `expires_in` is logged but never trusted.
//!
//! ## Concurrency
//!
//! The session sits behind a single async mutex that is held across the
//! login call. A caller that saw a 401 only logs in again if the held token
//! is still the one that was rejected, so concurrent 401s collapse into one
//! login.
//!
//! ## Error handling
//!
//! Non-2xx responses are parsed for a `message` or `error` field in the JSON
//! body. If parsing fails, the raw response body is returned as the message.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, Credentials};
use crate::error::{EightSleepError, Result};
use crate::models::{TokenRequest, TokenResponse};

const USER_AGENT: &str = concat!("eight-sleep-mcp/", env!("CARGO_PKG_VERSION"));

/// Token currently held by the client.
struct Session {
    access_token: String,
    user_id: Option<String>,
}

/// HTTP client for one Eight Sleep account.
pub struct EightSleepClient {
    auth_http: reqwest::Client,
    api_http: reqwest::Client,
    api_url: String,
    auth_url: String,
    credentials: Credentials,
    session: Mutex<Option<Session>>,
}

impl EightSleepClient {
    /// Create a client. No network I/O happens until the first request.
    pub fn new(credentials: Credentials, api: &ApiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(api.timeout_secs);
        Ok(Self {
            auth_http: build_http(timeout)?,
            api_http: build_http(timeout)?,
            // Strip trailing slash for consistent URL construction
            api_url: api.api_url.trim_end_matches('/').to_string(),
            auth_url: api.auth_url.clone(),
            credentials,
            session: Mutex::new(None),
        })
    }

    /// Log in and replace the held token.
    ///
    /// Fails with [`EightSleepError::Configuration`] before any network I/O
    /// when email or password is missing.
    pub async fn authenticate(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        *session = Some(self.login().await?);
        Ok(())
    }

    /// Whether a token is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// The user whose pod is addressed when a tool call names none.
    ///
    /// Authenticates first when no token is held yet.
    pub async fn user_id(&self) -> Result<String> {
        if !self.credentials.user_id.is_empty() {
            return Ok(self.credentials.user_id.clone());
        }
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.login().await?);
        }
        session
            .as_ref()
            .and_then(|s| s.user_id.clone())
            .ok_or_else(|| {
                EightSleepError::Configuration(
                    "no user id: set EIGHT_SLEEP_USER_ID or pass user_id".into(),
                )
            })
    }

    /// `GET {api_url}{path}`.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request(Method::GET, path, None, query).await
    }

    /// `PUT {api_url}{path}` with a JSON body.
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    /// `POST {api_url}{path}` with a JSON body.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    /// `DELETE {api_url}{path}`.
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None, &[]).await
    }

    /// Send an authenticated request, re-authenticating and retrying once on 401.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let url = format!("{}{}", self.api_url, path);
        let token = self.current_token().await?;

        let resp = self.send(&method, &url, body, query, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Self::handle_response(resp).await;
        }

        warn!("{method} {path} rejected with 401, re-authenticating");
        let token = self.refresh_after_rejection(&token).await?;
        let resp = self.send(&method, &url, body, query, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.forget_token(&token).await;
            let message = error_message(resp).await;
            return Err(EightSleepError::Authentication(format!(
                "token rejected after re-authentication: {message}"
            )));
        }
        Self::handle_response(resp).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<reqwest::Response> {
        debug!("{method} {url}");
        let mut req = self
            .api_http
            .request(method.clone(), url)
            .bearer_auth(token);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        Ok(req.send().await?)
    }

    /// Return the held token, logging in first if there is none.
    async fn current_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref() {
            return Ok(s.access_token.clone());
        }
        let fresh = self.login().await?;
        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    /// Replace a token the vendor rejected. If another caller already did,
    /// reuse theirs instead of logging in again.
    async fn refresh_after_rejection(&self, rejected: &str) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref() {
            if s.access_token != rejected {
                debug!("token already refreshed by a concurrent request");
                return Ok(s.access_token.clone());
            }
        }
        *session = None;
        let fresh = self.login().await?;
        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    async fn forget_token(&self, rejected: &str) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| s.access_token == rejected) {
            *session = None;
        }
    }

    /// Password-grant login. Callers hold the session lock.
    async fn login(&self) -> Result<Session> {
        if self.credentials.email.is_empty() {
            return Err(EightSleepError::Configuration(
                "EIGHT_SLEEP_EMAIL is not set".into(),
            ));
        }
        if self.credentials.password.is_empty() {
            return Err(EightSleepError::Configuration(
                "EIGHT_SLEEP_PASSWORD is not set".into(),
            ));
        }

        let body = TokenRequest {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            grant_type: "password",
            username: &self.credentials.email,
            password: &self.credentials.password,
        };

        let resp = self
            .auth_http
            .post(&self.auth_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EightSleepError::Authentication(format!("login request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp).await;
            return Err(EightSleepError::Authentication(format!(
                "login rejected (HTTP {}): {message}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| {
            EightSleepError::Authentication(format!("invalid token response: {e}"))
        })?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                EightSleepError::Authentication("token response has no access_token".into())
            })?;

        let user_id = if self.credentials.user_id.is_empty() {
            token.user_id
        } else {
            Some(self.credentials.user_id.clone())
        };

        info!(
            expires_in = ?token.expires_in,
            user_id = user_id.as_deref().unwrap_or("-"),
            "authenticated with Eight Sleep"
        );

        Ok(Session {
            access_token,
            user_id,
        })
    }

    /// Parse a resource response. Returns the JSON body on success, or an
    /// [`EightSleepError::Api`] carrying the vendor message on failure.
    async fn handle_response(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            return Err(EightSleepError::Api {
                status: status.as_u16(),
                message: error_message(resp).await,
            });
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| EightSleepError::Protocol(format!("invalid JSON from Eight Sleep: {e}")))
    }
}

fn build_http(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()?)
}

/// Extract the most specific error message from a failed response body.
async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<Value>(&body).ok();
    let field = parsed.as_ref().and_then(|v| {
        ["error_description", "message", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .map(String::from)
    });
    match field {
        Some(m) => m,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn credentials() -> Credentials {
        Credentials {
            email: "sleeper@example.com".into(),
            password: "hunter2".into(),
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            user_id: String::new(),
        }
    }

    fn client_for(server: &MockServer, credentials: Credentials) -> EightSleepClient {
        let api = ApiConfig {
            api_url: server.url("/v1"),
            auth_url: server.url("/tokens"),
            timezone: "UTC".into(),
            timeout_secs: 5,
        };
        EightSleepClient::new(credentials, &api).unwrap()
    }

    async fn seed_token(client: &EightSleepClient, token: &str) {
        *client.session.lock().await = Some(Session {
            access_token: token.into(),
            user_id: Some("u1".into()),
        });
    }

    #[tokio::test]
    async fn first_request_logs_in_lazily() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens").json_body(json!({
                "client_id": "cid",
                "client_secret": "csecret",
                "grant_type": "password",
                "username": "sleeper@example.com",
                "password": "hunter2"
            }));
            then.status(200)
                .json_body(json!({ "access_token": "t1", "expires_in": 3600, "userId": "u1" }));
        });
        let resource = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/users/u1/presence")
                .header("authorization", "Bearer t1");
            then.status(200).json_body(json!({ "presence": true }));
        });

        let client = client_for(&server, credentials());
        assert!(!client.is_authenticated().await);
        let body = client.get("/users/u1/presence", &[]).await.unwrap();

        assert_eq!(body, json!({ "presence": true }));
        login.assert_calls(1);
        resource.assert_calls(1);
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn token_is_reused_across_requests() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "access_token": "t1" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/users/u1/alarms");
            then.status(200).json_body(json!({ "alarms": [] }));
        });

        let client = client_for(&server, credentials());
        client.get("/users/u1/alarms", &[]).await.unwrap();
        client.get("/users/u1/alarms", &[]).await.unwrap();
        login.assert_calls(1);
    }

    #[tokio::test]
    async fn single_401_triggers_one_relogin_and_retry() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "access_token": "fresh" }));
        });
        let stale = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/users/u1/temperature")
                .header("authorization", "Bearer stale");
            then.status(401).json_body(json!({ "message": "token expired" }));
        });
        let fresh = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/users/u1/temperature")
                .header("authorization", "Bearer fresh");
            then.status(200).json_body(json!({ "currentLevel": 10 }));
        });

        let client = client_for(&server, credentials());
        seed_token(&client, "stale").await;
        let body = client.get("/users/u1/temperature", &[]).await.unwrap();

        assert_eq!(body["currentLevel"], json!(10));
        login.assert_calls(1);
        stale.assert_calls(1);
        fresh.assert_calls(1);
    }

    #[tokio::test]
    async fn second_401_is_authentication_error_without_further_retry() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "access_token": "fresh" }));
        });
        let resource = server.mock(|when, then| {
            when.method(GET).path("/v1/users/u1/temperature");
            then.status(401).json_body(json!({ "message": "nope" }));
        });

        let client = client_for(&server, credentials());
        seed_token(&client, "stale").await;
        let err = client.get("/users/u1/temperature", &[]).await.unwrap_err();

        assert!(matches!(err, EightSleepError::Authentication(_)), "{err}");
        assert!(err.to_string().contains("nope"));
        login.assert_calls(1);
        resource.assert_calls(2);
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn failed_relogin_is_authentication_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(400)
                .json_body(json!({ "error": "invalid_grant", "error_description": "bad password" }));
        });
        let resource = server.mock(|when, then| {
            when.method(GET).path("/v1/users/u1/alarms");
            then.status(401);
        });

        let client = client_for(&server, credentials());
        seed_token(&client, "stale").await;
        let err = client.get("/users/u1/alarms", &[]).await.unwrap_err();

        assert!(matches!(err, EightSleepError::Authentication(_)));
        assert!(err.to_string().contains("bad password"), "{err}");
        resource.assert_calls(1);
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_network() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "access_token": "t1" }));
        });

        let mut no_email = credentials();
        no_email.email.clear();
        let err = client_for(&server, no_email).authenticate().await.unwrap_err();
        assert!(matches!(err, EightSleepError::Configuration(_)));
        assert!(err.to_string().contains("EIGHT_SLEEP_EMAIL"));

        let mut no_password = credentials();
        no_password.password.clear();
        let err = client_for(&server, no_password)
            .get("/users/u1/presence", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EightSleepError::Configuration(_)));
        assert!(err.to_string().contains("EIGHT_SLEEP_PASSWORD"));

        login.assert_calls(0);
    }

    #[tokio::test]
    async fn login_without_token_is_authentication_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "expires_in": 3600 }));
        });

        let err = client_for(&server, credentials())
            .authenticate()
            .await
            .unwrap_err();
        assert!(matches!(err, EightSleepError::Authentication(_)));
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn login_network_failure_is_authentication_error() {
        let api = ApiConfig {
            api_url: "http://127.0.0.1:9/v1".into(),
            auth_url: "http://127.0.0.1:9/tokens".into(),
            timezone: "UTC".into(),
            timeout_secs: 2,
        };
        let client = EightSleepClient::new(credentials(), &api).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, EightSleepError::Authentication(_)), "{err}");
    }

    #[tokio::test]
    async fn non_401_errors_carry_status_and_vendor_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "access_token": "t1" }));
        });
        server.mock(|when, then| {
            when.method(PUT).path("/v1/users/u1/temperature");
            then.status(422).json_body(json!({ "message": "level out of range" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/users/u1/device");
            then.status(502).body("upstream gone");
        });

        let client = client_for(&server, credentials());
        let err = client
            .put("/users/u1/temperature", &json!({ "currentLevel": 500 }))
            .await
            .unwrap_err();
        match err {
            EightSleepError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "level out of range");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = client.get("/users/u1/device", &[]).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("upstream gone"));
    }

    #[tokio::test]
    async fn empty_success_body_is_null() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200).json_body(json!({ "access_token": "t1" }));
        });
        server.mock(|when, then| {
            when.method(DELETE).path("/v1/users/u1/alarms/a1");
            then.status(204);
        });

        let client = client_for(&server, credentials());
        assert_eq!(client.delete("/users/u1/alarms/a1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn user_id_prefers_configured_default() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200)
                .json_body(json!({ "access_token": "t1", "userId": "from-token" }));
        });

        let mut creds = credentials();
        creds.user_id = "configured".into();
        let client = client_for(&server, creds);
        assert_eq!(client.user_id().await.unwrap(), "configured");
        login.assert_calls(0);

        let client = client_for(&server, credentials());
        assert_eq!(client.user_id().await.unwrap(), "from-token");
        login.assert_calls(1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_401s_collapse_into_one_login() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200)
                .delay(Duration::from_millis(50))
                .json_body(json!({ "access_token": "fresh" }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/v1/users/u1/presence")
                .header("authorization", "Bearer stale");
            then.status(401);
        });
        let fresh = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/users/u1/presence")
                .header("authorization", "Bearer fresh");
            then.status(200).json_body(json!({ "presence": false }));
        });

        let client = Arc::new(client_for(&server, credentials()));
        seed_token(&client, "stale").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                client.get("/users/u1/presence", &[]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        login.assert_calls(1);
        fresh.assert_calls(8);
    }
}
