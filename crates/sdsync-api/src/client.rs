//! `SdClient` - Schedules Direct JSON API client implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

use super::api::LocalSdApi;
use super::error::{ApiError, envelope_message, is_error_envelope};
use super::models::Artwork;
use super::types::{
    DayHash, DescriptionPayload, LineupPayload, ProgramPayload, ScheduleEntry, StationDays,
    StatusResponse, parse_artwork, parse_descriptions, parse_programs, parse_schedule_hashes,
};

/// Default base URL.
pub const DEFAULT_BASE_URL: &str = "https://json.schedulesdirect.org/20141201/";

/// Header carrying the session token.
const TOKEN_HEADER: &str = "token";

/// Schedules Direct API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct SdClient {
    /// HTTP client (reqwest, gzip enabled).
    http_client: Client,
    /// Base URL, always ending in `/`.
    base_url: Url,
    /// Session token set by `login()`.
    token: RwLock<Option<String>>,
}

/// Builder for `SdClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct SdClientBuilder {
    base_url: Option<Url>,
    user_agent: Option<String>,
}

impl SdClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            user_agent: None,
        }
    }

    /// Overrides the base URL (for wiremock in tests).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `user_agent` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<SdClient> {
        let user_agent = self.user_agent.context("user_agent is required")?;

        let mut base_url = if let Some(url) = self.base_url {
            url
        } else {
            Url::parse(DEFAULT_BASE_URL).context("invalid default base URL")?
        };
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .gzip(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(SdClient {
            http_client,
            base_url,
            token: RwLock::new(None),
        })
    }
}

/// Hex SHA-1 digest of `password`, as the token endpoint expects.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl SdClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> SdClientBuilder {
        SdClientBuilder::new()
    }

    /// Exchanges credentials for a session token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ServiceOffline`] when the token endpoint reports
    /// a nonzero code, or a transport/decode error.
    #[instrument(skip_all)]
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let body = json!({
            "username": username,
            "password": hash_password(password),
        });
        let response = self.send(Method::POST, "token", Some(&body), None).await?;

        let code = response.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let token = response.get("token").and_then(Value::as_str);
        match (code, token) {
            (0, Some(token)) => {
                *self.token.write().await = Some(String::from(token));
                tracing::info!(username, "logged in");
                Ok(())
            }
            _ => Err(ApiError::ServiceOffline {
                message: envelope_message(&response),
                payload: Box::new(response),
            }),
        }
    }

    /// Returns `true` once `login()` has succeeded.
    pub async fn is_logged_in(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Sends an authenticated request and returns the parsed body.
    ///
    /// # Errors
    ///
    /// - [`ApiError::LoginRequired`] if `login()` was not called.
    /// - [`ApiError::Server`] if the body is an error envelope.
    /// - Transport and decode errors.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(ApiError::LoginRequired)?;

        let value = self.send(method, path, body, Some(&token)).await?;
        if is_error_envelope(&value) {
            return Err(ApiError::from_envelope(value));
        }
        Ok(value)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let url = self.base_url.join(path).map_err(|source| ApiError::InvalidUrl {
            path: String::from(path),
            source,
        })?;
        tracing::debug!(%method, %url, "request");

        let mut req = self.http_client.request(method, url);
        if let Some(token) = token {
            req = req.header(TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let http_err = |source| ApiError::Http {
            path: String::from(path),
            source,
        };
        let response = req.send().await.map_err(http_err)?;
        let status = response.status();
        let text = response.text().await.map_err(http_err)?;
        tracing::trace!(path, %status, body_len = text.len(), "response received");

        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            path: String::from(path),
            source,
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body).map_err(|source| ApiError::Decode {
            path: String::from(path),
            source,
        })?;
        self.request(Method::POST, path, Some(&body)).await
    }

    fn decode<T: serde::de::DeserializeOwned>(path: &str, value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|source| ApiError::Decode {
            path: String::from(path),
            source,
        })
    }
}

impl LocalSdApi for SdClient {
    #[instrument(skip_all)]
    async fn status(&self) -> Result<StatusResponse, ApiError> {
        let value = self.request(Method::GET, "status", None).await?;
        Self::decode("status", value)
    }

    #[instrument(skip_all, fields(lineup = name))]
    async fn lineup(&self, name: &str) -> Result<LineupPayload, ApiError> {
        let path = format!("lineups/{name}");
        let value = self.request(Method::GET, &path, None).await?;
        Self::decode(&path, value)
    }

    #[instrument(skip_all, fields(stations = station_ids.len()))]
    async fn schedule_hashes(&self, station_ids: &[String]) -> Result<Vec<DayHash>, ApiError> {
        let body: Vec<Value> = station_ids
            .iter()
            .map(|id| json!({ "stationID": id }))
            .collect();
        let value = self.post("schedules/md5", &body).await?;
        Ok(parse_schedule_hashes(&value))
    }

    #[instrument(skip_all, fields(stations = requests.len()))]
    async fn schedules(&self, requests: &[StationDays]) -> Result<Vec<ScheduleEntry>, ApiError> {
        let value = self.post("schedules", &requests).await?;
        let entries: Vec<Value> = Self::decode("schedules", value)?;
        entries
            .into_iter()
            .map(|entry| {
                ScheduleEntry::from_value(entry).map_err(|source| ApiError::Decode {
                    path: String::from("schedules"),
                    source,
                })
            })
            .collect()
    }

    #[instrument(skip_all, fields(programs = program_ids.len()))]
    async fn programs(&self, program_ids: &[String]) -> Result<Vec<ProgramPayload>, ApiError> {
        let value = self.post("programs", &program_ids).await?;
        let entries: Vec<Value> = Self::decode("programs", value)?;
        Ok(parse_programs(entries))
    }

    #[instrument(skip_all, fields(programs = program_ids.len()))]
    async fn descriptions(
        &self,
        program_ids: &[String],
    ) -> Result<HashMap<String, DescriptionPayload>, ApiError> {
        let value = self.post("metadata/description", &program_ids).await?;
        Ok(parse_descriptions(&value))
    }

    #[instrument(skip_all, fields(programs = artwork_ids.len()))]
    async fn artwork(
        &self,
        artwork_ids: &[String],
    ) -> Result<HashMap<String, Vec<Artwork>>, ApiError> {
        let value = self.post("metadata/programs", &artwork_ids).await?;
        Ok(parse_artwork(&value))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> SdClient {
        SdClient::builder()
            .base_url(server.uri().parse().unwrap())
            .user_agent("sdsync-test/0.0.0")
            .build()
            .unwrap()
    }

    async fn logged_in(server: &MockServer) -> SdClient {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 0, "message": "OK", "token": "tok123"})),
            )
            .mount(server)
            .await;
        let client = client_for(server);
        client.login("user", "password").await.unwrap();
        client
    }

    #[test]
    fn test_hash_password() {
        // Arrange & Act
        let hashed = hash_password("password");

        // Assert
        assert_eq!(hashed, "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8");
    }

    #[test]
    fn test_builder_requires_user_agent() {
        // Arrange & Act
        let result = SdClient::builder().build();

        // Assert
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_login_sends_hashed_password() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_json(json!({
                "username": "user",
                "password": "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 0, "token": "tok123"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        client.login("user", "password").await.unwrap();

        // Assert
        assert!(client.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_login_nonzero_code_is_service_offline() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "SERVICE_OFFLINE",
                "code": 3000,
                "message": "Server offline for maintenance."
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let err = client.login("user", "password").await.unwrap_err();

        // Assert
        assert!(matches!(err, ApiError::ServiceOffline { .. }));
        assert!(!client.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_request_without_login_fails() {
        // Arrange
        let server = MockServer::start().await;
        let client = client_for(&server);

        // Act
        let err = client.status().await.unwrap_err();

        // Assert
        assert!(matches!(err, ApiError::LoginRequired));
    }

    #[tokio::test]
    async fn test_status_sends_token_header() {
        // Arrange
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(header("token", "tok123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "account": {"expires": "2030-01-01T00:00:00Z", "maxLineups": 4},
                "lineups": [
                    {"lineup": "USA-IL57303-X", "modified": "2019-02-15T14:01:03Z", "uri": "/20141201/lineups/USA-IL57303-X"},
                    {"lineup": "USA-OTA-60030", "modified": "2019-01-01T00:00:00Z", "isDeleted": true}
                ],
                "lastDataUpdate": "2019-02-18T00:00:00Z",
                "systemStatus": [{"date": "2019-02-18T00:00:00Z", "status": "Online", "message": "No known issues."}]
            })))
            .mount(&server)
            .await;

        // Act
        let status = client.status().await.unwrap();

        // Assert
        assert_eq!(status.lineups.len(), 2);
        assert!(status.lineups[1].is_deleted);
        assert_eq!(status.system_status[0].status, "Online");
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_server_error() {
        // Arrange
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path("/lineups/USA-XX-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "response": "INVALID_LINEUP",
                "code": 2100,
                "message": "The lineup you submitted doesn't exist."
            })))
            .mount(&server)
            .await;

        // Act
        let err = client.lineup("USA-XX-1").await.unwrap_err();

        // Assert
        assert_eq!(err.server_code(), Some(2100));
    }

    #[tokio::test]
    async fn test_schedules_keeps_per_item_failures() {
        // Arrange
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("POST"))
            .and(path("/schedules"))
            .and(body_json(json!([{"stationID": "10021", "date": ["2019-03-01"]}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "stationID": "10021",
                    "response": "SCHEDULE_QUEUED",
                    "code": 7100,
                    "requestedDate": "2019-03-01",
                    "message": "Queued."
                },
                {
                    "stationID": "10021",
                    "programs": [{
                        "programID": "EP018632100004",
                        "airDateTime": "2019-03-02T01:00:00Z",
                        "duration": 1800,
                        "md5": "abc"
                    }],
                    "metadata": {"startDate": "2019-03-02", "md5": "day"}
                }
            ])))
            .mount(&server)
            .await;
        let requests = vec![StationDays {
            station_id: String::from("10021"),
            dates: vec![String::from("2019-03-01")],
        }];

        // Act
        let entries = client.schedules(&requests).await.unwrap();

        // Assert
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], ScheduleEntry::Failed(_)));
        assert!(matches!(entries[1], ScheduleEntry::Day(_)));
    }

    #[tokio::test]
    async fn test_descriptions_empty_list_is_tolerated() {
        // Arrange
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("POST"))
            .and(path("/metadata/description"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        // Act
        let descriptions = client
            .descriptions(&[String::from("EP018632100004")])
            .await
            .unwrap();

        // Assert
        assert!(descriptions.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_body_is_decode_error() {
        // Arrange
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        // Act
        let err = client.status().await.unwrap_err();

        // Assert
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_base_url_without_trailing_slash() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/20141201/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 0, "token": "t"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let client = SdClient::builder()
            .base_url(format!("{}/20141201", server.uri()).parse().unwrap())
            .user_agent("sdsync-test/0.0.0")
            .build()
            .unwrap();

        // Act
        let result = client.login("user", "password").await;

        // Assert
        assert!(result.is_ok());
    }
}
