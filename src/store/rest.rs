use serde::Deserialize;
use serde_json::Value;

use super::RemoteStore;
use crate::config::StoreConfig;
use crate::error::StoreError;

/// HTTP client for the store's REST surface.
///
/// Every path maps to `{database_url}{path}.json`; the credential travels as
/// the `auth` query parameter.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    name: Option<String>,
}

impl RestClient {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: database_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.database_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}.json", self.base_url, path)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        credential: Option<&str>,
    ) -> reqwest::RequestBuilder {
        log::debug!("store {method} {path}");
        let req = self.http.request(method, self.url(path));
        match credential {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        }
    }

    /// Map a non-success status to `StoreError::Remote`, otherwise decode JSON.
    /// An empty success body decodes as `null`.
    async fn parse(resp: reqwest::Response) -> Result<Value, StoreError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::remote(status.as_u16(), body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("response body: {e}")))
    }
}

#[async_trait::async_trait]
impl RemoteStore for RestClient {
    async fn get(&self, path: &str, credential: Option<&str>) -> Result<Value, StoreError> {
        let resp = self
            .request(reqwest::Method::GET, path, credential)
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn create(
        &self,
        path: &str,
        payload: &Value,
        credential: Option<&str>,
    ) -> Result<String, StoreError> {
        let resp = self
            .request(reqwest::Method::POST, path, credential)
            .json(payload)
            .send()
            .await?;
        let created: CreateResponse = serde_json::from_value(Self::parse(resp).await?)?;
        created
            .name
            .ok_or_else(|| StoreError::Decode("create response has no name".into()))
    }

    async fn patch(
        &self,
        path: &str,
        payload: &Value,
        credential: Option<&str>,
    ) -> Result<Value, StoreError> {
        let resp = self
            .request(reqwest::Method::PATCH, path, credential)
            .json(payload)
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn delete(&self, path: &str, credential: Option<&str>) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::DELETE, path, credential)
            .send()
            .await?;
        Self::parse(resp).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_appends_json_suffix_and_auth_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userInbox/a,b@x,com.json"))
            .and(query_param("auth", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"-N1": {"subject": "S"}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::new(format!("{}/", server.uri()));
        let value = client
            .get("/userInbox/a,b@x,com", Some("tok"))
            .await
            .unwrap();
        assert_eq!(value["-N1"]["subject"], "S");
    }

    #[tokio::test]
    async fn get_of_missing_partition_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri());
        let value = client.get("/userSent/nobody", None).await.unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn create_returns_generated_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/userSent/a@x,com.json"))
            .and(body_json(json!({"subject": "S"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "-Nabc"})))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri());
        let id = client
            .create("/userSent/a@x,com", &json!({"subject": "S"}), None)
            .await
            .unwrap();
        assert_eq!(id, "-Nabc");
    }

    #[tokio::test]
    async fn create_without_name_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri());
        let err = client
            .create("/userSent/a", &json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn non_success_status_carries_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"Permission denied\"}"))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri());
        let err = client
            .patch("/userInbox/a/-N1", &json!({"read": true}), Some("bad"))
            .await
            .unwrap_err();
        match err {
            StoreError::Remote { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "{\"error\":\"Permission denied\"}");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_accepts_null_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/userInbox/a/-N1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri());
        client.delete("/userInbox/a/-N1", None).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let client = RestClient::new("http://127.0.0.1:1");
        let err = client.get("/userInbox/a", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
    }
}
