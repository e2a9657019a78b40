//! HTTP client for the datastore reader and writer services
//!
//! Keys are addressed as `collection/id` (FQID) or `collection/id/field`
//! (FQField).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::DatastoreConfig;

const GET_PATH: &str = "/get";
const EXISTS_PATH: &str = "/exists";
const WRITE_PATH: &str = "/write";

/// Upper bound for one datastore request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Datastore request failures
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// Key is not `collection/id/field`
    #[error("Invalid FQField `{0}`, expected two `/`")]
    InvalidFqField(String),

    /// Could not build the HTTP client
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request did not complete
    #[error("Sending request to datastore at {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The datastore answered with a non-success status
    #[error("Got response `{status}`: {body}")]
    Status { status: StatusCode, body: String },

    /// The response body was not what we expected
    #[error("Decoding response body `{body}`: {source}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A split `collection/id/field` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FqField<'a> {
    pub collection: &'a str,
    pub id: &'a str,
    pub field: &'a str,
}

impl<'a> FqField<'a> {
    /// Split a FQField
    pub fn parse(fqfield: &'a str) -> Result<Self, DatastoreError> {
        let parts: Vec<&str> = fqfield.split('/').collect();
        match parts.as_slice() {
            [collection, id, field] => Ok(Self {
                collection,
                id,
                field,
            }),
            _ => Err(DatastoreError::InvalidFqField(fqfield.to_string())),
        }
    }

    /// The `collection/id` part
    pub fn fqid(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

/// Client for the datastore services
#[derive(Debug, Clone)]
pub struct DatastoreClient {
    http: Client,
    reader_url: String,
    writer_url: String,
}

impl DatastoreClient {
    /// Create a client for the configured endpoints
    pub fn new(config: &DatastoreConfig) -> Result<Self, DatastoreError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(DatastoreError::Client)?;

        Ok(Self {
            http,
            reader_url: config.reader_url.trim_end_matches('/').to_string(),
            writer_url: config.writer_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one field; a field the datastore does not return is `null`
    pub async fn get(&self, fqfield: &str) -> Result<Value, DatastoreError> {
        let key = FqField::parse(fqfield)?;
        let body = json!({
            "fqid": key.fqid(),
            "mapped_fields": [key.field],
        });

        let text = self.post(&self.reader_url, GET_PATH, &body).await?;
        let mut object: Map<String, Value> = decode(&text)?;
        Ok(object.remove(key.field).unwrap_or(Value::Null))
    }

    /// Fetch one field and decode it as `T`
    pub async fn get_as<T: DeserializeOwned>(&self, fqfield: &str) -> Result<T, DatastoreError> {
        let value = self.get(fqfield).await?;
        serde_json::from_value(value.clone()).map_err(|source| DatastoreError::Decode {
            body: value.to_string(),
            source,
        })
    }

    /// Whether an object with `id` exists in `collection`
    pub async fn exists(&self, collection: &str, id: u64) -> Result<bool, DatastoreError> {
        let body = json!({
            "collection": collection,
            "filter": {
                "field": "id",
                "value": id,
                "operator": "=",
            },
        });

        let text = self.post(&self.reader_url, EXISTS_PATH, &body).await?;
        let response: ExistsResponse = decode(&text)?;
        Ok(response.exists)
    }

    /// Overwrite one field
    pub async fn set(&self, fqfield: &str, value: Value) -> Result<(), DatastoreError> {
        let key = FqField::parse(fqfield)?;
        let mut fields = Map::new();
        fields.insert(key.field.to_string(), value);

        self.write(json!({
            "type": "update",
            "fqid": key.fqid(),
            "fields": fields,
        }))
        .await
    }

    /// Create the object `fqid` with the given fields
    pub async fn create(&self, fqid: &str, fields: Map<String, Value>) -> Result<(), DatastoreError> {
        self.write(json!({
            "type": "create",
            "fqid": fqid,
            "fields": fields,
        }))
        .await
    }

    async fn write(&self, event: Value) -> Result<(), DatastoreError> {
        let body = json!({
            "user_id": 0,
            "information": {},
            "locked_fields": {},
            "events": [event],
        });
        self.post(&self.writer_url, WRITE_PATH, &body).await?;
        Ok(())
    }

    /// POST `body` and return the response text of a successful request
    async fn post(&self, base: &str, path: &str, body: &Value) -> Result<String, DatastoreError> {
        let url = format!("{}{}", base, path);
        tracing::debug!(%url, "datastore request");

        let request_error = |source| DatastoreError::Request {
            url: url.clone(),
            source,
        };
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "[can not read body]".to_string());

        if !status.is_success() {
            return Err(DatastoreError::Status { status, body: text });
        }
        Ok(text)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, DatastoreError> {
    serde_json::from_str(body).map_err(|source| DatastoreError::Decode {
        body: body.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Requests = Arc<Mutex<Vec<Value>>>;

    async fn record_get(State(seen): State<Requests>, Json(body): Json<Value>) -> Json<Value> {
        seen.lock().unwrap().push(body);
        Json(json!({ "name": "Example", "id": 1 }))
    }

    async fn record_exists(State(seen): State<Requests>, Json(body): Json<Value>) -> Json<Value> {
        let exists = body["filter"]["value"] == json!(1);
        seen.lock().unwrap().push(body);
        Json(json!({ "exists": exists, "position": 3 }))
    }

    async fn record_write(State(seen): State<Requests>, Json(body): Json<Value>) -> HttpStatus {
        seen.lock().unwrap().push(body);
        HttpStatus::OK
    }

    async fn reject(Json(_): Json<Value>) -> (HttpStatus, &'static str) {
        (HttpStatus::BAD_REQUEST, "model does not exist")
    }

    /// Serve a fake datastore and return a client pointed at it
    async fn fake_datastore() -> (DatastoreClient, Requests) {
        let seen = Requests::default();
        let app = Router::new()
            .route("/reader/get", post(record_get))
            .route("/reader/exists", post(record_exists))
            .route("/writer/write", post(record_write))
            .route("/broken/write", post(reject))
            .with_state(Arc::clone(&seen));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = DatastoreConfig {
            reader_url: format!("http://{}/reader/", addr),
            writer_url: format!("http://{}/writer", addr),
        };
        (DatastoreClient::new(&config).unwrap(), seen)
    }

    #[test]
    fn test_fqfield_parse() {
        let key = FqField::parse("organization/1/name").unwrap();
        assert_eq!(key.fqid(), "organization/1");
        assert_eq!(key.field, "name");

        for bad in ["organization/1", "a/b/c/d", "name"] {
            assert!(matches!(
                FqField::parse(bad),
                Err(DatastoreError::InvalidFqField(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_get_returns_requested_field() {
        let (client, seen) = fake_datastore().await;

        let name: String = client.get_as("organization/1/name").await.unwrap();
        assert_eq!(name, "Example");
        assert_eq!(client.get("organization/1/missing").await.unwrap(), Value::Null);

        let requests = seen.lock().unwrap();
        assert_eq!(
            requests[0],
            json!({ "fqid": "organization/1", "mapped_fields": ["name"] })
        );
    }

    #[tokio::test]
    async fn test_exists() {
        let (client, seen) = fake_datastore().await;

        assert!(client.exists("user", 1).await.unwrap());
        assert!(!client.exists("user", 2).await.unwrap());
        assert_eq!(seen.lock().unwrap()[0]["filter"]["operator"], json!("="));
    }

    #[tokio::test]
    async fn test_set_and_create_send_write_events() {
        let (client, seen) = fake_datastore().await;

        client
            .set("user/1/first_name", json!("Ada"))
            .await
            .unwrap();
        let mut fields = Map::new();
        fields.insert("username".to_string(), json!("admin"));
        client.create("user/2", fields).await.unwrap();

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0]["user_id"], json!(0));
        assert_eq!(
            requests[0]["events"][0],
            json!({ "type": "update", "fqid": "user/1", "fields": { "first_name": "Ada" } })
        );
        assert_eq!(
            requests[1]["events"][0],
            json!({ "type": "create", "fqid": "user/2", "fields": { "username": "admin" } })
        );
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let (client, _) = fake_datastore().await;
        let broken = DatastoreClient {
            writer_url: client.writer_url.replace("/writer", "/broken"),
            ..client
        };

        let err = broken.set("user/1/name", json!("x")).await.unwrap_err();
        match err {
            DatastoreError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "model does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_key_sends_nothing() {
        let (client, seen) = fake_datastore().await;
        assert!(client.set("user/1", json!(1)).await.is_err());
        assert!(seen.lock().unwrap().is_empty());
    }
}
