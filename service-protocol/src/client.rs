use crate::messages::{ErrorResponse, StatusResponse};
use crate::model::{ServiceInfo, ServiceStatus, SetupProgress};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon could not be reached or the transfer broke off.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The daemon answered with a non-success status code.
    #[error("supervisor returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A body did not match the expected shape.
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Talks to a running supervisor daemon over its HTTP API.
#[derive(Clone)]
pub struct SupervisorClient {
    base_url: String,
    http: reqwest::Client,
}

impl SupervisorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let response = self.http.get(self.url("/services")).send().await?;
        Self::decode(response).await
    }

    pub async fn service(&self, name: &str) -> Result<ServiceInfo> {
        let response = self
            .http
            .get(self.url(&format!("/services/{}", name)))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn start(&self, name: &str) -> Result<ServiceStatus> {
        let response = self
            .http
            .post(self.url(&format!("/services/{}/start", name)))
            .send()
            .await?;
        let body: StatusResponse = Self::decode(response).await?;
        Ok(body.status)
    }

    pub async fn stop(&self, name: &str) -> Result<ServiceStatus> {
        let response = self
            .http
            .post(self.url(&format!("/services/{}/stop", name)))
            .send()
            .await?;
        let body: StatusResponse = Self::decode(response).await?;
        Ok(body.status)
    }

    /// Requests provisioning and returns the progress log as it arrives.
    ///
    /// The daemon streams one JSON record per line; the stream ends after the
    /// terminal record.
    pub async fn set_up(&self, name: &str) -> Result<impl Stream<Item = Result<SetupProgress>>> {
        let response = self
            .http
            .post(self.url(&format!("/services/{}/setup", name)))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(json_lines(response.bytes_stream()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => body.error,
            Err(_) => text,
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Splits a chunked byte stream into newline-delimited JSON records.
fn json_lines<S, B, T>(bytes: S) -> impl Stream<Item = Result<T>>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
    T: DeserializeOwned,
{
    let state = (Box::pin(bytes), Vec::<u8>::new(), false);
    futures::stream::unfold(state, |(mut bytes, mut buf, mut done)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = line[..pos].trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let item = serde_json::from_slice(line).map_err(ClientError::from);
                return Some((item, (bytes, buf, done)));
            }
            if done {
                if buf.trim_ascii().is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut buf);
                let item = serde_json::from_slice(rest.trim_ascii()).map_err(ClientError::from);
                return Some((item, (bytes, buf, done)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    buf.clear();
                    done = true;
                    return Some((Err(ClientError::from(e)), (bytes, buf, done)));
                }
                None => done = true,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SetupStatus;
    use axum::{http::StatusCode, routing::post, Json, Router};

    #[tokio::test]
    async fn test_json_lines_reassembles_split_records() {
        let chunks: Vec<reqwest::Result<&'static [u8]>> = vec![
            Ok(b"{\"serviceName\":\"svc\",\"step\":\"start\",\"status\":\"exec"),
            Ok(b"uting\",\"debugMessage\":\"go\"}\n\n{\"serviceName\":\"svc\","),
            Ok(b"\"step\":\"end\",\"status\":\"success\",\"debugMessage\":\"done\"}"),
        ];
        let records: Vec<Result<SetupProgress>> =
            json_lines(futures::stream::iter(chunks)).collect().await;

        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.step, "start");
        assert_eq!(first.status, SetupStatus::Executing);
        let last = records[1].as_ref().unwrap();
        assert_eq!(last.status, SetupStatus::Success);
        assert_eq!(last.debug_message, "done");
    }

    #[tokio::test]
    async fn test_conflict_is_reported_with_message() {
        let app = Router::new().route(
            "/services/:name/start",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse::new("Server startup already requested")),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = SupervisorClient::new(format!("http://{}/", addr));
        match client.start("svc").await {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "Server startup already requested");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
