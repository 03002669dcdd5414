//! HTTP client for a single Kapacitor node.
//!
//! Uses hyper's pooled client over plain HTTP/1. Every request (connect,
//! send, and body read) runs under one `tokio::time::timeout`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::debug;

use crate::client::{Connector, NodeClient};
use crate::error::{NodeError, NodeResult};
use crate::types::{CreateTask, Task, TaskList};

const TASKS_PATH: &str = "/kapacitor/v1/tasks";
/// Only the fields the engine reads; `id` is always returned.
const LIST_QUERY: &str = "?fields=type&fields=status&fields=dbrps&limit=-1";
const USER_AGENT: &str = "alertgrid/0.1";

/// Turn a configured node address into its base URL.
///
/// Addresses with a scheme are used as given; `host:port` gets `http://`;
/// a bare host additionally gets `default_port`.
pub fn node_url(addr: &str, default_port: u16) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if addr.contains("://") {
        return addr.to_string();
    }
    let has_port = addr
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if has_port {
        format!("http://{addr}")
    } else {
        format!("http://{addr}:{default_port}")
    }
}

/// Path of a single task resource.
pub fn task_link(id: &str) -> String {
    format!("{TASKS_PATH}/{id}")
}

/// REST client bound to one node.
pub struct KapacitorClient {
    url: String,
    timeout: Duration,
    http: Client<HttpConnector, Full<Bytes>>,
}

impl KapacitorClient {
    /// Validate `url` and build a client for it. No request is made.
    pub fn new(url: &str, timeout: Duration) -> NodeResult<Self> {
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| NodeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if uri.scheme_str() != Some("http") {
            return Err(NodeError::InvalidUrl {
                url: url.to_string(),
                reason: "only http:// node urls are supported".to_string(),
            });
        }
        if uri.authority().is_none() {
            return Err(NodeError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let http = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> NodeResult<(StatusCode, Bytes)> {
        let uri = format!("{}{}", self.url, path);

        let mut builder = Request::builder()
            .method(method)
            .uri(&uri)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, USER_AGENT);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| NodeError::InvalidUrl {
                url: uri.clone(),
                reason: e.to_string(),
            })?;

        let exchange = async {
            let resp = self.http.request(req).await.map_err(|e| NodeError::Transport {
                url: uri.clone(),
                reason: e.to_string(),
            })?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e: hyper::Error| NodeError::Transport {
                    url: uri.clone(),
                    reason: e.to_string(),
                })?
                .to_bytes();
            Ok::<_, NodeError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| NodeError::Timeout {
                url: uri.clone(),
                timeout: self.timeout,
            })??;

        debug!(%uri, %status, "kapacitor request");
        if !status.is_success() {
            return Err(api_error(&uri, status, &body));
        }
        Ok((status, body))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, body: &[u8]) -> NodeResult<T> {
        serde_json::from_slice(body).map_err(|source| NodeError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}

#[async_trait]
impl NodeClient for KapacitorClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn list_tasks(&self) -> NodeResult<Vec<Task>> {
        let path = format!("{TASKS_PATH}{LIST_QUERY}");
        let (_, body) = self.send(Method::GET, &path, None).await?;
        let list: TaskList = self.decode(&body)?;
        Ok(list.tasks)
    }

    async fn create_task(&self, task: &CreateTask) -> NodeResult<Task> {
        let payload = serde_json::to_vec(task)?;
        let (_, body) = self.send(Method::POST, TASKS_PATH, Some(payload)).await?;
        self.decode(&body)
    }

    async fn delete_task(&self, id: &str) -> NodeResult<()> {
        self.send(Method::DELETE, &task_link(id), None).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Prefer the JSON `error` message, fall back to the raw body.
fn api_error(url: &str, status: StatusCode, body: &[u8]) -> NodeError {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    NodeError::Api {
        url: url.to_string(),
        status: status.as_u16(),
        message,
    }
}

/// Builds [`KapacitorClient`]s with a shared request timeout.
#[derive(Debug, Clone)]
pub struct KapacitorConnector {
    timeout: Duration,
}

impl KapacitorConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for KapacitorConnector {
    fn connect(&self, url: &str) -> NodeResult<Arc<dyn NodeClient>> {
        Ok(Arc::new(KapacitorClient::new(url, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (url, handle)
    }

    #[test]
    fn node_url_normalization() {
        assert_eq!(node_url("10.0.0.1", 9092), "http://10.0.0.1:9092");
        assert_eq!(node_url("10.0.0.1:9100", 9092), "http://10.0.0.1:9100");
        assert_eq!(node_url("http://kap.local:9092/", 9092), "http://kap.local:9092");
        assert_eq!(node_url(" kap.local ", 9092), "http://kap.local:9092");
    }

    #[test]
    fn rejects_unusable_urls() {
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            KapacitorClient::new("https://kap.local:9092", timeout),
            Err(NodeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            KapacitorClient::new("http://bad host", timeout),
            Err(NodeError::InvalidUrl { .. })
        ));
        assert!(KapacitorClient::new("http://kap.local:9092", timeout).is_ok());
    }

    #[test]
    fn api_error_prefers_json_message() {
        let err = api_error("u", StatusCode::NOT_FOUND, br#"{"error":"no task exists"}"#);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no task exists"));

        let err = api_error("u", StatusCode::BAD_GATEWAY, b"upstream down\n");
        match err {
            NodeError::Api { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_tasks_over_http() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"tasks":[{"id":"loda_v1","type":"batch","status":"enabled"}]}"#,
        )
        .await;

        let client = KapacitorClient::new(&url, Duration::from_secs(5)).unwrap();
        let tasks = client.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "loda_v1");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /kapacitor/v1/tasks?fields=type"));
        assert!(request.contains("limit=-1"));
    }

    #[tokio::test]
    async fn delete_reports_api_errors() {
        let (url, server) = serve_once("404 Not Found", r#"{"error":"no task exists"}"#).await;

        let client = KapacitorClient::new(&url, Duration::from_secs(5)).unwrap();
        let err = client.delete_task("loda_v9").await.unwrap_err();
        assert!(err.is_not_found());

        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /kapacitor/v1/tasks/loda_v9 "));
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = KapacitorClient::new(&url, Duration::from_millis(100)).unwrap();
        let err = client.list_tasks().await.unwrap_err();
        assert!(matches!(err, NodeError::Timeout { .. }));
    }
}
