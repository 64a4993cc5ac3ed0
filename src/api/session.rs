use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use serde_json::Value;

use crate::error::{Error, Result};

pub type Headers = BTreeMap<String, String>;

/// Authenticated JSON-over-HTTP access. Implemented by [`HttpSession`] for
/// real traffic and by in-memory fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)], headers: &Headers) -> Result<Value>;

    async fn post(&self, url: &str, body: &Value, headers: &Headers) -> Result<Value>;
}

/// A reqwest client that sends the user's cookies with every request.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    cookie: String,
}

impl HttpSession {
    pub fn new(cookies: &BTreeMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            client,
            cookie: cookie_header(cookies),
        })
    }

    /// Build a session from a JSON file mapping cookie names to values.
    pub fn from_cookie_file(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let cookies: BTreeMap<String, String> = serde_json::from_str(&text)?;
        if cookies.is_empty() {
            return Err(Error::Auth(format!("no cookies found in {}", path.display())));
        }
        Self::new(&cookies, timeout)
    }

    fn apply(&self, mut req: reqwest::RequestBuilder, headers: &Headers) -> reqwest::RequestBuilder {
        req = req.header(COOKIE, &self.cookie);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        log::debug!("HTTP {status} from {url}: {body}");
        return Err(Error::Http {
            status: status.as_u16(),
            url,
        });
    }
    Ok(resp.json::<Value>().await?)
}

#[async_trait]
impl Transport for HttpSession {
    async fn get(&self, url: &str, query: &[(String, String)], headers: &Headers) -> Result<Value> {
        let req = self.apply(self.client.get(url), headers).query(query);
        read_json(req.send().await?).await
    }

    async fn post(&self, url: &str, body: &Value, headers: &Headers) -> Result<Value> {
        let req = self.apply(self.client.post(url), headers).json(body);
        read_json(req.send().await?).await
    }
}

fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut cookies = BTreeMap::new();
        cookies.insert("NYT-S".to_string(), "abc".to_string());
        cookies.insert("nyt-a".to_string(), "xyz".to_string());
        assert_eq!(cookie_header(&cookies), "NYT-S=abc; nyt-a=xyz");
    }

    #[test]
    fn test_from_cookie_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        std::fs::write(&path, r#"{"NYT-S": "token"}"#).unwrap();
        let session = HttpSession::from_cookie_file(&path, Duration::from_secs(5)).unwrap();
        assert_eq!(session.cookie, "NYT-S=token");
    }

    #[test]
    fn test_from_cookie_file_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        std::fs::write(&path, "{}").unwrap();
        let err = HttpSession::from_cookie_file(&path, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_from_cookie_file_missing() {
        let err = HttpSession::from_cookie_file("/nonexistent/cookie.json", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
