// Response content bodies

use crate::Error;
use crate::message::Headers;
use async_trait::async_trait;
use serde::Serialize;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";

/// Body carried by a [`ResponseMessage`](crate::ResponseMessage)
#[async_trait]
pub trait HttpContent: Send + Sync {
    /// Content-level headers, at least `content-type`
    fn headers(&self) -> &Headers;

    async fn read_as_string(&self) -> Result<String, Error>;
}

/// Verbatim text, `text/plain` unless told otherwise
#[derive(Debug, Clone)]
pub struct StringContent {
    content: String,
    headers: Headers,
}

impl StringContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_media_type(content, TEXT_PLAIN)
    }

    pub fn with_media_type(content: impl Into<String>, media_type: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type", media_type);
        Self {
            content: content.into(),
            headers,
        }
    }
}

#[async_trait]
impl HttpContent for StringContent {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    async fn read_as_string(&self) -> Result<String, Error> {
        Ok(self.content.clone())
    }
}

/// A value serialized to JSON when the content is built
#[derive(Debug, Clone)]
pub struct JsonContent {
    content: String,
    headers: Headers,
}

impl JsonContent {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        Self::with_media_type(value, APPLICATION_JSON)
    }

    pub fn with_media_type<T: Serialize + ?Sized>(value: &T, media_type: &str) -> Result<Self, Error> {
        let content =
            serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut headers = Headers::new();
        headers.insert("content-type", media_type);
        Ok(Self { content, headers })
    }
}

#[async_trait]
impl HttpContent for JsonContent {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    async fn read_as_string(&self) -> Result<String, Error> {
        Ok(self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_string_content_defaults_to_text() {
        let content = StringContent::new("bad input");
        assert_eq!(content.headers().get("Content-Type"), Some("text/plain".into()));
        assert_eq!(content.read_as_string().await.unwrap(), "bad input");
    }

    #[tokio::test]
    async fn test_json_content_serializes_eagerly() {
        let content = JsonContent::new(&json!({"a": 1})).unwrap();
        assert_eq!(content.headers().get("content-type"), Some("application/json".into()));
        assert_eq!(content.read_as_string().await.unwrap(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_custom_media_type() {
        let content = JsonContent::with_media_type(&[1, 2], "application/vnd.api+json").unwrap();
        assert_eq!(
            content.headers().get("content-type"),
            Some("application/vnd.api+json".into())
        );
    }
}
