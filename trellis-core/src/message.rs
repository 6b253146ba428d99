// Normalized response messages

use crate::HttpContent;
use std::fmt;
use std::sync::Arc;

/// A header value as an action may set it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Number(i64),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(text) => f.write_str(text),
            HeaderValue::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Number(value)
    }
}

impl From<u16> for HeaderValue {
    fn from(value: u16) -> Self {
        HeaderValue::Number(value.into())
    }
}

/// Ordered header map; names are lowercased and inserting an existing name
/// replaces its value in place
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<HeaderValue>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Header value rendered as a string
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.to_string())
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let index = self
            .entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Transport-independent description of a response
#[derive(Clone)]
pub struct ResponseMessage {
    pub status_code: u16,
    pub headers: Headers,
    pub content: Option<Arc<dyn HttpContent>>,
}

impl ResponseMessage {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            content: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_content(mut self, content: impl HttpContent + 'static) -> Self {
        self.content = Some(Arc::new(content));
        self
    }
}

impl Default for ResponseMessage {
    fn default() -> Self {
        Self::new(200)
    }
}

impl fmt::Debug for ResponseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseMessage")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("has_content", &self.content.is_some())
            .finish()
    }
}
