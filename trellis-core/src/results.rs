//! Action results
//!
//! An action result is any value that can turn itself into a
//! [`ResponseMessage`]. The built-in results cover the usual status codes;
//! applications can add their own by implementing [`ActionResult`].
//!
//! Every built-in result can be stamped with the name of the controller that
//! produced it. The name is only kept for diagnostics.
//!
//! | Result | Status | Content |
//! |---|---|---|
//! | [`OkResult`] | 200 | none |
//! | [`OkNegotiatedContentResult`] | 200 | JSON |
//! | [`CreatedNegotiatedContentResult`] | 201 | JSON, `location` header |
//! | [`BadRequestResult`] | 400 | none |
//! | [`BadRequestErrorMessageResult`] | 400 | plain text |
//! | [`ConflictResult`] | 409 | none |
//! | [`NotFoundResult`] | 404 | none |
//! | [`RedirectResult`] | 302 | none, `location` header |
//! | [`StatusCodeResult`] | any | none |
//! | [`ResponseMessageResult`] | as given | as given |
//! | [`InternalServerErrorResult`] | 500 | none |
//! | [`ExceptionResult`] | 500 | plain text of the error |
//! | [`JsonResult`] | any | JSON |

use crate::{Error, JsonContent, ResponseMessage, StringContent};
use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;

/// Capability of producing a response message
#[async_trait]
pub trait ActionResult: Send + Sync {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error>;

    /// Name of the controller that produced this result, if known
    fn origin(&self) -> Option<&str> {
        None
    }
}

macro_rules! empty_result {
    ($(#[$meta:meta])* $name:ident, $status:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            origin: Option<String>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
                self.origin = Some(controller.into());
                self
            }
        }

        #[async_trait]
        impl ActionResult for $name {
            async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
                Ok(ResponseMessage::new($status.as_u16()))
            }

            fn origin(&self) -> Option<&str> {
                self.origin.as_deref()
            }
        }
    };
}

empty_result!(
    /// 200 with no content
    OkResult,
    StatusCode::OK
);
empty_result!(BadRequestResult, StatusCode::BAD_REQUEST);
empty_result!(ConflictResult, StatusCode::CONFLICT);
empty_result!(NotFoundResult, StatusCode::NOT_FOUND);
empty_result!(
    /// 500 with no content; see [`ExceptionResult`] to report the error
    InternalServerErrorResult,
    StatusCode::INTERNAL_SERVER_ERROR
);

/// 200 with a JSON body
#[derive(Debug, Clone)]
pub struct OkNegotiatedContentResult<T> {
    pub content: T,
    origin: Option<String>,
}

impl<T> OkNegotiatedContentResult<T> {
    pub fn new(content: T) -> Self {
        Self {
            content,
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync> ActionResult for OkNegotiatedContentResult<T> {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(StatusCode::OK.as_u16()).with_content(JsonContent::new(&self.content)?))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// 201 with a JSON body and the new resource's location
#[derive(Debug, Clone)]
pub struct CreatedNegotiatedContentResult<T> {
    pub location: String,
    pub content: T,
    origin: Option<String>,
}

impl<T> CreatedNegotiatedContentResult<T> {
    pub fn new(location: impl Into<String>, content: T) -> Self {
        Self {
            location: location.into(),
            content,
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync> ActionResult for CreatedNegotiatedContentResult<T> {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(StatusCode::CREATED.as_u16())
            .with_header("location", self.location.as_str())
            .with_content(JsonContent::new(&self.content)?))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// 400 with a plain-text explanation
#[derive(Debug, Clone)]
pub struct BadRequestErrorMessageResult {
    pub message: String,
    origin: Option<String>,
}

impl BadRequestErrorMessageResult {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl ActionResult for BadRequestErrorMessageResult {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(StatusCode::BAD_REQUEST.as_u16())
            .with_content(StringContent::new(self.message.clone())))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// 302 to another location
#[derive(Debug, Clone)]
pub struct RedirectResult {
    pub location: String,
    origin: Option<String>,
}

impl RedirectResult {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl ActionResult for RedirectResult {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(StatusCode::FOUND.as_u16())
            .with_header("location", self.location.as_str()))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct StatusCodeResult {
    pub status_code: u16,
    origin: Option<String>,
}

impl StatusCodeResult {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl ActionResult for StatusCodeResult {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(self.status_code))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// Passes a prebuilt message through unchanged
#[derive(Debug, Clone)]
pub struct ResponseMessageResult {
    pub message: ResponseMessage,
    origin: Option<String>,
}

impl ResponseMessageResult {
    pub fn new(message: ResponseMessage) -> Self {
        Self {
            message,
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl ActionResult for ResponseMessageResult {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(self.message.clone())
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// 500 carrying the text of an error
#[derive(Debug, Clone)]
pub struct ExceptionResult {
    pub error: String,
    origin: Option<String>,
}

impl ExceptionResult {
    pub fn new(error: impl std::fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl ActionResult for ExceptionResult {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            .with_content(StringContent::new(self.error.clone())))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// JSON body with a status of the caller's choice
#[derive(Debug, Clone)]
pub struct JsonResult<T> {
    pub json: T,
    pub status_code: u16,
    origin: Option<String>,
}

impl<T> JsonResult<T> {
    pub fn new(json: T, status_code: u16) -> Self {
        Self {
            json,
            status_code,
            origin: None,
        }
    }

    pub fn with_origin(mut self, controller: impl Into<String>) -> Self {
        self.origin = Some(controller.into());
        self
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync> ActionResult for JsonResult<T> {
    async fn to_response_message(&self) -> Result<ResponseMessage, Error> {
        Ok(ResponseMessage::new(self.status_code).with_content(JsonContent::new(&self.json)?))
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    async fn body_of(message: &ResponseMessage) -> Option<String> {
        match &message.content {
            Some(content) => Some(content.read_as_string().await.unwrap()),
            None => None,
        }
    }

    #[test]
    fn test_empty_results_have_no_content() {
        let ok = tokio_test::block_on(OkResult::new().to_response_message()).unwrap();
        assert_eq!(ok.status_code, 200);
        assert!(ok.content.is_none());

        let conflict = tokio_test::block_on(ConflictResult::new().to_response_message()).unwrap();
        assert_eq!(conflict.status_code, 409);
        assert!(conflict.content.is_none());
    }

    #[tokio::test]
    async fn test_ok_negotiated_round_trip() {
        let message = OkNegotiatedContentResult::new(json!({"a": 1}))
            .to_response_message()
            .await
            .unwrap();

        assert_eq!(message.status_code, 200);
        let content = message.content.as_ref().unwrap();
        assert_eq!(content.headers().get("content-type").as_deref(), Some("application/json"));
        let body: Value = serde_json::from_str(&body_of(&message).await.unwrap()).unwrap();
        assert_eq!(body, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_created_sets_location() {
        let message = CreatedNegotiatedContentResult::new("/items/5", json!({"id": 5}))
            .to_response_message()
            .await
            .unwrap();

        assert_eq!(message.status_code, 201);
        assert_eq!(message.headers.get("location").as_deref(), Some("/items/5"));
        assert_eq!(body_of(&message).await.as_deref(), Some(r#"{"id":5}"#));
    }

    #[tokio::test]
    async fn test_redirect_has_no_body() {
        let message = RedirectResult::new("/login").to_response_message().await.unwrap();
        assert_eq!(message.status_code, 302);
        assert_eq!(message.headers.get("location").as_deref(), Some("/login"));
        assert!(message.content.is_none());
    }

    #[tokio::test]
    async fn test_bad_request_message_is_plain_text() {
        let message = BadRequestErrorMessageResult::new("bad input")
            .to_response_message()
            .await
            .unwrap();
        assert_eq!(message.status_code, 400);
        let content = message.content.as_ref().unwrap();
        assert_eq!(content.headers().get("content-type").as_deref(), Some("text/plain"));
        assert_eq!(body_of(&message).await.as_deref(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_empty_results() {
        let cases: Vec<(Box<dyn ActionResult>, u16)> = vec![
            (Box::new(OkResult::new()), 200),
            (Box::new(BadRequestResult::new()), 400),
            (Box::new(ConflictResult::new()), 409),
            (Box::new(NotFoundResult::new()), 404),
            (Box::new(InternalServerErrorResult::new()), 500),
            (Box::new(StatusCodeResult::new(418)), 418),
        ];

        for (result, status) in cases {
            let message = result.to_response_message().await.unwrap();
            assert_eq!(message.status_code, status);
            assert!(message.content.is_none());
        }
    }

    #[tokio::test]
    async fn test_exception_and_json_results() {
        let message = ExceptionResult::new(Error::Internal("db down".into()))
            .to_response_message()
            .await
            .unwrap();
        assert_eq!(message.status_code, 500);
        assert_eq!(
            body_of(&message).await.as_deref(),
            Some("Internal server error: db down")
        );

        let message = JsonResult::new(vec![1, 2, 3], 207)
            .to_response_message()
            .await
            .unwrap();
        assert_eq!(message.status_code, 207);
        assert_eq!(body_of(&message).await.as_deref(), Some("[1,2,3]"));
    }

    #[tokio::test]
    async fn test_origin_is_kept() {
        let result = NotFoundResult::new().with_origin("UserController");
        assert_eq!(result.origin(), Some("UserController"));
        assert_eq!(RedirectResult::new("/").origin(), None);
    }
}
