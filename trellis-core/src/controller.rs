// Controllers and action return values

use crate::results::*;
use crate::{ActionResult, Error, ResponseMessage, Scope};
use serde::Serialize;
use serde_json::Value;

/// A type whose instances serve a group of routes.
///
/// A fresh controller is created from the request scope for every request
/// that reaches one of its actions. The request's
/// [`RequestContext`](crate::RequestContext) can be resolved from that scope.
///
/// # Example
///
/// ```ignore
/// struct UserController {
///     users: Arc<UserService>,
/// }
///
/// impl Controller for UserController {
///     fn create(scope: &Scope) -> Result<Self, Error> {
///         Ok(Self { users: scope.resolve(&ServiceId::new("UserService"))? })
///     }
/// }
/// ```
pub trait Controller: Send + Sync + Sized + 'static {
    fn create(scope: &Scope) -> Result<Self, Error>;

    /// Unique name of the controller, the unqualified type name by default
    fn name() -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_string()
    }
}

/// Result helpers available on every controller
pub trait HttpController: Controller {
    fn ok(&self) -> OkResult {
        OkResult::new().with_origin(Self::name())
    }

    fn ok_with<T>(&self, content: T) -> OkNegotiatedContentResult<T> {
        OkNegotiatedContentResult::new(content).with_origin(Self::name())
    }

    fn created<T>(&self, location: impl Into<String>, content: T) -> CreatedNegotiatedContentResult<T> {
        CreatedNegotiatedContentResult::new(location, content).with_origin(Self::name())
    }

    fn conflict(&self) -> ConflictResult {
        ConflictResult::new().with_origin(Self::name())
    }

    fn bad_request(&self) -> BadRequestResult {
        BadRequestResult::new().with_origin(Self::name())
    }

    fn bad_request_message(&self, message: impl Into<String>) -> BadRequestErrorMessageResult {
        BadRequestErrorMessageResult::new(message).with_origin(Self::name())
    }

    fn internal_server_error(&self) -> InternalServerErrorResult {
        InternalServerErrorResult::new().with_origin(Self::name())
    }

    fn exception(&self, error: impl std::fmt::Display) -> ExceptionResult {
        ExceptionResult::new(error).with_origin(Self::name())
    }

    fn not_found(&self) -> NotFoundResult {
        NotFoundResult::new().with_origin(Self::name())
    }

    fn redirect(&self, uri: impl Into<String>) -> RedirectResult {
        RedirectResult::new(uri).with_origin(Self::name())
    }

    fn response_message(&self, message: ResponseMessage) -> ResponseMessageResult {
        ResponseMessageResult::new(message).with_origin(Self::name())
    }

    fn status_code(&self, status_code: u16) -> StatusCodeResult {
        StatusCodeResult::new(status_code).with_origin(Self::name())
    }

    fn json<T>(&self, content: T, status_code: u16) -> JsonResult<T> {
        JsonResult::new(content, status_code).with_origin(Self::name())
    }
}

impl<C: Controller> HttpController for C {}

/// What an action handed back, classified once when the action returns
pub enum ActionOutput {
    /// A finished response message, emitted as-is
    Message(ResponseMessage),
    /// Converted with [`ActionResult::to_response_message`] and emitted
    Result(Box<dyn ActionResult>),
    /// Called once; the action manages the response itself
    SideEffect(Box<dyn FnOnce() + Send>),
    /// Sent as the body unless a response went out already; `None` is a 204
    Value(Option<Value>),
}

impl ActionOutput {
    pub fn message(message: ResponseMessage) -> Self {
        ActionOutput::Message(message)
    }

    pub fn result(result: impl ActionResult + 'static) -> Self {
        ActionOutput::Result(Box::new(result))
    }

    pub fn side_effect(f: impl FnOnce() + Send + 'static) -> Self {
        ActionOutput::SideEffect(Box::new(f))
    }

    pub fn value<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(ActionOutput::Value(Some(value)))
    }

    pub fn none() -> Self {
        ActionOutput::Value(None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ActionOutput::Message(_) => "message",
            ActionOutput::Result(_) => "result",
            ActionOutput::SideEffect(_) => "side_effect",
            ActionOutput::Value(_) => "value",
        }
    }
}

impl std::fmt::Debug for ActionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionOutput::Message(message) => f.debug_tuple("Message").field(message).finish(),
            ActionOutput::Value(value) => f.debug_tuple("Value").field(value).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<ResponseMessage> for ActionOutput {
    fn from(message: ResponseMessage) -> Self {
        ActionOutput::Message(message)
    }
}

impl From<Value> for ActionOutput {
    fn from(value: Value) -> Self {
        ActionOutput::Value(Some(value))
    }
}

impl From<Option<Value>> for ActionOutput {
    fn from(value: Option<Value>) -> Self {
        ActionOutput::Value(value)
    }
}

impl From<String> for ActionOutput {
    fn from(text: String) -> Self {
        ActionOutput::Value(Some(Value::String(text)))
    }
}

impl From<&str> for ActionOutput {
    fn from(text: &str) -> Self {
        ActionOutput::Value(Some(Value::String(text.to_string())))
    }
}

impl From<()> for ActionOutput {
    fn from(_: ()) -> Self {
        ActionOutput::Value(None)
    }
}

impl From<Box<dyn ActionResult>> for ActionOutput {
    fn from(result: Box<dyn ActionResult>) -> Self {
        ActionOutput::Result(result)
    }
}

macro_rules! result_output {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for ActionOutput {
                fn from(result: $name) -> Self {
                    ActionOutput::Result(Box::new(result))
                }
            }
        )*
    };
}

result_output!(
    OkResult,
    BadRequestResult,
    BadRequestErrorMessageResult,
    ConflictResult,
    NotFoundResult,
    RedirectResult,
    StatusCodeResult,
    ResponseMessageResult,
    InternalServerErrorResult,
    ExceptionResult,
);

macro_rules! content_result_output {
    ($($name:ident),* $(,)?) => {
        $(
            impl<T: Serialize + Send + Sync + 'static> From<$name<T>> for ActionOutput {
                fn from(result: $name<T>) -> Self {
                    ActionOutput::Result(Box::new(result))
                }
            }
        )*
    };
}

content_result_output!(
    OkNegotiatedContentResult,
    CreatedNegotiatedContentResult,
    JsonResult,
);
