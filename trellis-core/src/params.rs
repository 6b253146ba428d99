// Action parameter bindings and argument extraction

use crate::{Error, Next, Principal, Request, RequestContext, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Where a bound action argument comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    Request,
    Response,
    /// Route parameters
    Params,
    Query,
    Body,
    Headers,
    Cookies,
    Next,
    Principal,
}

impl ParameterType {
    /// Symbolic name used in route summaries
    pub fn symbol(&self) -> &'static str {
        match self {
            ParameterType::Request => "@Request",
            ParameterType::Response => "@Response",
            ParameterType::Params => "@RequestParam",
            ParameterType::Query => "@QueryParam",
            ParameterType::Body => "@RequestBody",
            ParameterType::Headers => "@RequestHeaders",
            ParameterType::Cookies => "@Cookies",
            ParameterType::Next => "@Next",
            ParameterType::Principal => "@PrincipalUser",
        }
    }
}

/// Declares that argument `index` of an action is taken from `kind`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub index: usize,
    pub kind: ParameterType,
    /// Entry to pick from the source; `None` injects the whole source
    pub name: Option<String>,
    pub inject_root: bool,
}

impl ParameterBinding {
    /// Bind the whole source
    pub fn new(index: usize, kind: ParameterType) -> Self {
        Self {
            index,
            kind,
            name: None,
            inject_root: true,
        }
    }

    /// Bind one named entry of the source
    pub fn named(index: usize, kind: ParameterType, name: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            name: Some(name.into()),
            inject_root: false,
        }
    }
}

/// One positional action argument
#[derive(Clone)]
pub enum Argument {
    Request(Request),
    Response(Response),
    Next(Next),
    Value(Value),
    Principal(Option<Arc<dyn Principal>>),
    /// No binding declared for this position
    Missing,
}

impl Argument {
    fn kind_name(&self) -> &'static str {
        match self {
            Argument::Request(_) => "request",
            Argument::Response(_) => "response",
            Argument::Next(_) => "next",
            Argument::Value(_) => "value",
            Argument::Principal(_) => "principal",
            Argument::Missing => "missing",
        }
    }
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Argument::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Argument::Principal(user) => f
                .debug_tuple("Principal")
                .field(&user.as_ref().map(|u| u.details()))
                .finish(),
            other => f.write_str(other.kind_name()),
        }
    }
}

/// Positional arguments handed to an action
#[derive(Clone, Debug, Default)]
pub struct ActionArgs {
    args: Vec<Argument>,
}

impl ActionArgs {
    pub fn new(args: Vec<Argument>) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.args.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    fn at(&self, index: usize) -> Result<&Argument, Error> {
        self.args.get(index).ok_or_else(|| Error::Argument {
            index,
            reason: format!("only {} arguments were passed", self.args.len()),
        })
    }

    fn mismatch(index: usize, expected: &str, found: &Argument) -> Error {
        Error::Argument {
            index,
            reason: format!("expected {}, found {}", expected, found.kind_name()),
        }
    }

    pub fn request(&self, index: usize) -> Result<Request, Error> {
        match self.at(index)? {
            Argument::Request(req) => Ok(req.clone()),
            other => Err(Self::mismatch(index, "request", other)),
        }
    }

    pub fn response(&self, index: usize) -> Result<Response, Error> {
        match self.at(index)? {
            Argument::Response(res) => Ok(res.clone()),
            other => Err(Self::mismatch(index, "response", other)),
        }
    }

    pub fn next(&self, index: usize) -> Result<Next, Error> {
        match self.at(index)? {
            Argument::Next(next) => Ok(next.clone()),
            other => Err(Self::mismatch(index, "next", other)),
        }
    }

    pub fn value(&self, index: usize) -> Result<&Value, Error> {
        match self.at(index)? {
            Argument::Value(value) => Ok(value),
            other => Err(Self::mismatch(index, "value", other)),
        }
    }

    /// A value argument as text. Absent entries are an error.
    pub fn string(&self, index: usize) -> Result<String, Error> {
        match self.value(index)? {
            Value::String(text) => Ok(text.clone()),
            Value::Null => Err(Error::Argument {
                index,
                reason: "value is absent".to_string(),
            }),
            other => Ok(other.to_string()),
        }
    }

    /// Deserialize a value argument. Strings that do not deserialize
    /// directly are parsed as JSON, so `"42"` from a route parameter yields
    /// a number.
    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let value = self.value(index)?;
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Ok(parsed),
            Err(direct) => match value {
                Value::String(text) => serde_json::from_str(text).map_err(|e| Error::Argument {
                    index,
                    reason: e.to_string(),
                }),
                _ => Err(Error::Argument {
                    index,
                    reason: direct.to_string(),
                }),
            },
        }
    }

    pub fn principal(&self, index: usize) -> Result<Option<Arc<dyn Principal>>, Error> {
        match self.at(index)? {
            Argument::Principal(user) => Ok(user.clone()),
            other => Err(Self::mismatch(index, "principal", other)),
        }
    }

    /// The request, response and continuation appended after the bound
    /// arguments
    pub fn transport(&self) -> Result<(Request, Response, Next), Error> {
        let len = self.args.len();
        if len < 3 {
            return Err(Error::Argument {
                index: len,
                reason: "transport arguments are missing".to_string(),
            });
        }
        Ok((
            self.request(len - 3)?,
            self.response(len - 2)?,
            self.next(len - 1)?,
        ))
    }
}

/// Build the argument list for an action.
///
/// Without bindings the action receives `(request, response, next)`.
/// Otherwise each binding fills its own index, positions nobody claims stay
/// [`Argument::Missing`], and the transport handles are appended.
pub fn extract_parameters(
    req: &Request,
    res: &Response,
    next: &Next,
    bindings: &[ParameterBinding],
    context: Option<&RequestContext>,
) -> ActionArgs {
    let transport = [
        Argument::Request(req.clone()),
        Argument::Response(res.clone()),
        Argument::Next(next.clone()),
    ];

    if bindings.is_empty() {
        return ActionArgs::new(transport.to_vec());
    }

    let mut args: Vec<Argument> = Vec::new();
    for binding in bindings {
        let value = match binding.kind {
            ParameterType::Request => Argument::Request(req.clone()),
            ParameterType::Response => Argument::Response(res.clone()),
            ParameterType::Next => Argument::Next(next.clone()),
            ParameterType::Params => Argument::Value(pick(&req.params(), binding, false)),
            ParameterType::Query => Argument::Value(pick(req.query(), binding, false)),
            ParameterType::Headers => Argument::Value(pick(req.headers(), binding, true)),
            ParameterType::Cookies => Argument::Value(pick(req.cookies(), binding, false)),
            ParameterType::Body => Argument::Value(req.body().clone()),
            ParameterType::Principal => Argument::Principal(context.and_then(RequestContext::user)),
        };

        if args.len() <= binding.index {
            args.resize(binding.index + 1, Argument::Missing);
        }
        args[binding.index] = value;
    }

    args.extend(transport);
    ActionArgs::new(args)
}

fn pick(source: &HashMap<String, String>, binding: &ParameterBinding, lowercase: bool) -> Value {
    if binding.inject_root {
        return Value::Object(
            source
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect::<Map<_, _>>(),
        );
    }

    let Some(name) = binding.name.as_deref() else {
        return Value::Null;
    };
    let found = if lowercase {
        source.get(&name.to_ascii_lowercase())
    } else {
        source.get(name)
    };
    found.map_or(Value::Null, |value| Value::String(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpRequest;
    use serde_json::json;

    fn request() -> Request {
        Request::new(
            HttpRequest::new("POST", "/users?page=2")
                .with_header("Content-Type", "application/json")
                .with_header("Cookie", "session=abc")
                .with_body(r#"{"name":"ada"}"#),
        )
    }

    #[test]
    fn test_no_bindings_gives_transport_only() {
        let args = extract_parameters(&request(), &Response::new(), &Next::new(), &[], None);
        assert_eq!(args.len(), 3);
        assert!(matches!(args.get(0), Some(Argument::Request(_))));
        assert!(matches!(args.get(1), Some(Argument::Response(_))));
        assert!(matches!(args.get(2), Some(Argument::Next(_))));
    }

    #[test]
    fn test_bindings_fill_by_index() {
        let req = request();
        req.set_params([("id".to_string(), "7".to_string())].into());

        // Registry order is the reverse of declaration order
        let bindings = vec![
            ParameterBinding::named(2, ParameterType::Query, "page"),
            ParameterBinding::new(1, ParameterType::Body),
            ParameterBinding::named(0, ParameterType::Params, "id"),
        ];
        let args = extract_parameters(&req, &Response::new(), &Next::new(), &bindings, None);

        assert_eq!(args.len(), 6);
        assert_eq!(args.parse::<u32>(0).unwrap(), 7);
        assert_eq!(args.value(1).unwrap(), &json!({"name": "ada"}));
        assert_eq!(args.string(2).unwrap(), "2");
        assert!(args.transport().is_ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let bindings = vec![ParameterBinding::named(0, ParameterType::Headers, "Content-Type")];
        let args = extract_parameters(&request(), &Response::new(), &Next::new(), &bindings, None);
        assert_eq!(args.string(0).unwrap(), "application/json");
    }

    #[test]
    fn test_whole_source_and_missing_entries() {
        let bindings = vec![
            ParameterBinding::new(0, ParameterType::Cookies),
            ParameterBinding::named(1, ParameterType::Query, "absent"),
        ];
        let args = extract_parameters(&request(), &Response::new(), &Next::new(), &bindings, None);

        assert_eq!(args.value(0).unwrap(), &json!({"session": "abc"}));
        assert_eq!(args.value(1).unwrap(), &Value::Null);
        assert!(args.string(1).is_err());
    }

    #[test]
    fn test_sparse_indices_leave_gaps() {
        let bindings = vec![ParameterBinding::new(2, ParameterType::Request)];
        let args = extract_parameters(&request(), &Response::new(), &Next::new(), &bindings, None);

        assert_eq!(args.len(), 6);
        assert!(matches!(args.get(0), Some(Argument::Missing)));
        assert!(matches!(args.get(1), Some(Argument::Missing)));
        assert!(args.request(2).is_ok());
        assert!(args.request(0).is_err());
    }

    #[test]
    fn test_principal_without_context_is_none() {
        let bindings = vec![ParameterBinding::new(0, ParameterType::Principal)];
        let args = extract_parameters(&request(), &Response::new(), &Next::new(), &bindings, None);
        assert!(args.principal(0).unwrap().is_none());
    }

    #[test]
    fn test_symbols() {
        assert_eq!(ParameterType::Params.symbol(), "@RequestParam");
        assert_eq!(ParameterType::Principal.symbol(), "@PrincipalUser");
    }
}
