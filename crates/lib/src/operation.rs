//! Operation requests and the request validator.
//!
//! A decoded JSON body plus the operation kind (chosen by the route) becomes a
//! well-formed [`OperationRequest`], with defaults applied, or a [`ValidationError`]
//! naming the offending fields.

use serde_json::Value;
use std::fmt;

/// Channel used when a request omits one.
pub const DEFAULT_CHANNEL: &str = "mychannel";

/// Chaincode version used when a deploy request omits one.
pub const DEFAULT_CHAINCODE_VERSION: &str = "1.0";

/// Operation kind; selects required fields, the target program and the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    NetworkUp,
    NetworkDown,
    ChannelCreate,
    Deploy,
    Invoke,
    Query,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::NetworkUp => "network up",
            OperationKind::NetworkDown => "network down",
            OperationKind::ChannelCreate => "channel create",
            OperationKind::Deploy => "chaincode deploy",
            OperationKind::Invoke => "chaincode invoke",
            OperationKind::Query => "chaincode query",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    Up,
    Down,
}

impl NetworkAction {
    /// Subcommand passed to the orchestration script.
    pub fn subcommand(self) -> &'static str {
        match self {
            NetworkAction::Up => "up",
            NetworkAction::Down => "down",
        }
    }
}

/// `deployCC` parameters with defaults already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub name: String,
    pub path: String,
    pub language: String,
    pub version: String,
    pub channel: String,
}

/// Invoke or query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaincodeCall {
    pub channel: String,
    pub chaincode: String,
    pub function: String,
    pub args: Vec<String>,
}

/// A validated request. Each one maps to exactly one external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Network(NetworkAction),
    ChannelCreate { channel: String },
    Deploy(DeployRequest),
    Invoke(ChaincodeCall),
    Query(ChaincodeCall),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Network(NetworkAction::Up) => OperationKind::NetworkUp,
            OperationRequest::Network(NetworkAction::Down) => OperationKind::NetworkDown,
            OperationRequest::ChannelCreate { .. } => OperationKind::ChannelCreate,
            OperationRequest::Deploy(_) => OperationKind::Deploy,
            OperationRequest::Invoke(_) => OperationKind::Invoke,
            OperationRequest::Query(_) => OperationKind::Query,
        }
    }

    /// Key used to serialize mutating operations on the same target. Queries are read-only and return None.
    pub fn target_key(&self) -> Option<String> {
        match self {
            OperationRequest::Network(_) => Some("network".to_string()),
            OperationRequest::ChannelCreate { channel } => Some(format!("channel/{}", channel)),
            OperationRequest::Deploy(d) => Some(format!("chaincode/{}/{}", d.channel, d.name)),
            OperationRequest::Invoke(c) => Some(format!("chaincode/{}/{}", c.channel, c.chaincode)),
            OperationRequest::Query(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Typed view over the request body's fields.
struct Fields<'a> {
    obj: Option<&'a serde_json::Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(body: &'a Value) -> Result<Self, ValidationError> {
        match body {
            Value::Null => Ok(Self { obj: None }),
            Value::Object(m) => Ok(Self { obj: Some(m) }),
            _ => Err(ValidationError::NotAnObject),
        }
    }

    /// String field; absent, null, empty and whitespace-only all read as None.
    fn string(&self, name: &'static str) -> Result<Option<String>, ValidationError> {
        match self.obj.and_then(|m| m.get(name)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ValidationError::InvalidField {
                field: name,
                reason: "must be a string",
            }),
        }
    }

    fn string_list(&self, name: &'static str) -> Result<Vec<String>, ValidationError> {
        let invalid = ValidationError::InvalidField {
            field: name,
            reason: "must be an array of strings",
        };
        match self.obj.and_then(|m| m.get(name)) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(String::from).ok_or_else(|| invalid.clone()))
                .collect(),
            Some(_) => Err(invalid),
        }
    }
}

/// Collect the names of absent required fields, in declaration order.
fn require(fields: &[(&'static str, &Option<String>)]) -> Result<(), ValidationError> {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingFields(missing))
    }
}

/// Validate a decoded body for `kind` and apply defaults. Network operations ignore the body.
pub fn validate(kind: OperationKind, body: &Value) -> Result<OperationRequest, ValidationError> {
    match kind {
        OperationKind::NetworkUp => Ok(OperationRequest::Network(NetworkAction::Up)),
        OperationKind::NetworkDown => Ok(OperationRequest::Network(NetworkAction::Down)),
        OperationKind::ChannelCreate => {
            let fields = Fields::new(body)?;
            let channel = fields
                .string("channel")?
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
            Ok(OperationRequest::ChannelCreate { channel })
        }
        OperationKind::Deploy => {
            let fields = Fields::new(body)?;
            let name = fields.string("name")?;
            let path = fields.string("path")?;
            let language = fields.string("language")?;
            let version = fields.string("version")?;
            let channel = fields.string("channel")?;
            require(&[("name", &name), ("path", &path), ("language", &language)])?;
            Ok(OperationRequest::Deploy(DeployRequest {
                name: name.unwrap_or_default(),
                path: path.unwrap_or_default(),
                language: language.unwrap_or_default(),
                version: version.unwrap_or_else(|| DEFAULT_CHAINCODE_VERSION.to_string()),
                channel: channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            }))
        }
        OperationKind::Invoke | OperationKind::Query => {
            let fields = Fields::new(body)?;
            let channel = fields.string("channel")?;
            let chaincode = fields.string("chaincode")?;
            let function = fields.string("function")?;
            let args = fields.string_list("args")?;
            require(&[
                ("channel", &channel),
                ("chaincode", &chaincode),
                ("function", &function),
            ])?;
            let call = ChaincodeCall {
                channel: channel.unwrap_or_default(),
                chaincode: chaincode.unwrap_or_default(),
                function: function.unwrap_or_default(),
                args,
            };
            Ok(if kind == OperationKind::Invoke {
                OperationRequest::Invoke(call)
            } else {
                OperationRequest::Query(call)
            })
        }
    }
}
