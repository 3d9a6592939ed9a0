use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::NickelError;

/// Classifies how a Nickel is processed by the services that receive it.
///
/// Service-bound types (HTTP methods and custom service actions) are
/// *actionable*: a router may apply a function to them. `Response`, `Error`
/// and `Timeout` are *terminal*: they close a request/response exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NickelType {
    // HTTP methods
    Get,
    Post,
    Put,
    Delete,
    // Custom service actions
    All,
    Map,
    Retrieve,
    NewMetadata,
    Create,
    Update,
    SchemaCreated,
    Save,
    Notifications,
    Active,
    NewDocument,
    Announce,
    CreateTask,
    CreateTasks,
    // Client-bound
    Error,
    Timeout,
    Response,
}

impl NickelType {
    pub const ALL_TYPES: [NickelType; 21] = [
        NickelType::Get,
        NickelType::Post,
        NickelType::Put,
        NickelType::Delete,
        NickelType::All,
        NickelType::Map,
        NickelType::Retrieve,
        NickelType::NewMetadata,
        NickelType::Create,
        NickelType::Update,
        NickelType::SchemaCreated,
        NickelType::Save,
        NickelType::Notifications,
        NickelType::Active,
        NickelType::NewDocument,
        NickelType::Announce,
        NickelType::CreateTask,
        NickelType::CreateTasks,
        NickelType::Error,
        NickelType::Timeout,
        NickelType::Response,
    ];

    /// Wire name, as carried in the `type` header and by the codec.
    pub const fn name(self) -> &'static str {
        match self {
            NickelType::Get => "GET",
            NickelType::Post => "POST",
            NickelType::Put => "PUT",
            NickelType::Delete => "DELETE",
            NickelType::All => "ALL",
            NickelType::Map => "MAP",
            NickelType::Retrieve => "RETRIEVE",
            NickelType::NewMetadata => "NEW_METADATA",
            NickelType::Create => "CREATE",
            NickelType::Update => "UPDATE",
            NickelType::SchemaCreated => "SCHEMA_CREATED",
            NickelType::Save => "SAVE",
            NickelType::Notifications => "NOTIFICATIONS",
            NickelType::Active => "ACTIVE",
            NickelType::NewDocument => "NEW_DOCUMENT",
            NickelType::Announce => "ANNOUNCE",
            NickelType::CreateTask => "CREATE_TASK",
            NickelType::CreateTasks => "CREATE_TASKS",
            NickelType::Error => "ERROR",
            NickelType::Timeout => "TIMEOUT",
            NickelType::Response => "RESPONSE",
        }
    }

    /// `Response`, `Error` and `Timeout` close a request.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            NickelType::Response | NickelType::Error | NickelType::Timeout
        )
    }

    /// Types a router refuses to apply functions to. A function producing a
    /// RESPONSE that is fed back into the same function would loop forever.
    pub const fn is_function_exempt(self) -> bool {
        matches!(self, NickelType::Response | NickelType::Error)
    }

    /// Map an HTTP method name to its Nickel type.
    ///
    /// Only GET, POST, PUT and DELETE have an equivalent; anything else is
    /// logged and yields `None`.
    pub fn from_http_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(NickelType::Get),
            "POST" => Some(NickelType::Post),
            "PUT" => Some(NickelType::Put),
            "DELETE" => Some(NickelType::Delete),
            other => {
                error!(method = other, "HTTP method has no equivalent NickelType");
                None
            }
        }
    }
}

impl fmt::Display for NickelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NickelType {
    type Err = NickelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NickelType::ALL_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| NickelError::IllegalFormat(format!("unknown nickel type '{s}'")))
    }
}

/// Which logical service produced a Nickel. Diagnostic only.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NickelOrigin {
    #[default]
    Unspecified,
    DimeGateway,
    OrcidService,
    DocumentService,
    MetadataService,
    IntegrationSchemaService,
    CsvParser,
    HistoryService,
    TaskService,
    CsvIntegrationService,
    DimeTools,
}

impl NickelOrigin {
    pub const ALL_ORIGINS: [NickelOrigin; 11] = [
        NickelOrigin::Unspecified,
        NickelOrigin::DimeGateway,
        NickelOrigin::OrcidService,
        NickelOrigin::DocumentService,
        NickelOrigin::MetadataService,
        NickelOrigin::IntegrationSchemaService,
        NickelOrigin::CsvParser,
        NickelOrigin::HistoryService,
        NickelOrigin::TaskService,
        NickelOrigin::CsvIntegrationService,
        NickelOrigin::DimeTools,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            NickelOrigin::Unspecified => "UNSPECIFIED",
            NickelOrigin::DimeGateway => "DIME_GATEWAY",
            NickelOrigin::OrcidService => "ORCID_SERVICE",
            NickelOrigin::DocumentService => "DOCUMENT_SERVICE",
            NickelOrigin::MetadataService => "METADATA_SERVICE",
            NickelOrigin::IntegrationSchemaService => "INTEGRATION_SCHEMA_SERVICE",
            NickelOrigin::CsvParser => "CSV_PARSER",
            NickelOrigin::HistoryService => "HISTORY_SERVICE",
            NickelOrigin::TaskService => "TASK_SERVICE",
            NickelOrigin::CsvIntegrationService => "CSV_INTEGRATION_SERVICE",
            NickelOrigin::DimeTools => "DIME_TOOLS",
        }
    }
}

impl fmt::Display for NickelOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NickelOrigin {
    type Err = NickelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NickelOrigin::ALL_ORIGINS
            .iter()
            .copied()
            .find(|o| o.name() == s)
            .ok_or_else(|| NickelError::IllegalFormat(format!("unknown nickel origin '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_types() {
        let terminal: Vec<_> = NickelType::ALL_TYPES
            .iter()
            .filter(|t| t.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![&NickelType::Error, &NickelType::Timeout, &NickelType::Response]
        );
        assert!(!NickelType::Timeout.is_function_exempt());
        assert!(NickelType::Error.is_function_exempt());
        assert!(NickelType::Response.is_function_exempt());
    }

    #[test]
    fn names_parse_back() {
        for t in NickelType::ALL_TYPES {
            assert_eq!(t.name().parse::<NickelType>().unwrap(), t);
        }
        for o in NickelOrigin::ALL_ORIGINS {
            assert_eq!(o.name().parse::<NickelOrigin>().unwrap(), o);
        }
        assert!("BOGUS".parse::<NickelType>().is_err());
        assert!("get".parse::<NickelType>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&NickelType::SchemaCreated).unwrap();
        assert_eq!(json, "\"SCHEMA_CREATED\"");
        let json = serde_json::to_string(&NickelOrigin::CsvParser).unwrap();
        assert_eq!(json, "\"CSV_PARSER\"");
    }

    #[test]
    fn http_method_resolution() {
        assert_eq!(NickelType::from_http_method("GET"), Some(NickelType::Get));
        assert_eq!(NickelType::from_http_method("post"), Some(NickelType::Post));
        assert_eq!(NickelType::from_http_method("PUT"), Some(NickelType::Put));
        assert_eq!(
            NickelType::from_http_method("DELETE"),
            Some(NickelType::Delete)
        );
        assert_eq!(NickelType::from_http_method("PATCH"), None);
    }
}
