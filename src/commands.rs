//! Predefined OLT queries.
//!
//! Builders for the searches an operator runs most: listing ONTs found by
//! autofind, and looking an ONT up by serial number or by description. Only
//! the command text is built here; the appliance's answer is returned
//! verbatim by [`SessionManager::execute`](crate::session::SessionManager::execute).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// A query against a Huawei-style OLT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OltQuery {
    /// ONTs discovered but not yet provisioned.
    Autofind,
    /// ONT lookup by serial number.
    BySerial(String),
    /// ONT lookup by description.
    ByDescription(String),
}

impl OltQuery {
    /// Renders the CLI command for this query.
    pub fn to_command(&self) -> Result<String, SessionError> {
        match self {
            OltQuery::Autofind => Ok("display ont autofind all".to_string()),
            OltQuery::BySerial(sn) => {
                let sn = argument("serial number", sn)?;
                if sn.contains(char::is_whitespace) {
                    return Err(SessionError::InvalidCommandError(format!(
                        "serial number {sn:?} contains whitespace"
                    )));
                }
                Ok(format!("display ont info by-sn {sn}"))
            }
            OltQuery::ByDescription(desc) => {
                let desc = argument("description", desc)?;
                Ok(format!("display ont info by-desc {desc}"))
            }
        }
    }
}

fn argument<'a>(what: &str, value: &'a str) -> Result<&'a str, SessionError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SessionError::InvalidCommandError(format!("empty {what}")));
    }
    if value.contains(['\r', '\n']) {
        return Err(SessionError::InvalidCommandError(format!(
            "{what} {value:?} contains a line break"
        )));
    }
    Ok(value)
}
