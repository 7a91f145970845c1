//! Wire types for the remote update agent's JSON protocol.
//!
//! A request is a single JSON object posted over loopback HTTP; the reply is a
//! JSON object whose `code` field is the only success discriminator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Info,
    Restart,
    Update,
}

/// Request body sent to the remote update agent.
///
/// Fields that do not apply to the action are left out of the JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUpdateRequest {
    action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update_folder: Option<String>,
}

impl RemoteUpdateRequest {
    pub fn info() -> Self {
        Self {
            action: Action::Info,
            name: None,
            path: None,
            update_file: None,
            update_folder: None,
        }
    }

    pub fn restart(name: &str) -> Self {
        Self {
            action: Action::Restart,
            name: Some(name.to_string()),
            ..Self::info()
        }
    }

    pub fn update(name: &str, path: &str, update_file: &str, update_folder: &str) -> Self {
        Self {
            action: Action::Update,
            name: Some(name.to_string()),
            path: Some(path.to_string()),
            update_file: Some(update_file.to_string()),
            update_folder: Some(update_folder.to_string()),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Decoded reply of the remote update agent.
///
/// `code == 0` means success; otherwise `error` holds a non-empty,
/// user-facing message. Fields the agent sends beyond these are kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteUpdateResult {
    pub code: i64,
    pub error: String,
    pub interactive: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reply as it arrives: only `code` is mandatory
#[derive(Debug, Deserialize)]
struct PartialResult {
    code: i64,
    error: Option<String>,
    interactive: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RemoteUpdateResult {
    /// Starting point for an `info` exchange: interactive unless the agent says otherwise
    pub fn info_defaults() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }

    /// Apply the fields present in `body` on top of `self`.
    ///
    /// Fields the agent omitted keep their current value.
    pub fn merge_json(mut self, body: &[u8]) -> Result<Self> {
        let partial: PartialResult = serde_json::from_slice(body)
            .map_err(|e| Error::Protocol(format!("invalid response body: {}", e)))?;

        self.code = partial.code;
        if let Some(error) = partial.error {
            self.error = error;
        }
        if let Some(interactive) = partial.interactive {
            self.interactive = interactive;
        }
        self.extra.extend(partial.extra);

        if self.code != 0 && self.error.is_empty() {
            self.error = format!("remote agent reported failure (code {})", self.code);
        }
        Ok(self)
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// `Ok(self)` on success, the agent's message as [`Error::Remote`] otherwise.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Remote(self.error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_request_has_no_identifying_fields() {
        let json = serde_json::to_value(RemoteUpdateRequest::info()).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "info" }));
    }

    #[test]
    fn test_restart_request() {
        let json = serde_json::to_value(RemoteUpdateRequest::restart("panel")).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "restart", "name": "panel" }));
    }

    #[test]
    fn test_update_request_uses_camel_case() {
        let req = RemoteUpdateRequest::update("panel", "/opt/panel", "panel.tar.gz", "/tmp/upd");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "update",
                "name": "panel",
                "path": "/opt/panel",
                "updateFile": "panel.tar.gz",
                "updateFolder": "/tmp/upd",
            })
        );
        assert_eq!(req.action(), Action::Update);
        assert_eq!(req.name(), Some("panel"));
    }

    #[test]
    fn test_merge_keeps_default_when_field_omitted() {
        let result = RemoteUpdateResult::info_defaults()
            .merge_json(br#"{"code":0}"#)
            .unwrap();
        assert!(result.interactive);
        assert!(result.is_success());
    }

    #[test]
    fn test_merge_overrides_default_when_field_present() {
        let result = RemoteUpdateResult::info_defaults()
            .merge_json(br#"{"code":0,"interactive":false}"#)
            .unwrap();
        assert!(!result.interactive);
    }

    #[test]
    fn test_merge_keeps_extra_fields() {
        let result = RemoteUpdateResult::default()
            .merge_json(br#"{"code":0,"version":"1.4.2"}"#)
            .unwrap();
        assert_eq!(result.extra["version"], "1.4.2");
    }

    #[test]
    fn test_failure_carries_agent_message() {
        let err = RemoteUpdateResult::default()
            .merge_json(br#"{"code":1,"error":"busy"}"#)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(err, Error::Remote(ref msg) if msg == "busy"));
        assert_eq!(err.to_string(), "busy");
    }

    #[test]
    fn test_failure_without_message_gets_one() {
        let result = RemoteUpdateResult::default()
            .merge_json(br#"{"code":7}"#)
            .unwrap();
        assert_eq!(result.error, "remote agent reported failure (code 7)");
    }

    #[test]
    fn test_missing_code_is_protocol_error() {
        let err = RemoteUpdateResult::default()
            .merge_json(br#"{"error":"busy"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_non_json_is_protocol_error() {
        let err = RemoteUpdateResult::default()
            .merge_json(b"<html>oops</html>")
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
