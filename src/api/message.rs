//! Purpose: Define the JSON envelopes exchanged with the host plugin.
//! Exports: `Request`, `Response`, `PluginKind`, `RefreshCommand`, `Notification`.
//! Role: Typed view of both wire protocols; framing lives in `core::frame`.
//! Invariants: Field names match the host contract byte-for-byte.
//! Invariants: Notification parsing never fails; unrecognized input degrades
//! to `Unknown`/`Invalid` so the stream keeps flowing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const ROUTE_GET_DATA_FOLDER: &str = "get_data_folder";
pub const ROUTE_LOAD_PLUGIN: &str = "load_plugin";

/// Plugin source the host loads from; only user plugins are deployed here.
pub const PLUGIN_SOURCE_USER: &str = "user";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub route: String,
    pub data: Value,
}

impl Request {
    pub fn new(route: impl Into<String>, data: Value) -> Self {
        Self {
            route: route.into(),
            data,
        }
    }

    pub fn get_data_folder() -> Self {
        Self::new(ROUTE_GET_DATA_FOLDER, Value::Object(Map::new()))
    }

    pub fn load_plugin(id: &str, kind: PluginKind) -> Self {
        Self::new(
            ROUTE_LOAD_PLUGIN,
            json!({
                "id": id,
                "source": PLUGIN_SOURCE_USER,
                "type": kind.as_str(),
            }),
        )
    }
}

/// How a deployed plugin is laid out in the host's `Plugins` directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Folder,
    Zip,
}

impl PluginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginKind::Folder => "folder",
            PluginKind::Zip => "zip",
        }
    }
}

/// Reply to a single-response request. An empty `error` means success.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub data: String,
}

impl Response {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            data: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RefreshCommand {
    pub extra: bool,
    pub filter: bool,
    pub title: bool,
}

impl RefreshCommand {
    pub const COMMAND: &'static str = "refresh";

    pub fn to_value(self) -> Value {
        json!({
            "command": Self::COMMAND,
            "extra": self.extra,
            "filter": self.filter,
            "title": self.title,
        })
    }
}

impl Serialize for RefreshCommand {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Log {
        message: String,
    },
    Filter {
        pattern: String,
        folder: String,
    },
    Error {
        message: String,
    },
    Success {
        message: String,
        files: Option<Value>,
        folders: Option<Value>,
    },
    /// `status` missing or not one this client knows.
    Unknown {
        status: Option<String>,
        raw: Value,
    },
    /// Known `status` without the fields it requires.
    Invalid {
        status: String,
        detail: String,
        raw: Value,
    },
}

impl Notification {
    pub fn from_value(raw: Value) -> Self {
        let status = raw.get("status").and_then(Value::as_str).map(str::to_string);
        let Some(status) = status else {
            return Notification::Unknown { status: None, raw };
        };

        match status.as_str() {
            "log" => Notification::Log {
                message: text_field(&raw, "message"),
            },
            "error" => Notification::Error {
                message: text_field(&raw, "message"),
            },
            "filter" => {
                let pattern = raw.get("pattern").and_then(Value::as_str);
                let folder = raw.get("folder").and_then(Value::as_str);
                match (pattern, folder) {
                    (Some(pattern), Some(folder)) => Notification::Filter {
                        pattern: pattern.to_string(),
                        folder: folder.to_string(),
                    },
                    _ => Notification::Invalid {
                        status,
                        detail: "filter notification requires string `pattern` and `folder`"
                            .to_string(),
                        raw,
                    },
                }
            }
            "success" => Notification::Success {
                message: text_field(&raw, "message"),
                files: present(raw.get("files")),
                folders: present(raw.get("folders")),
            },
            _ => Notification::Unknown {
                status: Some(status),
                raw,
            },
        }
    }
}

fn text_field(raw: &Value, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|value| !value.is_null()).cloned()
}

#[cfg(test)]
mod tests {
    use super::{Notification, PluginKind, RefreshCommand, Request, Response};
    use serde_json::json;

    #[test]
    fn load_plugin_request_matches_host_contract() {
        let request = Request::load_plugin("Dashboard", PluginKind::Zip);
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(
            value,
            json!({
                "route": "load_plugin",
                "data": {"id": "Dashboard", "source": "user", "type": "zip"}
            })
        );
    }

    #[test]
    fn get_data_folder_sends_empty_object() {
        let value = serde_json::to_value(Request::get_data_folder()).expect("encode");
        assert_eq!(value, json!({"route": "get_data_folder", "data": {}}));
    }

    #[test]
    fn response_fields_default_to_empty() {
        let response: Response = serde_json::from_value(json!({"data": "C:\\Op"})).expect("decode");
        assert!(response.is_ok());
        assert_eq!(response.data, "C:\\Op");

        let failed: Response = serde_json::from_value(json!({"error": "E"})).expect("decode");
        assert!(!failed.is_ok());
        assert_eq!(failed.data, "");
    }

    #[test]
    fn refresh_command_uses_canonical_field_names() {
        let command = RefreshCommand {
            extra: true,
            filter: false,
            title: true,
        };
        let value = serde_json::to_value(command).expect("encode");
        assert_eq!(
            value,
            json!({"command": "refresh", "extra": true, "filter": false, "title": true})
        );
    }

    #[test]
    fn notifications_parse_by_status() {
        assert_eq!(
            Notification::from_value(json!({"status": "log", "message": "WARN: x"})),
            Notification::Log {
                message: "WARN: x".to_string()
            }
        );
        assert_eq!(
            Notification::from_value(json!({
                "status": "filter",
                "pattern": "*.bak",
                "folder": "Media/Old"
            })),
            Notification::Filter {
                pattern: "*.bak".to_string(),
                folder: "Media/Old".to_string()
            }
        );
        assert_eq!(
            Notification::from_value(json!({"status": "error"})),
            Notification::Error {
                message: String::new()
            }
        );
        assert_eq!(
            Notification::from_value(json!({"status": "success", "message": "done", "files": 3})),
            Notification::Success {
                message: "done".to_string(),
                files: Some(json!(3)),
                folders: None,
            }
        );
    }

    #[test]
    fn unrecognized_status_falls_back() {
        let raw = json!({"status": "bogus", "x": 1});
        assert_eq!(
            Notification::from_value(raw.clone()),
            Notification::Unknown {
                status: Some("bogus".to_string()),
                raw
            }
        );

        let missing = json!({"message": "no status"});
        assert!(matches!(
            Notification::from_value(missing),
            Notification::Unknown { status: None, .. }
        ));
    }

    #[test]
    fn filter_without_folder_is_invalid() {
        let parsed = Notification::from_value(json!({"status": "filter", "pattern": "*.tmp"}));
        assert!(matches!(parsed, Notification::Invalid { ref status, .. } if status == "filter"));
    }
}
