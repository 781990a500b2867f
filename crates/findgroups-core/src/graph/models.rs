//! Microsoft Graph payloads consumed by the listings.

use serde::{Deserialize, Serialize};

/// A directory object (group, directory role, ...) as returned by Graph.
///
/// Only `id` is printed; the rest is kept for debug logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
    /// Object id.
    pub id: String,
    /// `#microsoft.graph.group`, `#microsoft.graph.directoryRole`, ...
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    /// Display name, when selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// The subset of `/me` used to resolve the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Principal name, e.g. `ada@contoso.com`.
    pub user_principal_name: String,
    /// Object id.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A Graph collection page: `{"value": [...], "@odata.nextLink": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Graph error envelope: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Human-readable message for a Graph error body, falling back to the raw text.
pub(crate) fn graph_error_message(body: &str) -> String {
    match serde_json::from_str::<GraphErrorBody>(body) {
        Ok(GraphErrorBody {
            error: GraphErrorDetail { code, message },
        }) if !code.is_empty() => format!("{code}: {message}"),
        Ok(GraphErrorBody { error }) => error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_without_value_is_empty() {
        let page: ODataPage<String> = serde_json::from_str("{}").expect("parse");
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn directory_object_reads_odata_type() {
        let page: ODataPage<DirectoryObject> = serde_json::from_str(
            r##"{
                "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#directoryObjects",
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/groups?$skiptoken=X",
                "value": [
                    {"@odata.type": "#microsoft.graph.group", "id": "g1", "displayName": "Eng"},
                    {"id": "g2"}
                ]
            }"##,
        )
        .expect("parse");
        assert_eq!(page.value.len(), 2);
        assert_eq!(page.value[0].odata_type.as_deref(), Some("#microsoft.graph.group"));
        assert_eq!(page.value[0].display_name.as_deref(), Some("Eng"));
        assert_eq!(page.value[1].id, "g2");
        assert!(page.next_link.is_some_and(|l| l.contains("skiptoken")));
    }

    #[test]
    fn error_message_prefers_graph_envelope() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'x' does not exist."}}"#;
        assert_eq!(
            graph_error_message(body),
            "Request_ResourceNotFound: Resource 'x' does not exist."
        );
        assert_eq!(graph_error_message("  plain  "), "plain");
    }
}
