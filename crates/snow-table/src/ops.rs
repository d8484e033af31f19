//! Declarative record management
//!
//! Implements the present/absent record semantics on top of [`TableClient`]:
//! create when no lookup number is given, update-or-read when one is, delete
//! for absent. Check mode simulates the effect of each path without issuing
//! any mutating call.

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use snow_auth::{Diagnostics, LogLevel, Session};
use tracing::debug;

use crate::client::TableClient;
use crate::error::{Error, Result};

/// Desired end state for the targeted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Present,
    Absent,
}

/// One record-management request.
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub table: String,
    pub state: RecordState,
    /// Lookup value; absent means "create a new record" under `Present`.
    pub number: Option<String>,
    /// Field the lookup value matches against.
    pub lookup_field: String,
    /// Field values to create or update with.
    pub data: Option<Map<String, Value>>,
    /// Local file to attach after create/update.
    pub attachment: Option<PathBuf>,
    /// Simulate effects without mutating calls.
    pub check_mode: bool,
}

impl RecordRequest {
    pub fn new(table: impl Into<String>, state: RecordState) -> Self {
        Self {
            table: table.into(),
            state,
            number: None,
            lookup_field: "number".into(),
            data: None,
            attachment: None,
            check_mode: false,
        }
    }
}

/// Outcome of one record-management request.
#[derive(Debug, Clone, Default)]
pub struct RecordOutcome {
    pub changed: bool,
    pub record: Option<Value>,
    pub attached_file: Option<Value>,
}

impl RecordOutcome {
    /// Shape the outcome for the invoking framework.
    ///
    /// Always carries `changed`; the merged Okta payloads land under `okta`
    /// when the flow produced any, with the full map only at debug
    /// verbosity (otherwise just the active flag survives).
    pub fn into_result(self, diagnostics: &Diagnostics, log_level: LogLevel) -> Value {
        let mut result = Map::new();
        result.insert("changed".into(), Value::Bool(self.changed));
        if let Some(record) = self.record {
            result.insert("record".into(), record);
        }
        if let Some(attached) = self.attached_file {
            result.insert("attached_file".into(), attached);
        }
        if !diagnostics.is_empty() {
            let okta = match log_level {
                LogLevel::Debug => diagnostics.to_value(),
                _ => {
                    let mut trimmed = Map::new();
                    if let Some(active) = diagnostics.get("active") {
                        trimmed.insert("active".into(), active.clone());
                    }
                    Value::Object(trimmed)
                }
            };
            result.insert("okta".into(), okta);
        }
        Value::Object(result)
    }
}

/// Apply a record request over an established session.
pub async fn apply(session: &Session, request: &RecordRequest) -> Result<RecordOutcome> {
    // Validated up front so check mode and real mode agree on what is a
    // legal request.
    if request.state == RecordState::Absent && request.number.is_none() {
        return Err(Error::InvalidRequest(
            "state absent requires a number".into(),
        ));
    }

    // Attachment existence is checked before anything touches the wire.
    if let Some(attachment) = &request.attachment {
        if !attachment.exists() {
            return Err(Error::AttachmentMissing(attachment.display().to_string()));
        }
    }

    let client = TableClient::new(session, request.table.clone());
    if request.check_mode {
        simulate(&client, request).await
    } else {
        execute(&client, request).await
    }
}

/// Check mode: read-only calls plus local simulation of the effect.
async fn simulate(client: &TableClient<'_>, request: &RecordRequest) -> Result<RecordOutcome> {
    debug!(table = %request.table, "check mode, simulating");
    let Some(number) = &request.number else {
        // Would have created a record; echo the payload as the record.
        return Ok(RecordOutcome {
            changed: true,
            record: Some(Value::Object(request.data.clone().unwrap_or_default())),
            attached_file: None,
        });
    };

    match request.state {
        RecordState::Absent => match client.get_one(&request.lookup_field, number).await {
            Ok(_) => Ok(RecordOutcome {
                changed: true,
                record: Some(json!({"Success": true})),
                attached_file: None,
            }),
            Err(Error::NoResults) => Ok(RecordOutcome::default()),
            Err(e) => Err(e),
        },
        RecordState::Present => {
            let mut record = client.get_one(&request.lookup_field, number).await?;
            let mut changed = false;
            if let (Some(data), Some(fields)) = (&request.data, record.as_object_mut()) {
                for (key, value) in data {
                    fields.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
            Ok(RecordOutcome {
                changed,
                record: Some(record),
                attached_file: None,
            })
        }
    }
}

async fn execute(client: &TableClient<'_>, request: &RecordRequest) -> Result<RecordOutcome> {
    match (request.state, &request.number) {
        // Create
        (RecordState::Present, None) => {
            let payload = Value::Object(request.data.clone().unwrap_or_default());
            let record = client.insert(&payload).await?;
            Ok(RecordOutcome {
                changed: true,
                record: Some(record),
                attached_file: None,
            })
        }

        // Delete; a record that is already gone is not a change
        (RecordState::Absent, Some(number)) => {
            match client.delete(&request.lookup_field, number).await {
                Ok(()) => Ok(RecordOutcome {
                    changed: true,
                    record: Some(json!({"Success": true})),
                    attached_file: None,
                }),
                Err(Error::NoResults) => Ok(RecordOutcome::default()),
                Err(e) => Err(e),
            }
        }

        (RecordState::Absent, None) => Err(Error::InvalidRequest(
            "state absent requires a number".into(),
        )),

        // Update or read, then attach
        (RecordState::Present, Some(number)) => {
            let mut outcome = RecordOutcome::default();
            match &request.data {
                Some(data) => {
                    let record = client
                        .update(
                            &request.lookup_field,
                            number,
                            &Value::Object(data.clone()),
                        )
                        .await?;
                    outcome.changed = true;
                    outcome.record = Some(record);
                }
                None => {
                    outcome.record =
                        Some(client.get_one(&request.lookup_field, number).await?);
                }
            }
            if let Some(attachment) = &request.attachment {
                let attached = client
                    .attach(&request.lookup_field, number, attachment)
                    .await?;
                outcome.changed = true;
                outcome.attached_file = Some(attached);
            }
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use snow_auth::{AuthStrategy, Authenticator, Credentials};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session_for(server: &MockServer) -> Session {
        let credentials = Credentials {
            instance: Some("dev1".into()),
            token: Some("abc".into()),
            ..Credentials::default()
        };
        Authenticator::new(credentials, AuthStrategy::Token)
            .unwrap()
            .with_base_url(server.uri())
            .establish()
            .await
            .unwrap()
            .session
    }

    fn data(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_inserts_and_reports_changed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": {"sys_id": "s_new", "number": "INC0001000"},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Present);
        request.data = Some(data(&[("short_description", json!("test incident"))]));

        let outcome = apply(&session, &request).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.record.unwrap()["number"], "INC0001000");
    }

    #[tokio::test]
    async fn delete_of_absent_record_is_not_a_change() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Absent);
        request.number = Some("9872354".into());

        let outcome = apply(&session, &request).await.unwrap();
        assert!(!outcome.changed);
        assert!(outcome.record.is_none());
    }

    #[tokio::test]
    async fn update_then_attach_marks_changed_and_returns_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"sys_id": "s1", "number": "INC0000055"}],
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/now/table/incident/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"sys_id": "s1", "work_notes": "done"},
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/now/attachment/file"))
            .and(query_param("table_sys_id", "s1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": {"sys_id": "att1", "file_name": "notes.txt"},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"notes").unwrap();

        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Present);
        request.number = Some("INC0000055".into());
        request.data = Some(data(&[("work_notes", json!("done"))]));
        request.attachment = Some(file);

        let outcome = apply(&session, &request).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.attached_file.unwrap()["file_name"], "notes.txt");
    }

    #[tokio::test]
    async fn read_without_data_is_not_a_change() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/now/table/sys_user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"sys_id": "u1", "user_name": "ansible_test"}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let mut request = RecordRequest::new("sys_user", RecordState::Present);
        request.number = Some("u1".into());
        request.lookup_field = "sys_id".into();

        let outcome = apply(&session, &request).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.record.unwrap()["user_name"], "ansible_test");
    }

    #[tokio::test]
    async fn check_mode_create_echoes_data_without_calls() {
        let server = MockServer::start().await;
        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Present);
        request.data = Some(data(&[("priority", json!(2))]));
        request.check_mode = true;

        let outcome = apply(&session, &request).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.record.unwrap()["priority"], 2);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_mode_update_simulates_field_merge_read_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"sys_id": "s1", "priority": 3}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Present);
        request.number = Some("INC0000055".into());
        request.data = Some(data(&[("priority", json!(1))]));
        request.check_mode = true;

        let outcome = apply(&session, &request).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.record.unwrap()["priority"], 1);

        // Only the read happened.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method.as_str(), "GET");
    }

    #[tokio::test]
    async fn check_mode_delete_reports_whether_record_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"sys_id": "s1"}],
            })))
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Absent);
        request.number = Some("INC0000055".into());
        request.check_mode = true;

        let outcome = apply(&session, &request).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.record.unwrap()["Success"], true);
    }

    #[tokio::test]
    async fn absent_without_number_is_rejected_in_both_modes() {
        let server = MockServer::start().await;
        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Absent);
        request.data = Some(data(&[("priority", json!(2))]));

        let err = apply(&session, &request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        request.check_mode = true;
        let err = apply(&session, &request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_attachment_fails_before_network() {
        let server = MockServer::start().await;
        let session = session_for(&server).await;
        let mut request = RecordRequest::new("incident", RecordState::Present);
        request.number = Some("INC0000055".into());
        request.attachment = Some(PathBuf::from("/nonexistent/file.txt"));

        let err = apply(&session, &request).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentMissing(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn result_shape_includes_changed_and_gated_okta_map() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.merge(json!({"active": true, "id_token": "idt", "sub": "user"}));

        let outcome = RecordOutcome {
            changed: true,
            record: Some(json!({"number": "INC1"})),
            attached_file: None,
        };
        let debug = outcome
            .clone()
            .into_result(&diagnostics, LogLevel::Debug);
        assert_eq!(debug["changed"], true);
        assert_eq!(debug["okta"]["sub"], "user");

        let normal = outcome.into_result(&diagnostics, LogLevel::Normal);
        assert_eq!(normal["okta"]["active"], true);
        assert!(normal["okta"].get("sub").is_none());
    }

    #[test]
    fn result_without_diagnostics_has_no_okta_key() {
        let outcome = RecordOutcome::default();
        let result = outcome.into_result(&Diagnostics::new(), LogLevel::Debug);
        assert_eq!(result["changed"], false);
        assert!(result.get("okta").is_none());
    }
}
