//! Table API client over an authenticated session
//!
//! Thin REST plumbing over the ServiceNow Table and Attachment APIs. The
//! client consumes a ready-to-use [`Session`] from `snow-auth` and never
//! re-authenticates; a 401 here surfaces as an API error like any other
//! non-success status.

use std::path::Path;

use reqwest::Method;
use serde_json::Value;
use snow_auth::Session;
use tracing::debug;

use crate::error::{Error, Result};

/// Client for one ServiceNow table.
pub struct TableClient<'a> {
    session: &'a Session,
    table: String,
}

impl<'a> TableClient<'a> {
    pub fn new(session: &'a Session, table: impl Into<String>) -> Self {
        Self {
            session,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fetch all records where `field` equals `value`.
    pub async fn query(&self, field: &str, value: &str) -> Result<Vec<Value>> {
        self.query_with_params(&[("sysparm_query", format!("{field}={value}"))])
            .await
    }

    /// Fetch all records matching arbitrary `sysparm_*` query parameters.
    pub(crate) async fn query_with_params(&self, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let path = format!("/api/now/table/{}", self.table);
        let response = self
            .session
            .get(&path)?
            .query(params)
            .send()
            .await
            .map_err(|e| Error::Http(format!("query failed: {e}")))?;
        let body = read_api_json(response).await?;
        match body.get("result") {
            Some(Value::Array(records)) => Ok(records.clone()),
            _ => Err(Error::UnexpectedResponse(
                "query response has no result array".into(),
            )),
        }
    }

    /// Fetch exactly one record where `field` equals `value`.
    ///
    /// Zero matches is `NoResults`, more than one is `MultipleResults`.
    pub async fn get_one(&self, field: &str, value: &str) -> Result<Value> {
        let mut records = self.query(field, value).await?;
        match records.len() {
            0 => Err(Error::NoResults),
            1 => Ok(records.remove(0)),
            _ => Err(Error::MultipleResults),
        }
    }

    /// Create a record from the given payload and return it.
    pub async fn insert(&self, payload: &Value) -> Result<Value> {
        let path = format!("/api/now/table/{}", self.table);
        debug!(table = %self.table, "inserting record");
        let response = self
            .session
            .post(&path)?
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Http(format!("insert failed: {e}")))?;
        let body = read_api_json(response).await?;
        extract_result(body)
    }

    /// Update the record matched by `field = value` with the payload fields.
    pub async fn update(&self, field: &str, value: &str, payload: &Value) -> Result<Value> {
        let record = self.get_one(field, value).await?;
        let sys_id = record_sys_id(&record)?;
        let path = format!("/api/now/table/{}/{sys_id}", self.table);
        debug!(table = %self.table, sys_id, "updating record");
        let response = self
            .session
            .request(Method::PATCH, &path)?
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Http(format!("update failed: {e}")))?;
        let body = read_api_json(response).await?;
        extract_result(body)
    }

    /// Delete the record matched by `field = value`.
    pub async fn delete(&self, field: &str, value: &str) -> Result<()> {
        let record = self.get_one(field, value).await?;
        let sys_id = record_sys_id(&record)?;
        let path = format!("/api/now/table/{}/{sys_id}", self.table);
        debug!(table = %self.table, sys_id, "deleting record");
        let response = self
            .session
            .request(Method::DELETE, &path)?
            .send()
            .await
            .map_err(|e| Error::Http(format!("delete failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }
        Ok(())
    }

    /// Attach a local file to the record matched by `field = value`.
    ///
    /// The file must exist; that is checked before any network call.
    pub async fn attach(&self, field: &str, value: &str, file: &Path) -> Result<Value> {
        if !file.exists() {
            return Err(Error::AttachmentMissing(file.display().to_string()));
        }
        let contents = std::fs::read(file)
            .map_err(|e| Error::Http(format!("reading attachment {}: {e}", file.display())))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".into());

        let record = self.get_one(field, value).await?;
        let sys_id = record_sys_id(&record)?;
        debug!(table = %self.table, sys_id, file = %file_name, "attaching file");
        let response = self
            .session
            .post("/api/now/attachment/file")?
            .query(&[
                ("table_name", self.table.as_str()),
                ("table_sys_id", sys_id.as_str()),
                ("file_name", file_name.as_str()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(contents)
            .send()
            .await
            .map_err(|e| Error::Http(format!("attachment upload failed: {e}")))?;
        let body = read_api_json(response).await?;
        extract_result(body)
    }
}

/// Raise on non-success status, otherwise parse the JSON body.
async fn read_api_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api { status, body });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| Error::UnexpectedResponse(e.to_string()))
}

fn extract_result(body: Value) -> Result<Value> {
    match body {
        Value::Object(mut fields) => fields
            .remove("result")
            .ok_or_else(|| Error::UnexpectedResponse("response has no result key".into())),
        _ => Err(Error::UnexpectedResponse("response is not an object".into())),
    }
}

fn record_sys_id(record: &Value) -> Result<String> {
    record
        .get("sys_id")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::UnexpectedResponse("record has no sys_id".into()))
}
