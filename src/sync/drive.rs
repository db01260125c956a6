//! Remote folder/file surface and its Drive v3 implementation.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::auth::SharedToken;
use super::SyncError;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const MARKDOWN_MIME: &str = "text/markdown; charset=UTF-8";
const BOUNDARY: &str = "strata_multipart_boundary";

/// Search, create and update over a hierarchical remote store.
///
/// `parent == None` means the store's root.
#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn find_folder(&self, name: &str, parent: Option<&str>) -> Result<Option<String>, SyncError>;
    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String, SyncError>;
    async fn find_file(&self, name: &str, folder_id: &str) -> Result<Option<String>, SyncError>;
    async fn create_file(&self, name: &str, folder_id: &str, body: &str) -> Result<String, SyncError>;
    async fn update_file(&self, file_id: &str, body: &str) -> Result<(), SyncError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct HttpDrive {
    http: Client,
    api_key: String,
    token: SharedToken,
}

impl HttpDrive {
    pub fn new(http: Client, api_key: impl Into<String>, token: SharedToken) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            token,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, SyncError> {
        let token = self.token.read().clone().ok_or(SyncError::NotConnected)?;
        Ok(request
            .bearer_auth(token)
            .query(&[("key", self.api_key.as_str())]))
    }

    async fn search(&self, query: String) -> Result<Option<String>, SyncError> {
        let request = self.http.get(FILES_URL).query(&[
            ("q", query.as_str()),
            ("fields", "files(id, name)"),
            ("spaces", "drive"),
        ]);
        let response = check_status(self.authorized(request)?.send().await?).await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|err| SyncError::Malformed(err.to_string()))?;
        Ok(list.files.into_iter().next().map(|file| file.id))
    }
}

#[async_trait]
impl DriveApi for HttpDrive {
    async fn find_folder(&self, name: &str, parent: Option<&str>) -> Result<Option<String>, SyncError> {
        self.search(folder_query(name, parent)).await
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String, SyncError> {
        let metadata = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME),
            parents: vec![parent.unwrap_or("root")],
        };
        let request = self
            .http
            .post(FILES_URL)
            .query(&[("fields", "id")])
            .json(&metadata);
        let response = check_status(self.authorized(request)?.send().await?).await?;
        let created: DriveFile = response
            .json()
            .await
            .map_err(|err| SyncError::Malformed(err.to_string()))?;
        tracing::debug!(folder = name, id = %created.id, "remote folder created");
        Ok(created.id)
    }

    async fn find_file(&self, name: &str, folder_id: &str) -> Result<Option<String>, SyncError> {
        self.search(file_query(name, folder_id)).await
    }

    async fn create_file(&self, name: &str, folder_id: &str, body: &str) -> Result<String, SyncError> {
        let metadata = FileMetadata {
            name,
            mime_type: None,
            parents: vec![folder_id],
        };
        let metadata =
            serde_json::to_string(&metadata).map_err(|err| SyncError::Malformed(err.to_string()))?;
        let request = self
            .http
            .post(UPLOAD_URL)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(multipart_body(BOUNDARY, &metadata, body));
        let response = check_status(self.authorized(request)?.send().await?).await?;
        let created: DriveFile = response
            .json()
            .await
            .map_err(|err| SyncError::Malformed(err.to_string()))?;
        Ok(created.id)
    }

    async fn update_file(&self, file_id: &str, body: &str) -> Result<(), SyncError> {
        let request = self
            .http
            .patch(format!("{UPLOAD_URL}/{file_id}"))
            .query(&[("uploadType", "media")])
            .header(CONTENT_TYPE, MARKDOWN_MIME)
            .body(body.to_string());
        check_status(self.authorized(request)?.send().await?).await?;
        Ok(())
    }
}

/// Maps non-success responses onto [`SyncError`], preferring the API's own message.
pub(crate) async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|envelope| envelope.error.message)
        .unwrap_or(text);
    match status {
        StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized(message)),
        _ => Err(SyncError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn folder_query(name: &str, parent: Option<&str>) -> String {
    format!(
        "name = '{}' and mimeType = '{FOLDER_MIME}' and '{}' in parents and trashed = false",
        escape_query(name),
        escape_query(parent.unwrap_or("root"))
    )
}

fn file_query(name: &str, folder_id: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and mimeType != '{FOLDER_MIME}' and trashed = false",
        escape_query(name),
        escape_query(folder_id)
    )
}

fn multipart_body(boundary: &str, metadata_json: &str, body: &str) -> String {
    format!(
        "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata_json}\r\n\
         --{boundary}\r\nContent-Type: {MARKDOWN_MIME}\r\n\r\n{body}\r\n\
         --{boundary}--"
    )
}
