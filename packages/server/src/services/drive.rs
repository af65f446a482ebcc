use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use super::google::{AuthError, ServiceAccountTokens};

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn tokio::io::AsyncRead + Unpin + Send>;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("drive file not found: {0}")]
    NotFound(String),
    #[error("drive api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("file read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata subset we care about for an uploaded file.
#[derive(Debug, Clone, Default)]
pub struct DriveFileMeta {
    pub id: String,
    pub name: String,
    pub size: Option<i64>,
    pub mime_type: Option<String>,
    pub web_view_link: Option<String>,
    pub web_content_link: Option<String>,
    pub thumbnail_link: Option<String>,
}

/// Thin surface over the Drive v3 REST calls the gateway composes.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Finds a non-trashed child folder by exact name.
    async fn find_child_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<String>, DriveError>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, DriveError>;

    /// Uploads content and returns the new file id.
    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, DriveError>;

    /// Grants "anyone with the link can read" on the file.
    async fn allow_public_read(&self, file_id: &str) -> Result<(), DriveError>;

    async fn metadata(&self, file_id: &str) -> Result<DriveFileMeta, DriveError>;

    async fn download(&self, file_id: &str) -> Result<BoxReader, DriveError>;

    /// Hard-deletes a file. A missing file surfaces as `NotFound`.
    async fn delete(&self, file_id: &str) -> Result<(), DriveError>;
}

/// Result of an uploaded file after it has been made public.
#[derive(Debug, Clone)]
pub struct DriveUpload {
    pub file_id: String,
    pub name: String,
    pub size: Option<i64>,
    pub mime_type: String,
    pub web_view_link: Option<String>,
    pub web_content_link: Option<String>,
    pub thumbnail_link: Option<String>,
    /// Universal viewer URL, good for `<img>` tags.
    pub public_view_url: String,
    /// Stable, cacheable CDN thumbnail link.
    pub public_thumb_url: String,
}

/// Outcome of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The file was already gone; treated as success.
    AlreadyGone,
}

/// Stable CDN thumbnail link derived purely from the file id.
pub fn cdn_thumb_url(file_id: &str) -> String {
    format!("https://lh3.googleusercontent.com/d/{file_id}=w800")
}

/// Universal viewer URL for a public Drive file.
pub fn public_view_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?id={file_id}&export=view")
}

/// External-file operations composed over a [`DriveApi`].
pub struct DriveGateway {
    api: Arc<dyn DriveApi>,
    root_folder_id: String,
}

impl DriveGateway {
    pub fn new(api: Arc<dyn DriveApi>, root_folder_id: &str) -> Self {
        Self {
            api,
            root_folder_id: root_folder_id.to_string(),
        }
    }

    /// Idempotently walks/creates a folder chain from the root, one segment
    /// per hierarchy level, skipping blank segments. Returns the deepest
    /// folder id.
    pub async fn ensure_folder_path(&self, segments: &[String]) -> Result<String, DriveError> {
        let mut parent_id = self.root_folder_id.clone();

        for raw in segments {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            parent_id = match self.api.find_child_folder(&parent_id, name).await? {
                Some(id) => id,
                None => self.api.create_folder(&parent_id, name).await?,
            };
        }
        Ok(parent_id)
    }

    /// Uploads a local file, makes it publicly readable and re-fetches its
    /// metadata so thumbnails work without auth.
    pub async fn upload_file(
        &self,
        folder_id: &str,
        local_path: &Path,
        file_name: Option<&str>,
        mime_override: Option<&str>,
    ) -> Result<DriveUpload, DriveError> {
        let name = file_name
            .map(str::to_string)
            .or_else(|| {
                local_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_override
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(local_path)
                    .first_or_octet_stream()
                    .to_string()
            });

        let content = tokio::fs::read(local_path).await?;
        let file_id = self.api.upload(folder_id, &name, &mime, content).await?;
        self.api.allow_public_read(&file_id).await?;
        let meta = self.api.metadata(&file_id).await?;

        Ok(DriveUpload {
            public_view_url: public_view_url(&file_id),
            public_thumb_url: cdn_thumb_url(&file_id),
            file_id,
            name: meta.name,
            size: meta.size,
            mime_type: meta.mime_type.unwrap_or(mime),
            web_view_link: meta.web_view_link,
            web_content_link: meta.web_content_link,
            thumbnail_link: meta.thumbnail_link,
        })
    }

    /// Resolves the mime type and opens a one-shot content stream.
    pub async fn download(&self, file_id: &str) -> Result<(Option<String>, BoxReader), DriveError> {
        let meta = self.api.metadata(file_id).await?;
        let reader = self.api.download(file_id).await?;
        Ok((meta.mime_type, reader))
    }

    /// Idempotent hard delete: an already-removed file counts as success.
    pub async fn delete_file(&self, file_id: &str) -> Result<DeleteOutcome, DriveError> {
        match self.api.delete(file_id).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(DriveError::NotFound(_)) => Ok(DeleteOutcome::AlreadyGone),
            Err(err) => Err(err),
        }
    }
}

#[derive(Deserialize)]
struct FileId {
    id: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetaBody {
    id: String,
    name: String,
    size: Option<String>,
    mime_type: Option<String>,
    web_view_link: Option<String>,
    web_content_link: Option<String>,
    thumbnail_link: Option<String>,
}

/// Drive v3 REST implementation authenticated as the service account.
pub struct GoogleDriveApi {
    http: reqwest::Client,
    tokens: Arc<ServiceAccountTokens>,
}

impl GoogleDriveApi {
    pub fn new(http: reqwest::Client, tokens: Arc<ServiceAccountTokens>) -> Self {
        Self { http, tokens }
    }

    async fn check(
        response: reqwest::Response,
        file_id: &str,
    ) -> Result<reqwest::Response, DriveError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DriveError::NotFound(file_id.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(DriveError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DriveApi for GoogleDriveApi {
    async fn find_child_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<String>, DriveError> {
        let token = self.tokens.bearer().await?;
        let q = format!(
            "'{parent_id}' in parents and mimeType = '{FOLDER_MIME}' and name = '{}' and trashed = false",
            name.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let response = self
            .http
            .get(FILES_URL)
            .bearer_auth(token)
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id, name)"),
                ("pageSize", "1"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;

        let body: FileList = Self::check(response, parent_id).await?.json().await?;
        Ok(body.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, DriveError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .post(FILES_URL)
            .bearer_auth(token)
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&serde_json::json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent_id],
            }))
            .send()
            .await?;

        let body: FileId = Self::check(response, parent_id).await?.json().await?;
        Ok(body.id)
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, DriveError> {
        let token = self.tokens.bearer().await?;
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": mime_type,
            "parents": [folder_id],
        });

        // Drive's multipart upload wants multipart/related, which reqwest's
        // form support does not produce; assemble the body by hand.
        let boundary = format!("creativehub-{}", uuid::Uuid::new_v4());
        let mut body = Vec::with_capacity(content.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(&content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        let body: FileId = Self::check(response, folder_id).await?.json().await?;
        Ok(body.id)
    }

    async fn allow_public_read(&self, file_id: &str) -> Result<(), DriveError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .post(format!("{FILES_URL}/{file_id}/permissions"))
            .bearer_auth(token)
            .query(&[("supportsAllDrives", "true")])
            .json(&serde_json::json!({
                "role": "reader",
                "type": "anyone",
                "allowFileDiscovery": false,
            }))
            .send()
            .await?;

        Self::check(response, file_id).await?;
        Ok(())
    }

    async fn metadata(&self, file_id: &str) -> Result<DriveFileMeta, DriveError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .get(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(token)
            .query(&[
                (
                    "fields",
                    "id,name,size,mimeType,webViewLink,webContentLink,thumbnailLink",
                ),
                ("supportsAllDrives", "true"),
            ])
            .send()
            .await?;

        let body: FileMetaBody = Self::check(response, file_id).await?.json().await?;
        Ok(DriveFileMeta {
            id: body.id,
            name: body.name,
            size: body.size.and_then(|s| s.parse().ok()),
            mime_type: body.mime_type,
            web_view_link: body.web_view_link,
            web_content_link: body.web_content_link,
            thumbnail_link: body.thumbnail_link,
        })
    }

    async fn download(&self, file_id: &str) -> Result<BoxReader, DriveError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .get(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        let response = Self::check(response, file_id).await?;
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn delete(&self, file_id: &str) -> Result<(), DriveError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .delete(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await?;

        Self::check(response, file_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory folder tree + file set standing in for Drive.
    #[derive(Default)]
    struct FakeDrive {
        // (parent_id, name) -> folder id
        folders: Mutex<HashMap<(String, String), String>>,
        files: Mutex<HashSet<String>>,
        creates: AtomicUsize,
        uploads: AtomicUsize,
        permissions: Mutex<Vec<String>>,
        next_id: AtomicUsize,
    }

    impl FakeDrive {
        fn mint_id(&self, prefix: &str) -> String {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            format!("{prefix}-{n}")
        }
    }

    #[async_trait]
    impl DriveApi for FakeDrive {
        async fn find_child_folder(
            &self,
            parent_id: &str,
            name: &str,
        ) -> Result<Option<String>, DriveError> {
            Ok(self
                .folders
                .lock()
                .unwrap()
                .get(&(parent_id.to_string(), name.to_string()))
                .cloned())
        }

        async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, DriveError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let id = self.mint_id("folder");
            self.folders
                .lock()
                .unwrap()
                .insert((parent_id.to_string(), name.to_string()), id.clone());
            Ok(id)
        }

        async fn upload(
            &self,
            _folder_id: &str,
            _name: &str,
            _mime_type: &str,
            _content: Vec<u8>,
        ) -> Result<String, DriveError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            let id = self.mint_id("file");
            self.files.lock().unwrap().insert(id.clone());
            Ok(id)
        }

        async fn allow_public_read(&self, file_id: &str) -> Result<(), DriveError> {
            self.permissions.lock().unwrap().push(file_id.to_string());
            Ok(())
        }

        async fn metadata(&self, file_id: &str) -> Result<DriveFileMeta, DriveError> {
            if !self.files.lock().unwrap().contains(file_id) {
                return Err(DriveError::NotFound(file_id.to_string()));
            }
            Ok(DriveFileMeta {
                id: file_id.to_string(),
                name: "asset.png".to_string(),
                size: Some(4),
                mime_type: Some("image/png".to_string()),
                web_view_link: Some(format!("https://drive.google.com/file/d/{file_id}/view")),
                web_content_link: None,
                thumbnail_link: None,
            })
        }

        async fn download(&self, file_id: &str) -> Result<BoxReader, DriveError> {
            if !self.files.lock().unwrap().contains(file_id) {
                return Err(DriveError::NotFound(file_id.to_string()));
            }
            Ok(Box::new(std::io::Cursor::new(b"data".to_vec())))
        }

        async fn delete(&self, file_id: &str) -> Result<(), DriveError> {
            if self.files.lock().unwrap().remove(file_id) {
                Ok(())
            } else {
                Err(DriveError::NotFound(file_id.to_string()))
            }
        }
    }

    fn segments(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn folder_walk_creates_each_level_once() {
        let api = Arc::new(FakeDrive::default());
        let gateway = DriveGateway::new(api.clone(), "root");

        let first = gateway
            .ensure_folder_path(&segments(&["Grade 9", "Chemistry", "3"]))
            .await
            .unwrap();
        assert_eq!(api.creates.load(Ordering::SeqCst), 3);

        // The same path again reuses every folder.
        let second = gateway
            .ensure_folder_path(&segments(&["Grade 9", "Chemistry", "3"]))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(api.creates.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn blank_segments_are_skipped() {
        let api = Arc::new(FakeDrive::default());
        let gateway = DriveGateway::new(api.clone(), "root");

        gateway
            .ensure_folder_path(&segments(&["Grade 9", "  ", "", "Chemistry"]))
            .await
            .unwrap();
        assert_eq!(api.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_blank_segments_resolve_to_the_root() {
        let api = Arc::new(FakeDrive::default());
        let gateway = DriveGateway::new(api, "root");

        let id = gateway.ensure_folder_path(&segments(&["", " "])).await.unwrap();
        assert_eq!(id, "root");
    }

    #[tokio::test]
    async fn upload_publicizes_and_derives_links() {
        let api = Arc::new(FakeDrive::default());
        let gateway = DriveGateway::new(api.clone(), "root");

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PNG!").unwrap();

        let upload = gateway
            .upload_file(
                "folder-1",
                tmp.path(),
                Some("photo.png"),
                Some("image/png"),
            )
            .await
            .unwrap();

        assert_eq!(api.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(
            *api.permissions.lock().unwrap(),
            vec![upload.file_id.clone()]
        );
        assert_eq!(upload.mime_type, "image/png");
        assert_eq!(
            upload.public_thumb_url,
            format!("https://lh3.googleusercontent.com/d/{}=w800", upload.file_id)
        );
        assert_eq!(
            upload.public_view_url,
            format!(
                "https://drive.google.com/uc?id={}&export=view",
                upload.file_id
            )
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let api = Arc::new(FakeDrive::default());
        let gateway = DriveGateway::new(api.clone(), "root");
        let file_id = api
            .upload("folder", "x.png", "image/png", vec![])
            .await
            .unwrap();

        assert_eq!(
            gateway.delete_file(&file_id).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            gateway.delete_file(&file_id).await.unwrap(),
            DeleteOutcome::AlreadyGone
        );
    }
}
