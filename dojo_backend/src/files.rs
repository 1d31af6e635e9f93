use crate::config::{DojoPaths, FileConfig};
use crate::database::models::{ImageRecord, StoredBlobRecord};
use crate::database::repositories::FileRepository;
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::utils::now_millis;
use anyhow::Context;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

pub const UPLOAD_PATH_PREFIX: &str = "/storage/upload";

/// Blob storage for blog images: one-time upload tokens, content-addressed
/// checksums, and files kept under the blobs directory.
#[derive(Clone)]
pub struct ImageService {
    database: Database,
    paths: DojoPaths,
    max_upload_bytes: u64,
}

impl ImageService {
    pub fn new(database: Database, paths: DojoPaths, file: &FileConfig) -> Self {
        Self {
            database,
            paths,
            max_upload_bytes: file.max_upload_bytes,
        }
    }

    /// Issues a token that authorizes exactly one upload.
    pub fn issue_upload_url(&self) -> ForumResult<UploadTicket> {
        let token = Uuid::new_v4().simple().to_string();
        self.database.with_repositories(|repos| {
            repos.files().issue_upload_token(&token, now_millis())?;
            Ok(())
        })?;
        Ok(UploadTicket {
            upload_url: format!("{UPLOAD_PATH_PREFIX}/{token}"),
            token,
        })
    }

    /// Writes `data` to disk, then spends `token` and records the blob in one
    /// transaction. The file is removed again when the token is unknown or
    /// already spent. The stored MIME type is the declared one when present,
    /// otherwise sniffed from the bytes.
    pub async fn store_upload(&self, input: StoreUploadInput) -> ForumResult<StoredBlobView> {
        if input.data.is_empty() {
            return Err(ForumError::invalid("upload may not be empty"));
        }
        if input.data.len() as u64 > self.max_upload_bytes {
            return Err(ForumError::invalid(format!(
                "upload exceeds {} bytes",
                self.max_upload_bytes
            )));
        }

        let storage_id = Uuid::new_v4().to_string();
        let absolute_path = self.paths.blobs_dir.join(&storage_id);
        fs::create_dir_all(&self.paths.blobs_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create blob directory {}",
                    self.paths.blobs_dir.display()
                )
            })?;
        fs::write(&absolute_path, &input.data)
            .await
            .with_context(|| format!("failed to write blob to {}", absolute_path.display()))?;

        let mut hasher = Hasher::new();
        hasher.update(&input.data);
        let checksum = format!("blake3:{}", hasher.finalize().to_hex());
        let mime = input
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .or_else(|| infer::get(&input.data).map(|kind| kind.mime_type().to_string()));

        let record = StoredBlobRecord {
            id: storage_id,
            path: absolute_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string(),
            mime,
            size_bytes: input.data.len() as i64,
            checksum,
            created_at: now_millis(),
        };
        let committed = self.database.with_transaction(|repos| {
            let files = repos.files();
            if files.consume_upload_token(&input.token, now_millis())? == 0 {
                return Err(ForumError::not_found("upload token unknown or already used").into());
            }
            files.insert_blob(&record)?;
            Ok(())
        });
        if let Err(err) = committed {
            if let Err(cleanup) = fs::remove_file(&absolute_path).await {
                tracing::warn!(
                    path = %absolute_path.display(),
                    error = %cleanup,
                    "failed to remove unclaimed blob"
                );
            }
            return Err(err.into());
        }

        tracing::info!(
            storage_id = %record.id,
            size_bytes = record.size_bytes,
            mime = record.mime.as_deref().unwrap_or("unknown"),
            "blob stored"
        );
        Ok(StoredBlobView::from_record(record))
    }

    pub async fn prepare_download(&self, storage_id: &str) -> ForumResult<BlobDownload> {
        let record = self.database.with_repositories(|repos| {
            let record = repos.files().get_blob(storage_id)?;
            Ok(record)
        })?;
        let Some(record) = record else {
            return Err(ForumError::not_found("blob not found"));
        };
        let absolute_path = self.paths.blobs_dir.join(&record.path);
        if fs::metadata(&absolute_path).await.is_err() {
            tracing::warn!(path = %absolute_path.display(), "blob missing on disk");
            return Err(ForumError::not_found("blob not found"));
        }
        Ok(BlobDownload {
            record,
            absolute_path,
        })
    }

    /// Records descriptive metadata for an uploaded image.
    pub fn save_image_metadata(&self, input: ImageMetadataInput) -> ForumResult<ImageRecord> {
        if input.file_name.trim().is_empty() {
            return Err(ForumError::invalid("file name may not be empty"));
        }
        let record = ImageRecord {
            id: Uuid::new_v4().to_string(),
            storage_id: input.storage_id,
            file_name: input.file_name,
            file_size: input.file_size,
            file_type: input.file_type,
            width: input.width,
            height: input.height,
            alt_text: input.alt_text.unwrap_or_default(),
            uploaded_at: now_millis(),
        };
        self.database.with_repositories(|repos| {
            let files = repos.files();
            if files.get_blob(&record.storage_id)?.is_none() {
                return Err(ForumError::not_found("blob not found").into());
            }
            files.insert_image(&record)?;
            Ok(())
        })?;
        Ok(record)
    }

    pub fn images_for_blob(&self, storage_id: &str) -> ForumResult<Vec<ImageRecord>> {
        let images = self.database.with_repositories(|repos| {
            let images = repos.files().images_for_blob(storage_id)?;
            Ok(images)
        })?;
        Ok(images)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTicket {
    pub token: String,
    pub upload_url: String,
}

#[derive(Debug, Clone)]
pub struct StoreUploadInput {
    pub token: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlobView {
    pub storage_id: String,
    pub mime: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
}

impl StoredBlobView {
    fn from_record(record: StoredBlobRecord) -> Self {
        Self {
            storage_id: record.id,
            mime: record.mime,
            size_bytes: record.size_bytes,
            checksum: record.checksum,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobDownload {
    pub record: StoredBlobRecord,
    pub absolute_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadataInput {
    pub storage_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub alt_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::tempdir;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    fn setup(base: &std::path::Path, max_upload_bytes: u64) -> ImageService {
        let paths = DojoPaths::from_base_dir(base).expect("paths");
        let conn = Connection::open_in_memory().expect("db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        ImageService::new(db, paths, &FileConfig { max_upload_bytes })
    }

    #[tokio::test]
    async fn upload_token_is_single_use() {
        let temp = tempdir().expect("tempdir");
        let service = setup(temp.path(), 1024);
        let ticket = service.issue_upload_url().unwrap();
        assert_eq!(ticket.upload_url, format!("/storage/upload/{}", ticket.token));

        let stored = service
            .store_upload(StoreUploadInput {
                token: ticket.token.clone(),
                content_type: None,
                data: PNG_HEADER.to_vec(),
            })
            .await
            .expect("store");
        assert_eq!(stored.mime.as_deref(), Some("image/png"));
        assert_eq!(stored.size_bytes, PNG_HEADER.len() as i64);
        assert!(stored.checksum.starts_with("blake3:"));

        let reused = service
            .store_upload(StoreUploadInput {
                token: ticket.token,
                content_type: Some("image/png".into()),
                data: PNG_HEADER.to_vec(),
            })
            .await;
        assert!(matches!(reused, Err(ForumError::NotFound(_))));

        let download = service.prepare_download(&stored.storage_id).await.unwrap();
        assert_eq!(std::fs::read(&download.absolute_path).unwrap(), PNG_HEADER);
    }

    #[tokio::test]
    async fn rejected_tokens_leave_no_file_behind() {
        let temp = tempdir().expect("tempdir");
        let service = setup(temp.path(), 1024);
        let blob_files = || std::fs::read_dir(&service.paths.blobs_dir).map_or(0, |dir| dir.count());

        let ticket = service.issue_upload_url().unwrap();
        let upload = |token: &str| StoreUploadInput {
            token: token.to_string(),
            content_type: None,
            data: PNG_HEADER.to_vec(),
        };
        service.store_upload(upload(&ticket.token)).await.unwrap();
        assert_eq!(blob_files(), 1);

        let spent = service.store_upload(upload(&ticket.token)).await;
        assert!(matches!(spent, Err(ForumError::NotFound(_))));
        let unknown = service.store_upload(upload("never-issued")).await;
        assert!(matches!(unknown, Err(ForumError::NotFound(_))));
        assert_eq!(blob_files(), 1);
    }

    #[tokio::test]
    async fn oversized_uploads_keep_their_token() {
        let temp = tempdir().expect("tempdir");
        let service = setup(temp.path(), 4);
        let ticket = service.issue_upload_url().unwrap();
        let err = service
            .store_upload(StoreUploadInput {
                token: ticket.token.clone(),
                content_type: Some("image/png".into()),
                data: PNG_HEADER.to_vec(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForumError::InvalidInput(_)));

        let stored = service
            .store_upload(StoreUploadInput {
                token: ticket.token,
                content_type: Some("text/plain".into()),
                data: b"ok".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(stored.mime.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn image_metadata_requires_stored_blob() {
        let temp = tempdir().expect("tempdir");
        let service = setup(temp.path(), 1024);
        let orphan = service.save_image_metadata(ImageMetadataInput {
            storage_id: "missing".into(),
            file_name: "kick.png".into(),
            file_size: 10,
            file_type: "image/png".into(),
            width: None,
            height: None,
            alt_text: None,
        });
        assert!(matches!(orphan, Err(ForumError::NotFound(_))));

        let ticket = service.issue_upload_url().unwrap();
        let stored = service
            .store_upload(StoreUploadInput {
                token: ticket.token,
                content_type: None,
                data: PNG_HEADER.to_vec(),
            })
            .await
            .unwrap();
        let image = service
            .save_image_metadata(ImageMetadataInput {
                storage_id: stored.storage_id.clone(),
                file_name: "kick.png".into(),
                file_size: stored.size_bytes,
                file_type: "image/png".into(),
                width: Some(640),
                height: Some(480),
                alt_text: None,
            })
            .unwrap();
        assert_eq!(image.alt_text, "");
        assert_eq!(service.images_for_blob(&stored.storage_id).unwrap().len(), 1);
        assert!(matches!(
            service.prepare_download("missing").await,
            Err(ForumError::NotFound(_))
        ));
    }
}
