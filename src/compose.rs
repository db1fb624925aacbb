use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info};
use thiserror::Error;

use crate::identity::Identity;
use crate::models::{Content, MessageRecord};
use crate::prefs::Preferences;
use crate::storage::{RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Name,
    Body,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Enter your name.")]
    MissingName,
    #[error("Enter your name before uploading an image.")]
    MissingNameForImage,
    #[error("Message is empty.")]
    EmptyBody,
    #[error("Invalid image file.")]
    NotAnImage,
    #[error("Set your name first.")]
    NoIdentity,
}

impl InputError {
    pub fn focus(&self) -> Option<Focus> {
        match self {
            InputError::EmptyBody => Some(Focus::Body),
            InputError::NotAnImage => None,
            InputError::MissingName | InputError::MissingNameForImage | InputError::NoIdentity => {
                Some(Focus::Name)
            }
        }
    }

    /// An empty body only moves focus; everything else is announced.
    pub fn alerts(&self) -> bool {
        !matches!(self, InputError::EmptyBody)
    }
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not save name: {0}")]
    Identity(#[from] rusqlite::Error),
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Error sending message.")]
    Write(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub path: PathBuf,
    pub mime: &'static str,
    pub filename: String,
}

/// Validates user input and turns it into store writes. Writes are
/// fire-and-forget: the message shows up through the live query.
#[derive(Clone)]
pub struct ComposeController {
    store: Arc<dyn RecordStore>,
}

impl ComposeController {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        ComposeController { store }
    }

    pub fn prepare_text(
        &self,
        identity: &mut Identity,
        prefs: &Preferences,
        name: &str,
        body: &str,
    ) -> Result<MessageRecord, ComposeError> {
        let name = name.trim();
        let body = body.trim();
        if name.is_empty() {
            return Err(InputError::MissingName.into());
        }
        if body.is_empty() {
            return Err(InputError::EmptyBody.into());
        }
        let sender = adopt_identity(identity, prefs, name)?;
        Ok(MessageRecord::new(sender, Content::text(body), now_ms()))
    }

    pub fn check_image(path: impl Into<PathBuf>) -> Result<ImageFile, InputError> {
        let path = path.into();
        let mime = mime_for_path(&path);
        if !mime.starts_with("image/") {
            return Err(InputError::NotAnImage);
        }
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(InputError::NotAnImage)?;
        Ok(ImageFile { path, mime, filename })
    }

    pub async fn load_image(file: ImageFile) -> Result<Content, ComposeError> {
        let bytes = tokio::fs::read(&file.path).await.map_err(|source| ComposeError::Read {
            path: file.path.clone(),
            source,
        })?;
        Ok(Content::image(encode_data_uri(file.mime, &bytes), file.filename))
    }

    /// Identity is checked after the file has been read.
    pub fn prepare_image(
        &self,
        identity: &mut Identity,
        prefs: &Preferences,
        name: &str,
        content: Content,
    ) -> Result<MessageRecord, ComposeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InputError::MissingNameForImage.into());
        }
        let sender = adopt_identity(identity, prefs, name)?;
        Ok(MessageRecord::new(sender, content, now_ms()))
    }

    pub fn send(&self, record: MessageRecord) -> impl Future<Output = Result<String, ComposeError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        async move {
            if record.sender.trim().is_empty() {
                return Err(InputError::NoIdentity.into());
            }
            let value = record.to_value()?;
            match store.put(value).await {
                Ok(id) => {
                    info!("Sent message {}", id);
                    Ok(id)
                }
                Err(e) => {
                    error!("Error sending message: {}", e);
                    Err(e.into())
                }
            }
        }
    }
}

fn adopt_identity(identity: &mut Identity, prefs: &Preferences, name: &str) -> rusqlite::Result<String> {
    if identity.current() != Some(name) {
        identity.set(prefs, name)?;
    }
    Ok(name.to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
