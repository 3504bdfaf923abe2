use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
};
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pibble_gateway::rooms::RoomId;
use pibble_gateway::store;
use pibble_types::api::UploadResponse;
use pibble_types::error::ChatError;
use pibble_types::events::ServerEvent;
use pibble_types::models::NewPrivateMessage;

use crate::error::ApiError;
use crate::state::AppState;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "avi", "wmv", "flv", "mkv"];

/// Longest accepted value for a text field such as `senderKey`.
const MAX_TEXT_FIELD_BYTES: usize = 256;

/// Prefix under which stored media is served and recorded in message rows.
pub const PUBLIC_PREFIX: &str = "uploads";

/// On-disk storage for chat attachments.
///
/// Each upload is one flat file at `{dir}/{uuid}.{ext}`.
pub struct MediaStorage {
    dir: PathBuf,
}

impl MediaStorage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Path recorded in the message row, e.g. `uploads/<uuid>.png`.
    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", PUBLIC_PREFIX, file_name)
    }

    /// Create a fresh, uniquely named file for an upload.
    pub async fn create(&self, extension: &str) -> Result<(String, fs::File)> {
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let file = fs::File::create(self.file_path(&file_name)).await?;
        Ok((file_name, file))
    }

    /// Remove a stored file. Missing files are not an error.
    pub async fn delete_file(&self, file_name: &str) -> Result<()> {
        match fs::remove_file(self.file_path(file_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media file {} already gone", file_name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Pick the stored extension for an upload, or reject it. The mime type must
/// be `image/*` or `video/*` and the file extension must be on the matching
/// allowlist.
pub fn media_extension(file_name: Option<&str>, content_type: Option<&str>) -> Result<String, ChatError> {
    let ext = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = content_type.unwrap_or_default().to_ascii_lowercase();

    let allowed = if mime.starts_with("image/") {
        IMAGE_EXTENSIONS
    } else if mime.starts_with("video/") {
        VIDEO_EXTENSIONS
    } else {
        return Err(ChatError::Validation("Only images and videos are allowed".into()));
    };

    if !allowed.contains(&ext.as_str()) {
        return Err(ChatError::Validation(format!("File type .{} is not allowed", ext)));
    }
    Ok(ext)
}

#[derive(Default)]
struct UploadForm {
    media: Option<StoredMedia>,
    sender: String,
    receiver: String,
}

struct StoredMedia {
    file_name: String,
    size: usize,
}

/// POST /upload-chat-media (multipart: `media`, `senderKey`, `receiverKey`)
///
/// Stores the file, writes a private message row pointing at it, then pushes
/// `private_message` into the pair's room. The row is written before the
/// push, and a failed push does not undo it.
pub async fn upload_chat_media(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = read_form(&state, multipart).await?;

    match publish(&state, &form).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            if let Some(media) = &form.media {
                discard(&state, &media.file_name).await;
            }
            Err(e)
        }
    }
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    if let Err(e) = read_fields(state, &mut multipart, &mut form).await {
        if let Some(media) = form.media.take() {
            discard(state, &media.file_name).await;
        }
        return Err(e);
    }
    Ok(form)
}

async fn read_fields(state: &AppState, multipart: &mut Multipart, form: &mut UploadForm) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "media" => {
                if form.media.is_some() {
                    return Err(ChatError::Validation("Only one file per upload".into()).into());
                }
                let ext = media_extension(field.file_name(), field.content_type())?;
                let (file_name, file) = state.media.create(&ext).await?;
                form.media = Some(StoredMedia { file_name, size: 0 });
                let size = stream_to_file(field, file, state.max_upload_bytes).await?;
                if let Some(media) = form.media.as_mut() {
                    media.size = size;
                }
            }
            "senderKey" => form.sender = read_text_field(field, &name).await?,
            "receiverKey" => form.receiver = read_text_field(field, &name).await?,
            other => debug!("ignoring upload field {:?}", other),
        }
    }
    Ok(())
}

/// Read a short text field into memory, refusing anything over
/// `MAX_TEXT_FIELD_BYTES` before buffering the rest of it.
async fn read_text_field(mut field: Field<'_>, name: &str) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(ChatError::PayloadTooLarge(format!("Field {} is too large", name)).into());
        }
        buf.extend_from_slice(&chunk);
    }
    let text = String::from_utf8(buf).map_err(|_| ChatError::Validation(format!("Field {} is not valid text", name)))?;
    Ok(text.trim().to_string())
}

/// Copy a field to disk chunk by chunk, failing as soon as it exceeds `limit`.
async fn stream_to_file(mut field: Field<'_>, mut file: fs::File, limit: usize) -> Result<usize, ApiError> {
    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len();
        if written > limit {
            return Err(ChatError::PayloadTooLarge(format!(
                "File exceeds the {} MB limit",
                limit / (1024 * 1024)
            ))
            .into());
        }
        file.write_all(&chunk).await.map_err(anyhow::Error::from)?;
    }
    file.flush().await.map_err(anyhow::Error::from)?;
    Ok(written)
}

async fn publish(state: &AppState, form: &UploadForm) -> Result<UploadResponse, ApiError> {
    let media = match &form.media {
        Some(media) if media.size > 0 => media,
        _ => return Err(ChatError::Validation("No file uploaded".into()).into()),
    };
    if form.sender.is_empty() || form.receiver.is_empty() {
        return Err(ChatError::Validation("Missing sender or receiver key".into()).into());
    }

    let sender = state.identity.require(&form.sender).await?;
    let media_path = state.media.public_path(&media.file_name);

    let msg = NewPrivateMessage {
        sender: sender.credential,
        receiver: form.receiver.clone(),
        image_path: Some(media_path.clone()),
        ..Default::default()
    };
    let now = Utc::now();
    let stored = store::call(state.store(), move |s| s.insert_private_message(&msg, &now))
        .await
        .map_err(|e| {
            error!("Failed to record uploaded media: {}", e);
            ChatError::Persistence("Failed to save message".into())
        })?;

    info!(
        "{} uploaded {} ({} bytes) for {} as message {}",
        stored.sender, media.file_name, media.size, stored.receiver, stored.id
    );

    let room = RoomId::private(&stored.sender, &stored.receiver);
    let reached = state
        .dispatcher
        .emit_to_room(&room, ServerEvent::private_message(&stored, None), None)
        .await;
    debug!("media message {} reached {} connections", stored.id, reached);

    Ok(UploadResponse {
        success: true,
        message_id: stored.id,
        media_path,
    })
}

async fn discard(state: &AppState, file_name: &str) {
    if let Err(e) = state.media.delete_file(file_name).await {
        error!("Failed to remove rejected upload {}: {}", file_name, e);
    }
}
