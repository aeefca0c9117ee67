//! @ai:module:intent Acquire image bytes for the analyze upload
//! @ai:module:layer infrastructure
//! @ai:module:public_api ImageBytesProvider, ImageAttachment, AttachmentBody, FetchedImageProvider, NativeFileProvider
//! @ai:module:stateless true

use crate::error::{Error, Result};
use crate::types::decode_base64_payload;
use futures::future::{BoxFuture, FutureExt};
use reqwest::multipart::Part;
use std::path::{Path, PathBuf};

/// @ai:intent Image ready to be attached as the `image` multipart part
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime: String,
    pub body: AttachmentBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentBody {
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// A file reference streamed at upload time.
    File(PathBuf),
}

impl ImageAttachment {
    /// @ai:intent Convert into a multipart part
    /// @ai:effects fs:read
    pub async fn into_part(self) -> Result<Part> {
        let ImageAttachment {
            file_name,
            mime,
            body,
        } = self;

        let part = match body {
            AttachmentBody::Bytes(bytes) => Part::bytes(bytes),
            AttachmentBody::File(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| Error::Image {
                    reference: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                let len = file.metadata().await?.len();
                Part::stream_with_length(file, len)
            }
        };

        part.file_name(file_name.clone())
            .mime_str(&mime)
            .map_err(|e| Error::Image {
                reference: file_name,
                reason: e.to_string(),
            })
    }
}

/// @ai:intent Capability that turns an image reference into an upload
pub trait ImageBytesProvider: Send + Sync {
    /// @ai:intent Produce the attachment for `reference`
    fn attach<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<ImageAttachment>>;

    /// @ai:intent Whether the requested model also travels as an `X-Model` header
    fn sends_model_header(&self) -> bool {
        false
    }
}

/// @ai:intent Browser-like provider: fetch the reference and wrap the bytes
///
/// Accepts `http(s)://` URLs, `data:` URIs, `file://` URIs and plain paths.
pub struct FetchedImageProvider {
    http: reqwest::Client,
}

impl FetchedImageProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// @ai:intent Fetch bytes and an optional content type for a reference
    /// @ai:effects network, fs:read
    async fn fetch(&self, reference: &str) -> Result<(Vec<u8>, Option<String>)> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let response = self
                .http
                .get(reference)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::Image {
                    reference: reference.to_string(),
                    reason: e.to_string(),
                })?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await.map_err(|e| Error::Image {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;
            return Ok((bytes.to_vec(), content_type));
        }

        if let Some(rest) = reference.strip_prefix("data:") {
            let mime = rest
                .split_once(";base64,")
                .map(|(mime, _)| mime.to_string())
                .filter(|m| !m.is_empty());
            return Ok((decode_base64_payload(reference)?, mime));
        }

        let path = local_path(reference);
        let bytes = tokio::fs::read(&path).await.map_err(|e| Error::Image {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;
        Ok((bytes, None))
    }
}

impl ImageBytesProvider for FetchedImageProvider {
    fn attach<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<ImageAttachment>> {
        async move {
            let file_name = file_name_for(reference);
            let (bytes, content_type) = self.fetch(reference).await?;
            let mime = content_type.unwrap_or_else(|| fallback_mime(&file_name).to_string());

            Ok(ImageAttachment {
                file_name,
                mime,
                body: AttachmentBody::Bytes(bytes),
            })
        }
        .boxed()
    }

    fn sends_model_header(&self) -> bool {
        true
    }
}

/// @ai:intent Native provider: pass the file reference through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFileProvider;

impl ImageBytesProvider for NativeFileProvider {
    fn attach<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<ImageAttachment>> {
        async move {
            let file_name = file_name_for(reference);
            let mime = fallback_mime(&file_name).to_string();

            Ok(ImageAttachment {
                file_name,
                mime,
                body: AttachmentBody::File(local_path(reference)),
            })
        }
        .boxed()
    }
}

/// @ai:intent Last path segment of the reference, or `image.jpg`
/// @ai:effects pure
pub fn file_name_for(reference: &str) -> String {
    if reference.starts_with("data:") {
        return "image.jpg".to_string();
    }

    let without_query = reference.split(['?', '#']).next().unwrap_or(reference);
    without_query
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("image.jpg")
        .to_string()
}

/// @ai:intent PNG for `.png` names, JPEG otherwise
/// @ai:effects pure
pub fn fallback_mime(file_name: &str) -> &'static str {
    if file_name.to_ascii_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

fn local_path(reference: &str) -> PathBuf {
    Path::new(reference.strip_prefix("file://").unwrap_or(reference)).to_path_buf()
}
