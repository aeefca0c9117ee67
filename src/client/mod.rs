//! @ai:module:intent Backend client, abort signals and image acquisition
//! @ai:module:layer infrastructure
//! @ai:module:public_api ApiClient, AbortController, AbortSignal, merge_signals, ImageBytesProvider

pub mod api;
pub mod image;
pub mod signal;
mod timeout;

pub use api::{AnalyzeOptions, ApiClient, HealthOptions, DEFAULT_FEEDBACK_TIMEOUT};
pub use image::{
    AttachmentBody, FetchedImageProvider, ImageAttachment, ImageBytesProvider, NativeFileProvider,
};
pub use signal::{merge_signals, AbortController, AbortSignal};
