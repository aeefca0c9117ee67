//! @ai:module:intent VisionTags client library
//! @ai:module:layer application
//! @ai:module:public_api client, config, error, render, resolver, types

pub mod client;
pub mod config;
pub mod error;
pub mod render;
pub mod resolver;
pub mod types;

pub use client::{
    merge_signals, AbortController, AbortSignal, AnalyzeOptions, ApiClient, HealthOptions,
    ImageBytesProvider,
};
pub use config::{ClientConfig, EnvOverrides};
pub use error::{Error, Operation, Result};
pub use resolver::{ApiResolver, HealthProbe, ResolveOptions};
pub use types::{AnalysisResponse, EmbeddingPoint, FeedbackAck, MetricsSummary};
