//! @ai:module:intent Wire types exchanged with the backend
//! @ai:module:layer domain
//! @ai:module:public_api AnalysisResponse, TopKItem, Point2, Neighbor, MetricsSummary, EmbeddingPoint, FeedbackAck
//! @ai:module:stateless true

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// @ai:intent One ranked label with its probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKItem {
    pub label: String,
    pub p: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

/// @ai:intent Nearby prediction in the 2D embedding projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub x: f64,
    pub y: f64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

/// @ai:intent Result of analyzing one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub topk: Vec<TopKItem>,
    pub heatmap_png_b64: String,
    pub embedding: Point2,
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,
    pub id: String,
    pub model: String,
}

impl AnalysisResponse {
    /// @ai:intent Highest ranked prediction
    /// @ai:effects pure
    pub fn top(&self) -> Option<&TopKItem> {
        self.topk.first()
    }

    /// @ai:intent Decode the heatmap into PNG bytes
    /// @ai:effects pure
    pub fn heatmap_png(&self) -> crate::Result<Vec<u8>> {
        decode_base64_payload(&self.heatmap_png_b64)
    }
}

/// @ai:intent Decode base64 text, accepting an optional data URI prefix
/// @ai:effects pure
pub(crate) fn decode_base64_payload(raw: &str) -> crate::Result<Vec<u8>> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    Ok(base64::engine::general_purpose::STANDARD.decode(payload.trim())?)
}

/// @ai:intent Aggregated predictions and confusion matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub counts: BTreeMap<String, u64>,
    pub confusion: Vec<Vec<u64>>,
    pub classes: Vec<String>,
}

impl MetricsSummary {
    /// @ai:intent Check that the matrix is classes x classes
    /// @ai:effects pure
    pub fn validate(&self) -> Result<(), String> {
        let n = self.classes.len();

        if self.confusion.len() != n {
            return Err(format!(
                "confusion matrix has {} rows for {} classes",
                self.confusion.len(),
                n
            ));
        }

        if let Some((i, row)) = self.confusion.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(format!(
                "confusion row {} ({}) has {} columns, expected {}",
                i,
                self.classes[i],
                row.len(),
                n
            ));
        }

        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        self.validate().is_ok()
    }
}

/// @ai:intent Point in the stored embedding projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingPoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EmbeddingPointsEnvelope {
    #[serde(default)]
    pub points: Option<Vec<EmbeddingPoint>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedbackRequest<'a> {
    pub prediction_id: &'a str,
    pub true_label: &'a str,
}

/// @ai:intent Acknowledgement returned by the feedback endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAck {
    #[serde(default)]
    pub ok: bool,
}
