//! Dataset listing and editing routes.
//!
//! Request bodies use the camelCase keys the browser UI sends. Every
//! mutating handler takes the dataset's write lock before its first read.

use super::{AppContext, AppError};
use crate::dataset::ListedEntry;
use crate::trim::TrimRequest;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use clipforged_av::{CropRect, TimeRange};
use clipforged_common::{Error, Result};
use clipforged_store::{CaptureType, DerivedEntry, EntryPatch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

pub fn dataset_routes() -> Router<AppContext> {
    Router::new()
        .route("/meta", get(list_meta))
        .route("/caption", post(update_caption))
        .route("/copy", post(copy_entry))
        .route("/delete", post(delete_entry))
        .route("/trim", post(trim_entry))
}

/// A number that may arrive as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn seconds(&self, field: &str) -> Result<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::validation(format!("{field} is not a number: {s:?}")))?,
        };
        if !value.is_finite() {
            return Err(Error::validation(format!("{field} must be finite")));
        }
        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
pub struct MetaQuery {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaListing {
    pub meta_path: PathBuf,
    pub items: Vec<ListedEntry>,
}

async fn list_meta(
    State(ctx): State<AppContext>,
    query: std::result::Result<Query<MetaQuery>, QueryRejection>,
) -> std::result::Result<Json<MetaListing>, AppError> {
    let Query(query) = query?;
    let dataset = ctx.dataset(query.path.as_deref())?;
    let items = dataset.listing(&ctx.sandbox)?;
    Ok(Json(MetaListing {
        meta_path: dataset.meta_path().to_path_buf(),
        items,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRequest {
    pub meta_path: Option<String>,
    pub index: usize,
    pub caption: Option<String>,
    pub speech: Option<String>,
}

async fn update_caption(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<CaptionRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, AppError> {
    let Json(req) = body?;
    if req.caption.is_none() && req.speech.is_none() {
        return Err(Error::missing_field("caption").into());
    }

    let mut patch = EntryPatch::default();
    if let Some(caption) = req.caption {
        patch = patch.caption(caption).capture_type(CaptureType::Manual);
    }
    if let Some(speech) = req.speech {
        patch = patch.speech(speech);
    }

    let dataset = ctx.dataset(req.meta_path.as_deref())?;
    let _guard = ctx.locks.acquire(dataset.meta_path()).await;
    let (_, synced) = dataset.store().update_with_derived(req.index, &patch)?;

    Ok(Json(json!({ "success": true, "derivedUpdated": synced })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    pub meta_path: Option<String>,
    pub index: usize,
}

async fn copy_entry(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<IndexRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, AppError> {
    let Json(req) = body?;
    let dataset = ctx.dataset(req.meta_path.as_deref())?;
    let _guard = ctx.locks.acquire(dataset.meta_path()).await;

    let source = dataset.store().get(req.index)?;
    let new_index = dataset
        .store()
        .insert_after(req.index, source.duplicate(req.index))?;

    Ok(Json(json!({ "success": true, "newIndex": new_index })))
}

async fn delete_entry(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<IndexRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, AppError> {
    let Json(req) = body?;
    let dataset = ctx.dataset(req.meta_path.as_deref())?;
    let _guard = ctx.locks.acquire(dataset.meta_path()).await;

    dataset.store().delete_at(req.index)?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimBody {
    pub meta_path: Option<String>,
    pub index: usize,
    pub ref_start: Option<Numeric>,
    pub ref_end: Option<Numeric>,
    pub video_start: Option<Numeric>,
    pub video_end: Option<Numeric>,
    pub crop: Option<CropRect>,
    pub output_dir: Option<String>,
}

impl TrimBody {
    /// Validate the body into a trim request. A video clip is produced only
    /// when `videoEnd` is present; `videoStart` defaults to zero.
    pub fn to_request(&self) -> Result<TrimRequest> {
        let ref_start = self
            .ref_start
            .as_ref()
            .ok_or_else(|| Error::missing_field("refStart"))?
            .seconds("refStart")?;
        let ref_end = self
            .ref_end
            .as_ref()
            .ok_or_else(|| Error::missing_field("refEnd"))?
            .seconds("refEnd")?;
        let reference = TimeRange::new(ref_start, ref_end)?;

        let video = match &self.video_end {
            Some(end) => {
                let start = match &self.video_start {
                    Some(start) => start.seconds("videoStart")?,
                    None => 0.0,
                };
                Some(TimeRange::new(start, end.seconds("videoEnd")?)?)
            }
            None => None,
        };

        Ok(TrimRequest {
            index: self.index,
            reference,
            video,
            crop: self.crop,
            output_dir: self.output_dir.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimResponse {
    pub audio: PathBuf,
    pub video: Option<PathBuf>,
    pub dataset_path: PathBuf,
    pub entry: DerivedEntry,
}

async fn trim_entry(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<TrimBody>, JsonRejection>,
) -> std::result::Result<Json<TrimResponse>, AppError> {
    let Json(body) = body?;
    let request = body.to_request()?;
    let dataset = ctx.dataset(body.meta_path.as_deref())?;

    // Held across both transcodes so the index cannot shift underneath.
    let _guard = ctx.locks.acquire(dataset.meta_path()).await;
    let outcome = ctx.trim_engine().trim(&dataset, &request).await?;

    Ok(Json(TrimResponse {
        audio: outcome.audio,
        video: outcome.video,
        dataset_path: outcome.dataset_path,
        entry: outcome.entry,
    }))
}
