//! Request extractors whose rejections use the API error envelope.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// JSON body. Malformed or mistyped bodies answer 400 with the usual envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
