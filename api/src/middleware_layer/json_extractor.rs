use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

use crate::error_handler::AppError;

/// `Json<T>` whose rejections render as the API error envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(map_rejection(rejection)),
        }
    }
}

fn map_rejection(rejection: JsonRejection) -> AppError {
    let text = rejection.body_text();
    let hint = match &rejection {
        JsonRejection::MissingJsonContentType(_) => {
            Some("Send the body with `content-type: application/json`.")
        }
        JsonRejection::JsonSyntaxError(_) => Some("The body is not valid JSON."),
        _ if text.contains("expected a sequence") => {
            Some("Expected an array for this field (e.g. [\"item1\", \"item2\"]).")
        }
        _ if text.contains("expected a map") || text.contains("expected struct") => {
            Some("Expected a JSON object here (e.g. { \"field\": \"value\" }).")
        }
        _ => None,
    };

    match hint {
        Some(hint) => AppError::Validation {
            message: text,
            path: guess_path(&rejection),
            hint: Some(hint.to_string()),
        },
        None => AppError::BadRequest(text),
    }
}

fn guess_path(rejection: &JsonRejection) -> Option<&'static str> {
    let text = rejection.body_text();
    ["question", "messages", "teamId", "type", "instance", "sessionId", "agent"]
        .into_iter()
        .find(|key| text.contains(key))
}
