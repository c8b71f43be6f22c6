//! Response body classification

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::utils::error::FetchError;

/// Body of a successful response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// 204, no content type, or a content type we do not interpret
    Empty,

    /// `application/json` payload
    Json(Value),

    /// `text/plain` payload
    Text(String),
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Deserialize the body into a caller type
    ///
    /// An empty body deserializes from `null`, so `Option<T>` and `()` accept it.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, FetchError> {
        let value = match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        };

        serde_json::from_value(value).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Read the body of a 2xx response
pub(crate) async fn read_success(response: Response) -> Result<ResponseBody, FetchError> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(ResponseBody::Empty);
    }

    let Some(content_type) = content_type(&response) else {
        return Ok(ResponseBody::Empty);
    };

    if is_json(&content_type) {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(ResponseBody::Empty);
        }
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Parse(format!("Failed to parse response as JSON: {e}")))?;
        Ok(ResponseBody::Json(value))
    } else if content_type.starts_with("text/plain") {
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(ResponseBody::Text(text))
    } else {
        Ok(ResponseBody::Empty)
    }
}

/// Best-effort read of an error response body
pub(crate) async fn read_error_body(response: Response) -> Option<Value> {
    let bytes = response.bytes().await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Turn a non-2xx response into a typed error
pub(crate) async fn into_http_error(response: Response) -> FetchError {
    let status = response.status().as_u16();
    let body = read_error_body(response).await;
    FetchError::Http { status, body }
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase())
}

fn is_json(content_type: &str) -> bool {
    content_type.starts_with("application/json") || content_type.contains("+json")
}
