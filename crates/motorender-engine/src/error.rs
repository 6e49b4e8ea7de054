use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("unsupported image: {0}")]
    Unsupported(String),
    #[error("HEIC conversion failed: {0}")]
    HeicConversion(String),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error("image task failed: {0}")]
    Task(String),
}

/// Terminal failures of a render. Accessory resolution problems are not
/// errors; they travel in the plan.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("image processing failed: {0}")]
    ImageProcessing(String),
    #[error("no API key configured for the render backend")]
    MissingApiKey,
    #[error("no render backend available: {0}")]
    UnknownModel(String),
    #[error("render backend request failed: {0}")]
    Transport(String),
    #[error("render backend rejected the request ({status})")]
    BackendRejection { status: u16, body: Value },
    #[error("render backend returned no decodable image ({status})")]
    MissingImageInResponse { status: u16, body: Value },
}

impl RenderError {
    pub fn status_code(&self) -> u16 {
        match self {
            RenderError::UnsupportedImage(_) => 415,
            RenderError::UnknownModel(_) => 400,
            RenderError::ImageProcessing(_) | RenderError::MissingApiKey => 500,
            RenderError::Transport(_) | RenderError::MissingImageInResponse { .. } => 502,
            RenderError::BackendRejection { status, .. } => *status,
        }
    }

    pub fn diagnostic(&self) -> Value {
        let mut payload = json!({
            "error": self.to_string(),
            "status": self.status_code(),
        });
        match self {
            RenderError::BackendRejection { body, .. }
            | RenderError::MissingImageInResponse { body, .. } => {
                payload["backend_body"] = body.clone();
            }
            _ => {}
        }
        payload
    }
}

impl From<ImagingError> for RenderError {
    fn from(err: ImagingError) -> Self {
        match err {
            ImagingError::Unsupported(_) | ImagingError::HeicConversion(_) => {
                RenderError::UnsupportedImage(err.to_string())
            }
            ImagingError::Encode(_) | ImagingError::Task(_) => {
                RenderError::ImageProcessing(err.to_string())
            }
        }
    }
}

pub(crate) fn body_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
