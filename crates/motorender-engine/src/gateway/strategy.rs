use std::collections::BTreeMap;

use motorender_contracts::models::{ModelRegistry, ModelSpec, RequestShape};
use motorender_contracts::render::RenderSize;
use serde_json::Value;

use super::envelope;
use super::images_edit::ImagesEditStrategy;
use super::responses::ResponsesStrategy;

#[derive(Debug, Clone)]
pub struct RenderCall {
    pub model: String,
    pub png: Vec<u8>,
    pub prompt: String,
    pub size: RenderSize,
    pub quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Multipart {
        fields: Vec<(String, String)>,
        file: FilePart,
    },
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub path: String,
    pub body: OutboundBody,
    pub optional_params: Vec<String>,
}

impl OutboundRequest {
    pub fn multipart_field(&self, name: &str) -> Option<&str> {
        match &self.body {
            OutboundBody::Multipart { fields, .. } => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            OutboundBody::Json(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Request shaping and response decoding for one backend model.
pub trait BackendStrategy: Send + Sync {
    fn spec(&self) -> &ModelSpec;

    fn build_request(
        &self,
        call: &RenderCall,
        size: RenderSize,
        optional: &[(String, String)],
    ) -> OutboundRequest;

    fn model(&self) -> &str {
        &self.spec().name
    }

    fn supported_sizes(&self) -> &[RenderSize] {
        &self.spec().supported_sizes
    }

    fn prompt_length_limit(&self) -> Option<usize> {
        self.spec().prompt_char_limit
    }

    fn decode_response(&self, body: &Value) -> Option<DecodedImage> {
        envelope::extract_image(body)
    }
}

pub fn optional_params_for(spec: &ModelSpec, quality: Option<&str>) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(quality) = quality.map(str::trim).filter(|value| !value.is_empty()) {
        if spec.accepts_optional("quality") {
            params.push(("quality".to_string(), quality.to_string()));
        }
    }
    if spec.accepts_optional("output_format") {
        params.push(("output_format".to_string(), "png".to_string()));
    }
    if spec.accepts_optional("input_fidelity") {
        params.push(("input_fidelity".to_string(), "high".to_string()));
    }
    params
}

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Box<dyn BackendStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_models(models: &ModelRegistry) -> Self {
        let mut registry = Self::new();
        for spec in models.list() {
            match spec.request_shape {
                RequestShape::MultipartEdit => {
                    registry.register(ImagesEditStrategy::new(spec.clone()))
                }
                RequestShape::ResponsesJson => {
                    registry.register(ResponsesStrategy::new(spec.clone()))
                }
            }
        }
        registry
    }

    pub fn register<S: BackendStrategy + 'static>(&mut self, strategy: S) {
        self.strategies
            .insert(strategy.model().to_string(), Box::new(strategy));
    }

    pub fn get(&self, model: &str) -> Option<&dyn BackendStrategy> {
        self.strategies
            .get(model.trim())
            .map(|strategy| strategy.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }
}
