use indexmap::IndexMap;
use serde::Serialize;

use crate::render::RenderSize;

/// Wire contract a backend model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestShape {
    MultipartEdit,
    ResponsesJson,
}

/// Geometry the uploaded image has to match before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageInputPolicy {
    pub square_input: bool,
    pub require_alpha: bool,
    pub max_input_dimension: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub request_shape: RequestShape,
    pub supported_sizes: Vec<RenderSize>,
    pub default_size: RenderSize,
    pub prompt_char_limit: Option<usize>,
    pub image_policy: ImageInputPolicy,
    /// Quality-related fields that some deployments reject; dropped on retry.
    pub optional_params: Vec<String>,
    pub base64_flag: bool,
}

impl ModelSpec {
    pub fn supports_size(&self, size: RenderSize) -> bool {
        self.supported_sizes.contains(&size)
    }

    pub fn accepts_optional(&self, param: &str) -> bool {
        self.optional_params.iter().any(|item| item == param)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn default_model(&self) -> Option<&ModelSpec> {
        self.models.values().next()
    }
}

const GPT_IMAGE_SIZES: [RenderSize; 4] = [
    RenderSize::Square1024,
    RenderSize::Portrait1024x1536,
    RenderSize::Landscape1536x1024,
    RenderSize::Auto,
];

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      request_shape: RequestShape,
                      supported_sizes: &[RenderSize],
                      prompt_char_limit: Option<usize>,
                      image_policy: ImageInputPolicy,
                      optional_params: &[&str],
                      base64_flag: bool| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                request_shape,
                supported_sizes: supported_sizes.to_vec(),
                default_size: RenderSize::Square1024,
                prompt_char_limit,
                image_policy,
                optional_params: optional_params
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                base64_flag,
            },
        );
    };

    let free_aspect = ImageInputPolicy {
        square_input: false,
        require_alpha: false,
        max_input_dimension: 1536,
    };

    insert(
        "gpt-image-1",
        RequestShape::MultipartEdit,
        &GPT_IMAGE_SIZES,
        None,
        free_aspect,
        &["quality", "output_format", "input_fidelity"],
        false,
    );
    insert(
        "gpt-image-1-mini",
        RequestShape::MultipartEdit,
        &GPT_IMAGE_SIZES,
        None,
        free_aspect,
        &["quality", "output_format"],
        false,
    );
    insert(
        "dall-e-2",
        RequestShape::MultipartEdit,
        &[
            RenderSize::Square256,
            RenderSize::Square512,
            RenderSize::Square1024,
        ],
        Some(1000),
        ImageInputPolicy {
            square_input: true,
            require_alpha: true,
            max_input_dimension: 1024,
        },
        &[],
        true,
    );
    insert(
        "gpt-4.1",
        RequestShape::ResponsesJson,
        &GPT_IMAGE_SIZES,
        None,
        free_aspect,
        &["quality", "output_format"],
        false,
    );
    insert(
        "gpt-5",
        RequestShape::ResponsesJson,
        &GPT_IMAGE_SIZES,
        None,
        free_aspect,
        &["quality", "output_format"],
        false,
    );

    map
}
