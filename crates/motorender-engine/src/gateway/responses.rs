use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use motorender_contracts::models::ModelSpec;
use motorender_contracts::render::RenderSize;
use serde_json::{json, Map, Value};

use super::strategy::{BackendStrategy, OutboundBody, OutboundRequest, RenderCall};

/// JSON request to `/responses` with the photo inlined as a data URL and an
/// `image_generation` tool producing the result.
pub struct ResponsesStrategy {
    spec: ModelSpec,
}

impl ResponsesStrategy {
    pub fn new(spec: ModelSpec) -> Self {
        Self { spec }
    }
}

impl BackendStrategy for ResponsesStrategy {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn build_request(
        &self,
        call: &RenderCall,
        size: RenderSize,
        optional: &[(String, String)],
    ) -> OutboundRequest {
        let image_url = format!("data:image/png;base64,{}", BASE64.encode(&call.png));
        let content = vec![
            json!({
                "type": "input_text",
                "text": call.prompt,
            }),
            json!({
                "type": "input_image",
                "image_url": image_url,
            }),
        ];

        let mut tool = Map::new();
        tool.insert("type".to_string(), Value::String("image_generation".to_string()));
        tool.insert("size".to_string(), Value::String(size.as_str().to_string()));
        for (name, value) in optional {
            tool.insert(name.clone(), Value::String(value.clone()));
        }

        OutboundRequest {
            path: "/responses".to_string(),
            body: OutboundBody::Json(json!({
                "model": self.spec.name,
                "input": [{
                    "role": "user",
                    "content": content,
                }],
                "tools": [Value::Object(tool)],
                "tool_choice": { "type": "image_generation" },
            })),
            optional_params: optional.iter().map(|(name, _)| name.clone()).collect(),
        }
    }
}
