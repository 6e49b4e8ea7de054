use motorender_contracts::models::ModelSpec;
use motorender_contracts::render::RenderSize;

use super::strategy::{BackendStrategy, FilePart, OutboundBody, OutboundRequest, RenderCall};

const UPLOAD_FILE_NAME: &str = "motorcycle.png";

/// `multipart/form-data` upload to `/images/edits`.
pub struct ImagesEditStrategy {
    spec: ModelSpec,
}

impl ImagesEditStrategy {
    pub fn new(spec: ModelSpec) -> Self {
        Self { spec }
    }
}

impl BackendStrategy for ImagesEditStrategy {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn build_request(
        &self,
        call: &RenderCall,
        size: RenderSize,
        optional: &[(String, String)],
    ) -> OutboundRequest {
        let mut fields = vec![
            ("model".to_string(), self.spec.name.clone()),
            ("prompt".to_string(), call.prompt.clone()),
            ("size".to_string(), size.as_str().to_string()),
            ("n".to_string(), "1".to_string()),
        ];
        if self.spec.base64_flag {
            fields.push(("response_format".to_string(), "b64_json".to_string()));
        }
        fields.extend(optional.iter().cloned());

        OutboundRequest {
            path: "/images/edits".to_string(),
            body: OutboundBody::Multipart {
                fields,
                file: FilePart {
                    field: "image".to_string(),
                    file_name: UPLOAD_FILE_NAME.to_string(),
                    mime: "image/png".to_string(),
                    bytes: call.png.clone(),
                },
            },
            optional_params: optional.iter().map(|(name, _)| name.clone()).collect(),
        }
    }
}
