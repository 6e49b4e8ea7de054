mod envelope;
mod images_edit;
mod responses;
mod strategy;
mod transport;

use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;
use motorender_contracts::models::{snap_size, ModelRegistry};
use serde_json::Value;

use crate::error::{body_value, RenderError};

pub use envelope::extract_image;
pub use images_edit::ImagesEditStrategy;
pub use responses::ResponsesStrategy;
pub use strategy::{
    optional_params_for, BackendStrategy, DecodedImage, FilePart, OutboundBody, OutboundRequest,
    RenderCall, StrategyRegistry,
};
pub use transport::{BackendReply, BackendTransport, ReqwestTransport};

#[cfg(test)]
pub(crate) use transport::testing;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub png: Vec<u8>,
    pub attempts: u8,
    pub dropped_params: Vec<String>,
}

pub type RenderOutcome = Result<RenderedImage, RenderError>;

pub struct RenderGateway {
    strategies: StrategyRegistry,
    transport: Arc<dyn BackendTransport>,
}

impl RenderGateway {
    pub fn new(strategies: StrategyRegistry, transport: Arc<dyn BackendTransport>) -> Self {
        Self {
            strategies,
            transport,
        }
    }

    pub fn from_models(models: &ModelRegistry, transport: Arc<dyn BackendTransport>) -> Self {
        Self::new(StrategyRegistry::from_models(models), transport)
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Sends one render. A rejection naming an optional parameter that was
    /// sent is retried exactly once without any optional parameters; every
    /// other failure is returned as is.
    pub async fn render(&self, call: &RenderCall, api_key: &str) -> RenderOutcome {
        let strategy = self
            .strategies
            .get(&call.model)
            .ok_or_else(|| RenderError::UnknownModel(call.model.clone()))?;
        let size = snap_size(call.size, strategy.spec());
        if let Some(warning) = size.warning.as_deref() {
            tracing::warn!(model = strategy.model(), "{warning}");
        }
        let size = size.effective;

        let optional = optional_params_for(strategy.spec(), call.quality.as_deref());
        let first = strategy.build_request(call, size, &optional);
        let reply = self.send(&first, api_key).await?;
        if reply.is_success() {
            return decode_reply(strategy, reply, 1, Vec::new());
        }

        let rejected = rejected_optional_params(&reply, &first.optional_params);
        if rejected.is_empty() {
            return Err(rejection(reply));
        }
        tracing::warn!(
            model = strategy.model(),
            status = reply.status,
            rejected = %rejected.join(","),
            "backend rejected optional parameters; retrying without them"
        );

        let retry = strategy.build_request(call, size, &[]);
        let reply = self.send(&retry, api_key).await?;
        if !reply.is_success() {
            return Err(rejection(reply));
        }
        decode_reply(strategy, reply, 2, first.optional_params)
    }

    async fn send(&self, request: &OutboundRequest, api_key: &str) -> Result<BackendReply, RenderError> {
        let reply = self
            .transport
            .send(request, api_key)
            .await
            .map_err(|err| RenderError::Transport(format!("{err:#}")))?;
        tracing::debug!(path = %request.path, status = reply.status, "backend replied");
        Ok(reply)
    }
}

fn rejected_optional_params(reply: &BackendReply, sent: &[String]) -> Vec<String> {
    if !(400..500).contains(&reply.status) {
        return Vec::new();
    }
    let body = reply.body.to_ascii_lowercase();
    if !body.contains("unknown parameter") {
        return Vec::new();
    }
    sent.iter()
        .filter(|name| body.contains(&name.to_ascii_lowercase()))
        .cloned()
        .collect()
}

fn rejection(reply: BackendReply) -> RenderError {
    RenderError::BackendRejection {
        status: reply.status,
        body: body_value(&reply.body),
    }
}

fn decode_reply(
    strategy: &dyn BackendStrategy,
    reply: BackendReply,
    attempts: u8,
    dropped_params: Vec<String>,
) -> RenderOutcome {
    let missing = |reply: &BackendReply| RenderError::MissingImageInResponse {
        status: reply.status,
        body: body_value(&reply.body),
    };
    let Ok(payload) = serde_json::from_str::<Value>(&reply.body) else {
        return Err(missing(&reply));
    };
    let Some(png) = strategy.decode_response(&payload).and_then(into_png) else {
        return Err(missing(&reply));
    };
    Ok(RenderedImage {
        png,
        attempts,
        dropped_params,
    })
}

fn into_png(image: DecodedImage) -> Option<Vec<u8>> {
    if image.bytes.starts_with(&PNG_SIGNATURE) {
        return Some(image.bytes);
    }
    let decoded = image::load_from_memory(&image.bytes).ok()?;
    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .ok()?;
    tracing::debug!(mime = ?image.mime_type, "re-encoded backend image as PNG");
    Some(png)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use motorender_contracts::models::ModelRegistry;
    use motorender_contracts::render::RenderSize;
    use serde_json::json;

    use super::testing::ScriptedTransport;
    use super::{RenderCall, RenderGateway, PNG_SIGNATURE};
    use crate::error::RenderError;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])))
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    fn edits_body(format: ImageFormat) -> String {
        json!({ "data": [{ "b64_json": BASE64.encode(encoded(format)) }] }).to_string()
    }

    fn call(model: &str, size: RenderSize) -> RenderCall {
        RenderCall {
            model: model.to_string(),
            png: encoded(ImageFormat::Png),
            prompt: "Add panniers".to_string(),
            size,
            quality: Some("high".to_string()),
        }
    }

    fn gateway(transport: Arc<ScriptedTransport>) -> RenderGateway {
        RenderGateway::from_models(&ModelRegistry::default(), transport)
    }

    #[tokio::test]
    async fn unknown_optional_parameter_triggers_exactly_one_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            (
                400,
                r#"{"error":{"message":"Unknown parameter: 'quality'.","type":"invalid_request_error"}}"#,
            ),
            (200, edits_body(ImageFormat::Png).as_str()),
        ]));
        let image = gateway(transport.clone())
            .render(&call("gpt-image-1", RenderSize::Square1024), "sk-test")
            .await
            .unwrap();

        assert!(image.png.starts_with(&PNG_SIGNATURE));
        assert_eq!(image.attempts, 2);
        assert_eq!(
            image.dropped_params,
            vec!["quality", "output_format", "input_fidelity"]
        );
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].multipart_field("quality"), Some("high"));
        assert_eq!(sent[1].multipart_field("quality"), None);
        assert_eq!(sent[1].multipart_field("output_format"), None);
        assert_eq!(sent[1].multipart_field("prompt"), Some("Add panniers"));
        assert_eq!(sent[1].multipart_field("size"), Some("1024x1024"));
    }

    #[tokio::test]
    async fn retry_failure_reports_the_retry_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            (400, "Unknown parameter: 'output_format'"),
            (503, r#"{"error":{"message":"overloaded"}}"#),
        ]));
        let err = gateway(transport.clone())
            .render(&call("gpt-image-1-mini", RenderSize::Square1024), "sk-test")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 503);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn other_rejections_are_terminal() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            400,
            r#"{"error":{"message":"Invalid image: must be square"}}"#,
        )]));
        let err = gateway(transport.clone())
            .render(&call("gpt-image-1", RenderSize::Square1024), "sk-test")
            .await
            .unwrap_err();
        match err {
            RenderError::BackendRejection { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body["error"]["message"], json!("Invalid image: must be square"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn unknown_parameter_not_sent_by_us_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            400,
            "Unknown parameter: 'quality'",
        )]));
        let err = gateway(transport.clone())
            .render(&call("dall-e-2", RenderSize::Square512), "sk-test")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::BackendRejection { status: 400, .. }));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn structured_output_envelope_is_decoded() {
        let body = json!({
            "output": [
                { "type": "message", "content": [] },
                { "type": "image_generation_call", "result": BASE64.encode(encoded(ImageFormat::Png)) }
            ]
        })
        .to_string();
        let transport = Arc::new(ScriptedTransport::new(vec![(200, body.as_str())]));
        let image = gateway(transport)
            .render(&call("gpt-5", RenderSize::Landscape1536x1024), "sk-test")
            .await
            .unwrap();
        assert_eq!(image.attempts, 1);
        assert!(image.dropped_params.is_empty());
    }

    #[tokio::test]
    async fn non_png_backend_images_are_reencoded() {
        let transport = Arc::new(ScriptedTransport::new(vec![(200, edits_body(ImageFormat::Jpeg).as_str())]));
        let image = gateway(transport)
            .render(&call("gpt-image-1", RenderSize::Square1024), "sk-test")
            .await
            .unwrap();
        assert!(image.png.starts_with(&PNG_SIGNATURE));
    }

    #[tokio::test]
    async fn success_without_image_attaches_raw_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            200,
            r#"{"data":[{"revised_prompt":"nothing"}]}"#,
        )]));
        let err = gateway(transport)
            .render(&call("gpt-image-1", RenderSize::Square1024), "sk-test")
            .await
            .unwrap_err();
        match err {
            RenderError::MissingImageInResponse { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body["data"][0]["revised_prompt"], json!("nothing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_size_is_snapped_before_sending() {
        let transport = Arc::new(ScriptedTransport::new(vec![(200, edits_body(ImageFormat::Png).as_str())]));
        gateway(transport.clone())
            .render(&call("dall-e-2", RenderSize::Portrait1024x1536), "sk-test")
            .await
            .unwrap();
        let sent = transport.sent();
        assert_eq!(sent[0].multipart_field("size"), Some("1024x1024"));
        assert_eq!(sent[0].multipart_field("response_format"), Some("b64_json"));
    }

    #[tokio::test]
    async fn transport_and_model_failures_map_to_render_errors() {
        let transport = Arc::new(ScriptedTransport::failing("connection reset"));
        let err = gateway(transport)
            .render(&call("gpt-image-1", RenderSize::Square1024), "sk-test")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Transport(ref message) if message.contains("connection reset")));

        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let err = gateway(transport.clone())
            .render(&call("stable-diffusion", RenderSize::Square1024), "sk-test")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(transport.sent().is_empty());
    }
}
