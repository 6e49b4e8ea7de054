use std::sync::Arc;

use anyhow::{Context, Result};
use motorender_contracts::catalog::{
    AccessoryCatalog, CatalogHandle, MountabilityPolicy, ResolutionResult, ResolveOptions,
};
use motorender_contracts::models::{snap_size, ModelSelector};
use motorender_contracts::prompt::PromptComposer;
use motorender_contracts::render::{RenderConfiguration, RenderSize};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::RenderError;
use crate::gateway::{RenderCall, RenderGateway, RenderedImage, ReqwestTransport};
use crate::imaging::{CommandHeicDecoder, ImageNormalizer, NormalizePolicy};
use crate::settings::EngineSettings;

#[derive(Debug, Clone)]
pub struct RenderUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderPlan {
    pub request_id: String,
    pub render_key: String,
    pub model: String,
    pub requested_size: RenderSize,
    pub effective_size: RenderSize,
    pub prompt: String,
    pub resolution: ResolutionResult,
    pub warnings: Vec<String>,
    pub image_policy: NormalizePolicy,
}

impl RenderPlan {
    pub fn debug_json(&self) -> Value {
        json!({
            "request_id": self.request_id,
            "render_key": self.render_key,
            "model": self.model,
            "requested_size": self.requested_size,
            "effective_size": self.effective_size,
            "prompt": self.prompt,
            "prompt_chars": self.prompt.chars().count(),
            "accessory_ids": self.resolution.selected_ids(),
            "missing": self.resolution.missing,
            "filtered_out": self.resolution.filtered_out,
            "warnings": self.warnings,
            "image_policy": self.image_policy,
        })
    }

    pub fn diagnostic_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "X-Accessories-Missing",
                self.resolution.missing.len().to_string(),
            ),
            (
                "X-Accessories-Filtered",
                self.resolution.filtered_out.len().to_string(),
            ),
            ("X-Render-Model", self.model.clone()),
            ("X-Render-Size", self.effective_size.to_string()),
        ]
    }
}

#[derive(Debug)]
pub enum RenderResponse {
    Debug(RenderPlan),
    Rendered {
        plan: RenderPlan,
        image: RenderedImage,
    },
}

impl RenderResponse {
    pub fn plan(&self) -> &RenderPlan {
        match self {
            RenderResponse::Debug(plan) => plan,
            RenderResponse::Rendered { plan, .. } => plan,
        }
    }
}

pub struct RenderPipeline {
    catalog: Arc<CatalogHandle>,
    models: ModelSelector,
    composer: PromptComposer,
    normalizer: Arc<ImageNormalizer>,
    gateway: RenderGateway,
    settings: EngineSettings,
}

impl RenderPipeline {
    pub fn new(
        catalog: Arc<CatalogHandle>,
        models: ModelSelector,
        normalizer: Arc<ImageNormalizer>,
        gateway: RenderGateway,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            models,
            composer: PromptComposer::default(),
            normalizer,
            gateway,
            settings,
        }
    }

    /// Wires the production collaborators. An unreadable catalog degrades to
    /// an empty one; an unreadable policy file is fatal.
    pub fn from_settings(settings: EngineSettings) -> Result<Self> {
        let policy = match settings.policy_path.as_deref() {
            Some(path) => MountabilityPolicy::load(path)
                .with_context(|| format!("failed loading mountability policy {}", path.display()))?,
            None => MountabilityPolicy::default(),
        };
        let catalog = match settings.catalog_path.as_deref() {
            Some(path) => AccessoryCatalog::load_or_empty(path, policy),
            None => {
                tracing::warn!("no accessory catalog configured; every id will resolve as missing");
                AccessoryCatalog::empty(policy)
            }
        };
        tracing::info!(accessories = catalog.len(), "accessory catalog ready");

        let heic = CommandHeicDecoder::from_template(&settings.heic_command)
            .context("invalid HEIC converter command")?;
        let transport = ReqwestTransport::new(&settings.api_base, settings.request_timeout)?;
        let models = ModelSelector::default();
        let gateway = RenderGateway::from_models(&models.registry, Arc::new(transport));

        Ok(Self::new(
            Arc::new(CatalogHandle::new(catalog)),
            models,
            Arc::new(ImageNormalizer::new(Arc::new(heic))),
            gateway,
            settings,
        ))
    }

    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    pub fn models(&self) -> &ModelSelector {
        &self.models
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resolves accessories, picks the model and size, and composes the
    /// prompt. Touches neither the image nor the network.
    pub fn plan(&self, config: &RenderConfiguration, accessory_ids: &str) -> Result<RenderPlan, RenderError> {
        let mut warnings = Vec::new();
        let selection = self
            .models
            .select(self.settings.model.as_deref())
            .map_err(RenderError::UnknownModel)?;
        if selection.requested.is_some() {
            if let Some(reason) = selection.fallback_reason {
                warnings.push(reason);
            }
        }
        let model = selection.model;

        let size = snap_size(config.requested_size, &model);
        warnings.extend(size.warning);

        let catalog = self.catalog.snapshot();
        let resolution = catalog.resolve_from_csv(
            accessory_ids,
            ResolveOptions {
                mountable_only: self.settings.mountable_only,
            },
        );
        let prompt = self
            .composer
            .compose(config, &resolution.selected, model.prompt_char_limit);

        let render_key = stable_hash(&json!({
            "model": model.name,
            "size": size.effective,
            "prompt": prompt,
            "accessories": resolution.selected_ids(),
        }));

        Ok(RenderPlan {
            request_id: Uuid::new_v4().to_string(),
            render_key,
            model: model.name.clone(),
            requested_size: config.requested_size,
            effective_size: size.effective,
            prompt,
            resolution,
            warnings,
            image_policy: NormalizePolicy::for_model(&model, size.effective),
        })
    }

    pub async fn render(
        &self,
        upload: RenderUpload,
        config: &RenderConfiguration,
        accessory_ids: &str,
    ) -> Result<RenderResponse, RenderError> {
        let plan = self.plan(config, accessory_ids)?;
        let span = tracing::info_span!(
            "render",
            request_id = %plan.request_id,
            model = %plan.model,
        );
        self.execute(upload, plan, config.debug)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        upload: RenderUpload,
        plan: RenderPlan,
        debug: bool,
    ) -> Result<RenderResponse, RenderError> {
        tracing::info!(
            selected = plan.resolution.selected.len(),
            missing = plan.resolution.missing.len(),
            filtered = plan.resolution.filtered_out.len(),
            size = %plan.effective_size,
            render_key = %plan.render_key,
            "render planned"
        );
        for warning in &plan.warnings {
            tracing::warn!("{warning}");
        }
        if debug {
            return Ok(RenderResponse::Debug(plan));
        }

        let api_key = self
            .settings
            .api_key
            .clone()
            .ok_or(RenderError::MissingApiKey)?;

        let normalized = self
            .normalizer
            .normalize(
                upload.bytes,
                &upload.mime_type,
                &upload.file_name,
                plan.image_policy,
            )
            .await?;
        tracing::debug!(
            width = normalized.width,
            height = normalized.height,
            heic = normalized.converted_from_heic,
            "photo normalized"
        );

        let call = RenderCall {
            model: plan.model.clone(),
            png: normalized.png,
            prompt: plan.prompt.clone(),
            size: plan.effective_size,
            quality: self.settings.backend_quality().map(str::to_string),
        };
        let image = self.gateway.render(&call, &api_key).await?;
        tracing::info!(
            attempts = image.attempts,
            bytes = image.png.len(),
            "render complete"
        );
        Ok(RenderResponse::Rendered { plan, image })
    }
}

fn stable_hash(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use motorender_contracts::catalog::{AccessoryCatalog, CatalogHandle, MountabilityPolicy};
    use motorender_contracts::models::ModelSelector;
    use motorender_contracts::render::{RenderConfiguration, RenderSize, Variant, View};
    use serde_json::json;

    use super::{RenderPipeline, RenderResponse, RenderUpload};
    use crate::error::{ImagingError, RenderError};
    use crate::gateway::testing::ScriptedTransport;
    use crate::gateway::{OutboundBody, RenderGateway};
    use crate::imaging::{HeicDecoder, ImageNormalizer};
    use crate::settings::EngineSettings;

    struct NoHeic;

    #[async_trait]
    impl HeicDecoder for NoHeic {
        async fn convert_to_png(&self, _bytes: Vec<u8>) -> Result<Vec<u8>, ImagingError> {
            Err(ImagingError::HeicConversion("disabled".to_string()))
        }
    }

    fn catalog() -> AccessoryCatalog {
        let dataset = json!([
            {
                "id": "abc",
                "name": "Adventure helmet",
                "category": "Rider equipment",
                "description": "Carbon shell",
                "product_types": { "helmet": 0.9 }
            },
            {
                "id": "xyz",
                "name": "Touring windshield",
                "category": "Ergonomics",
                "description": "Tall adjustable screen",
                "product_types": { "windshield": 1.0 }
            },
            {
                "id": "pan",
                "name": "Pannier",
                "category": "Luggage",
                "description": "Aluminium side case",
                "product_types": ["pannier"]
            }
        ]);
        AccessoryCatalog::from_json(&dataset.to_string(), MountabilityPolicy::default()).unwrap()
    }

    fn pipeline(transport: Arc<ScriptedTransport>, settings: EngineSettings) -> RenderPipeline {
        let models = ModelSelector::default();
        let gateway = RenderGateway::from_models(&models.registry, transport);
        RenderPipeline::new(
            Arc::new(CatalogHandle::new(catalog())),
            models,
            Arc::new(ImageNormalizer::new(Arc::new(NoHeic))),
            gateway,
            settings,
        )
    }

    fn settings(model: &str) -> EngineSettings {
        EngineSettings {
            model: Some(model.to_string()),
            api_key: Some("sk-test".to_string()),
            ..EngineSettings::default()
        }
    }

    fn jpeg_upload(width: u32, height: u32) -> RenderUpload {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 30, 30])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        RenderUpload {
            bytes,
            mime_type: "image/jpeg".to_string(),
            file_name: "gs.jpg".to_string(),
        }
    }

    fn png_reply() -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        json!({ "data": [{ "b64_json": BASE64.encode(bytes) }] }).to_string()
    }

    fn adventure() -> RenderConfiguration {
        RenderConfiguration::new(Variant::Adventure)
            .with_view(View::FrontThreeQuarter)
            .with_background("white")
    }

    #[tokio::test]
    async fn debug_mode_plans_without_calling_the_backend() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let pipeline = pipeline(transport.clone(), settings("gpt-image-1"));
        let response = pipeline
            .render(jpeg_upload(64, 48), &adventure().with_debug(true), "abc,xyz,qmissing")
            .await
            .unwrap();

        let RenderResponse::Debug(plan) = response else {
            panic!("expected a debug response");
        };
        assert!(transport.sent().is_empty());
        let debug = plan.debug_json();
        assert_eq!(debug["accessory_ids"], json!(["xyz"]));
        assert_eq!(debug["missing"], json!(["qmissing"]));
        assert_eq!(debug["filtered_out"][0]["id"], json!("abc"));
        assert_eq!(debug["effective_size"], json!("1024x1024"));
        assert_eq!(debug["model"], json!("gpt-image-1"));
        assert!(plan.prompt.contains("Touring windshield"));
        assert!(!plan.prompt.contains("Adventure helmet"));
        assert_eq!(plan.render_key.len(), 64);

        let headers = plan.diagnostic_headers();
        assert!(headers.contains(&("X-Accessories-Missing", "1".to_string())));
        assert!(headers.contains(&("X-Accessories-Filtered", "1".to_string())));
    }

    #[tokio::test]
    async fn debug_mode_needs_no_api_key_or_decodable_photo() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let settings = EngineSettings {
            api_key: None,
            ..settings("gpt-image-1")
        };
        let upload = RenderUpload {
            bytes: b"not an image".to_vec(),
            mime_type: "image/jpeg".to_string(),
            file_name: "x.jpg".to_string(),
        };
        let response = pipeline(transport, settings)
            .render(upload, &adventure().with_debug(true), "")
            .await
            .unwrap();
        assert!(matches!(response, RenderResponse::Debug(_)));
    }

    #[tokio::test]
    async fn free_aspect_render_uploads_normalized_png_and_returns_backend_image() {
        let reply = png_reply();
        let transport = Arc::new(ScriptedTransport::new(vec![(200, reply.as_str())]));
        let pipeline = pipeline(transport.clone(), settings("gpt-image-1"));
        let response = pipeline
            .render(
                jpeg_upload(2000, 1000),
                &adventure().with_size(RenderSize::Landscape1536x1024),
                "pan",
            )
            .await
            .unwrap();

        let RenderResponse::Rendered { plan, image } = response else {
            panic!("expected a rendered response");
        };
        assert_eq!(plan.effective_size, RenderSize::Landscape1536x1024);
        assert_eq!(image.attempts, 1);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].multipart_field("size"), Some("1536x1024"));
        assert_eq!(sent[0].multipart_field("quality"), Some("high"));
        let OutboundBody::Multipart { file, .. } = &sent[0].body else {
            panic!("expected multipart upload");
        };
        let uploaded = image::load_from_memory_with_format(&file.bytes, ImageFormat::Png).unwrap();
        assert_eq!((uploaded.width(), uploaded.height()), (1536, 768));
    }

    #[tokio::test]
    async fn square_model_gets_square_alpha_buffer_and_bounded_prompt() {
        let reply = png_reply();
        let transport = Arc::new(ScriptedTransport::new(vec![(200, reply.as_str())]));
        let pipeline = pipeline(transport.clone(), settings("dall-e-2"));
        let ids = vec!["pan"; 200].join(",");
        let response = pipeline
            .render(
                jpeg_upload(640, 360),
                &adventure().with_size(RenderSize::Portrait1024x1536),
                &ids,
            )
            .await
            .unwrap();

        let plan = response.plan();
        assert_eq!(plan.effective_size, RenderSize::Square1024);
        assert!(plan.prompt.chars().count() <= 1000);
        assert!(plan.warnings.iter().any(|warning| warning.contains("snapped")));

        let sent = transport.sent();
        let OutboundBody::Multipart { file, .. } = &sent[0].body else {
            panic!("expected multipart upload");
        };
        let uploaded = image::load_from_memory_with_format(&file.bytes, ImageFormat::Png).unwrap();
        assert_eq!((uploaded.width(), uploaded.height()), (1024, 1024));
        assert!(uploaded.color().has_alpha());
    }

    #[tokio::test]
    async fn unknown_configured_model_falls_back_with_a_warning() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let pipeline = pipeline(transport, settings("imagen-9"));
        let plan = pipeline.plan(&adventure(), "xyz").unwrap();
        assert_eq!(plan.model, "gpt-image-1");
        assert!(plan.warnings[0].contains("imagen-9"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_work() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let settings = EngineSettings {
            api_key: None,
            ..settings("gpt-image-1")
        };
        let err = pipeline(transport.clone(), settings)
            .render(jpeg_upload(32, 32), &adventure(), "xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingApiKey));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn undecodable_photo_is_a_client_error() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let upload = RenderUpload {
            bytes: b"GIF89a-but-not-really".to_vec(),
            mime_type: "image/png".to_string(),
            file_name: "broken.png".to_string(),
        };
        let err = pipeline(transport.clone(), settings("gpt-image-1"))
            .render(upload, &adventure(), "xyz")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 415);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn render_key_is_stable_across_requests() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let pipeline = pipeline(transport, settings("gpt-image-1"));
        let first = pipeline.plan(&adventure(), "xyz,pan").unwrap();
        let second = pipeline.plan(&adventure(), " xyz , pan ").unwrap();
        assert_eq!(first.render_key, second.render_key);
        assert_ne!(first.request_id, second.request_id);
        let other = pipeline.plan(&adventure(), "pan,xyz").unwrap();
        assert_ne!(first.render_key, other.render_key);
    }
}
