mod heic;

use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};
use motorender_contracts::models::ModelSpec;
use motorender_contracts::render::RenderSize;
use serde::Serialize;

use crate::error::ImagingError;

pub use heic::{looks_like_heic, CommandHeicDecoder, HeicDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizePolicy {
    pub target_max_dimension: u32,
    pub square_crop: bool,
    pub require_alpha: bool,
}

impl NormalizePolicy {
    pub fn for_model(model: &ModelSpec, effective: RenderSize) -> Self {
        let limits = model.image_policy;
        let target = match effective.dimensions() {
            Some((width, height)) if limits.square_input => width.min(height),
            Some((width, height)) => width.max(height),
            None => limits.max_input_dimension,
        };
        Self {
            target_max_dimension: target.clamp(1, limits.max_input_dimension.max(1)),
            square_crop: limits.square_input,
            require_alpha: limits.require_alpha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub converted_from_heic: bool,
}

pub struct ImageNormalizer {
    heic: Arc<dyn HeicDecoder>,
}

impl ImageNormalizer {
    pub fn new(heic: Arc<dyn HeicDecoder>) -> Self {
        Self { heic }
    }

    /// Decode, fix orientation, fit to the policy, encode as PNG.
    ///
    /// Undecodable input declared as HEIC/HEIF is converted first and then
    /// put through the same steps. Decoding and resizing run on the blocking
    /// pool; the converter runs as a child process that dies with the future.
    pub async fn normalize(
        &self,
        raw: Vec<u8>,
        mime_type: &str,
        file_name: &str,
        policy: NormalizePolicy,
    ) -> Result<NormalizedImage, ImagingError> {
        let (raw, decoded) = blocking(move || {
            let decoded = decode_oriented(&raw);
            (raw, decoded)
        })
        .await?;
        match decoded {
            Ok(image) => blocking(move || finish(image, &policy, false)).await?,
            Err(err) if looks_like_heic(mime_type, file_name) => {
                tracing::debug!(error = %err, file_name, "primary decode failed; converting HEIC");
                let converted = self.heic.convert_to_png(raw).await?;
                blocking(move || {
                    let image = decode_oriented(&converted).map_err(|err| {
                        ImagingError::Unsupported(format!("converted HEIC is unreadable: {err}"))
                    })?;
                    finish(image, &policy, true)
                })
                .await?
            }
            Err(err) => Err(ImagingError::Unsupported(format!(
                "{file_name} ({mime_type}): {err}"
            ))),
        }
    }
}

async fn blocking<T, F>(work: F) -> Result<T, ImagingError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ImagingError::Task(err.to_string()))
}

fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn finish(
    image: DynamicImage,
    policy: &NormalizePolicy,
    converted_from_heic: bool,
) -> Result<NormalizedImage, ImagingError> {
    let edge = policy.target_max_dimension.max(1);
    let (width, height) = image.dimensions();
    let fitted = if policy.square_crop {
        image.resize_to_fill(edge, edge, FilterType::Lanczos3)
    } else if width > edge || height > edge {
        image.resize(edge, edge, FilterType::Lanczos3)
    } else {
        image
    };

    let output = if policy.require_alpha || fitted.color().has_alpha() {
        DynamicImage::ImageRgba8(fitted.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(fitted.to_rgb8())
    };

    let mut png = Vec::new();
    output
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| ImagingError::Encode(err.to_string()))?;
    Ok(NormalizedImage {
        png,
        width: output.width(),
        height: output.height(),
        converted_from_heic,
    })
}
