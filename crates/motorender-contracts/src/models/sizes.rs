use serde::Serialize;

use super::registry::ModelSpec;
use crate::render::RenderSize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeDecision {
    pub requested: RenderSize,
    pub effective: RenderSize,
    pub warning: Option<String>,
}

/// Maps a requested size onto one the model accepts: closest aspect ratio
/// first, then closest pixel area.
pub fn snap_size(requested: RenderSize, model: &ModelSpec) -> SizeDecision {
    if model.supports_size(requested) {
        return SizeDecision {
            requested,
            effective: requested,
            warning: None,
        };
    }

    let fallback = if model.supports_size(model.default_size) {
        model.default_size
    } else {
        model
            .supported_sizes
            .first()
            .copied()
            .unwrap_or(model.default_size)
    };

    let effective = match requested.dimensions() {
        None => fallback,
        Some((width, height)) => {
            let target_ratio = width as f64 / height as f64;
            let target_area = width as f64 * height as f64;
            let mut best = fallback;
            let mut best_delta = (f64::MAX, f64::MAX);
            for candidate in &model.supported_sizes {
                let Some((cw, ch)) = candidate.dimensions() else {
                    continue;
                };
                let delta = (
                    (cw as f64 / ch as f64 - target_ratio).abs(),
                    (cw as f64 * ch as f64 - target_area).abs(),
                );
                if delta < best_delta {
                    best = *candidate;
                    best_delta = delta;
                }
            }
            best
        }
    };

    SizeDecision {
        requested,
        effective,
        warning: Some(format!(
            "{} does not support size {requested}; snapped to {effective}.",
            model.name
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::snap_size;
    use crate::models::ModelRegistry;
    use crate::render::RenderSize;

    #[test]
    fn supported_size_passes_through_without_warning() {
        let registry = ModelRegistry::default();
        let model = registry.get("gpt-image-1").unwrap();
        let decision = snap_size(RenderSize::Landscape1536x1024, model);
        assert_eq!(decision.effective, RenderSize::Landscape1536x1024);
        assert!(decision.warning.is_none());
    }

    #[test]
    fn small_squares_snap_up_for_free_aspect_models() {
        let registry = ModelRegistry::default();
        let model = registry.get("gpt-image-1").unwrap();
        let decision = snap_size(RenderSize::Square256, model);
        assert_eq!(decision.effective, RenderSize::Square1024);
        assert!(decision
            .warning
            .as_deref()
            .unwrap_or_default()
            .contains("snapped to 1024x1024"));
    }

    #[test]
    fn non_square_sizes_snap_to_closest_area_square() {
        let registry = ModelRegistry::default();
        let model = registry.get("dall-e-2").unwrap();
        assert_eq!(
            snap_size(RenderSize::Portrait1024x1536, model).effective,
            RenderSize::Square1024
        );
        assert_eq!(snap_size(RenderSize::Auto, model).effective, RenderSize::Square1024);
        assert_eq!(
            snap_size(RenderSize::Square256, model).effective,
            RenderSize::Square256
        );
    }
}
