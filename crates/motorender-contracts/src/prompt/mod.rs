//! Instruction text sent to the image-edit backend.
//!
//! Two modes share the same section order. The unrestricted mode lists each
//! accessory with its description. The compact mode lists names only and
//! never exceeds the caller's character budget (counted in `char`s).

use crate::catalog::AccessorySummary;
use crate::render::RenderConfiguration;

pub const NEGATIVE_CONSTRAINTS: &str =
    "Do not include: any rider or people, additional motorcycles, text, logos, or watermarks.";

const DEFAULT_DESCRIPTION_CHARS: usize = 240;

const CHECKLIST_HEADER: &str =
    "\nReplace any already-fitted accessory with the listed one; do not merge.\nMust visibly include:";

#[derive(Debug, Clone)]
pub struct PromptComposer {
    description_chars: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self {
            description_chars: DEFAULT_DESCRIPTION_CHARS,
        }
    }
}

impl PromptComposer {
    pub fn new(description_chars: usize) -> Self {
        Self { description_chars }
    }

    pub fn compose(
        &self,
        config: &RenderConfiguration,
        accessories: &[AccessorySummary],
        max_length: Option<usize>,
    ) -> String {
        match max_length {
            Some(limit) => self.compose_compact(config, accessories, limit),
            None => self.compose_full(config, accessories),
        }
    }

    fn compose_full(&self, config: &RenderConfiguration, accessories: &[AccessorySummary]) -> String {
        let mut lines = vec![
            "Edit the provided photo of the motorcycle. Keep it the exact same motorcycle: \
             preserve its frame, bodywork, paint, proportions, and overall identity."
                .to_string(),
            format!("Show it as a {}.", config.variant.display_name()),
            format!(
                "Camera: {}, with the whole motorcycle in frame.",
                config.view.phrase()
            ),
            format!("Background: {}.", background_phrase(&config.background)),
            realism_sentence(&config.realism).to_string(),
        ];

        if accessories.is_empty() {
            lines.push("Do not add accessories; keep the motorcycle as currently equipped.".to_string());
        } else {
            lines.push(
                "If any listed accessory is already fitted in the photo, replace it with the \
                 listed version instead of merging or duplicating parts."
                    .to_string(),
            );
            lines.push("The final image must visibly include:".to_string());
            for accessory in accessories {
                let name = accessory_label(accessory);
                let description = truncate_chars(
                    &collapse_whitespace(&accessory.description),
                    self.description_chars,
                );
                if description.is_empty() {
                    lines.push(format!("- {name}"));
                } else {
                    lines.push(format!("- {name}: {description}"));
                }
            }
        }

        lines.push(NEGATIVE_CONSTRAINTS.to_string());
        lines.join("\n")
    }

    fn compose_compact(
        &self,
        config: &RenderConfiguration,
        accessories: &[AccessorySummary],
        max_length: usize,
    ) -> String {
        let mut head = [
            "Edit this motorcycle photo. Keep the exact same motorcycle and its identity."
                .to_string(),
            format!(
                "Show a {}, {}.",
                config.variant.display_name(),
                config.view.phrase()
            ),
            format!("Background: {}.", background_phrase(&config.background)),
            realism_sentence(&config.realism).to_string(),
        ]
        .join("\n");

        if accessories.is_empty() {
            head.push_str("\nDo not add accessories.");
        }

        // The checklist header only goes out together with its first item.
        let tail = format!("\n{NEGATIVE_CONSTRAINTS}");
        let tail_len = tail.chars().count();
        let mut used = head.chars().count();
        for (idx, accessory) in accessories.iter().enumerate() {
            let mut addition = String::new();
            if idx == 0 {
                addition.push_str(CHECKLIST_HEADER);
            }
            addition.push_str(&format!("\n- {}", accessory_label(accessory)));
            let addition_len = addition.chars().count();
            if used + addition_len + tail_len > max_length {
                break;
            }
            head.push_str(&addition);
            used += addition_len;
        }

        head.push_str(&tail);
        truncate_chars_hard(head, max_length)
    }
}

fn background_phrase(tag: &str) -> &'static str {
    match normalize_tag(tag).as_str() {
        "white" | "pure_white" | "studio_white" => {
            "a pure white seamless studio background with a soft contact shadow"
        }
        "outdoor" | "nature" | "scenic" => {
            "a natural outdoor adventure setting on a gravel trail in soft daylight"
        }
        _ => "a neutral mid-gray studio backdrop with even, soft lighting",
    }
}

fn realism_sentence(tag: &str) -> &'static str {
    match normalize_tag(tag).as_str() {
        "studio_3d" => {
            "Style: clean studio 3D product render with crisp reflections and accurate materials."
        }
        "more_real" | "photo" | "photoreal" => {
            "Style: photorealistic, like a professional photograph with natural light and \
             true-to-life materials."
        }
        "illustration" | "sketch" => {
            "Style: clean technical illustration with precise linework and flat shading."
        }
        _ => "Style: high-quality, realistic product visualization.",
    }
}

fn accessory_label(accessory: &AccessorySummary) -> String {
    let name = collapse_whitespace(&accessory.name);
    if name.is_empty() {
        accessory.id.trim().to_string()
    } else {
        name
    }
}

fn normalize_tag(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn truncate_chars_hard(value: String, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value;
    }
    value.chars().take(max_chars).collect()
}
