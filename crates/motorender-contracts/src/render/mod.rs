use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

pub const DEFAULT_BACKGROUND: &str = "studio_gray";
pub const DEFAULT_REALISM: &str = "studio_3d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Base,
    Adventure,
}

impl Variant {
    pub fn display_name(self) -> &'static str {
        match self {
            Variant::Base => "BMW R1300GS",
            Variant::Adventure => "BMW R1300GS Adventure",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Base => "r1300gs",
            Variant::Adventure => "r1300gs_adventure",
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).as_str() {
            "base" | "gs" | "r1300gs" => Ok(Variant::Base),
            "adventure" | "adv" | "gsa" | "r1300gs_adventure" | "r1300gsa" => {
                Ok(Variant::Adventure)
            }
            _ => Err(format!("unknown variant '{raw}'; use base|adventure")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum View {
    #[default]
    Left,
    Right,
    FrontThreeQuarter,
    RearThreeQuarter,
}

impl View {
    pub fn phrase(self) -> &'static str {
        match self {
            View::Left => "left side profile view",
            View::Right => "right side profile view",
            View::FrontThreeQuarter => "front three-quarter view",
            View::RearThreeQuarter => "rear three-quarter view",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            View::Left => "left",
            View::Right => "right",
            View::FrontThreeQuarter => "front_3q",
            View::RearThreeQuarter => "rear_3q",
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).as_str() {
            "" | "left" | "left_side" => Ok(View::Left),
            "right" | "right_side" => Ok(View::Right),
            "front_3q" | "front_three_quarter" | "front_34" => Ok(View::FrontThreeQuarter),
            "rear_3q" | "rear_three_quarter" | "rear_34" => Ok(View::RearThreeQuarter),
            _ => Err(format!(
                "unknown view '{raw}'; use left|right|front_3q|rear_3q"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RenderSize {
    Square256,
    Square512,
    #[default]
    Square1024,
    Portrait1024x1536,
    Landscape1536x1024,
    Auto,
}

impl RenderSize {
    pub const ALL: [RenderSize; 6] = [
        RenderSize::Square256,
        RenderSize::Square512,
        RenderSize::Square1024,
        RenderSize::Portrait1024x1536,
        RenderSize::Landscape1536x1024,
        RenderSize::Auto,
    ];

    pub fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            RenderSize::Square256 => Some((256, 256)),
            RenderSize::Square512 => Some((512, 512)),
            RenderSize::Square1024 => Some((1024, 1024)),
            RenderSize::Portrait1024x1536 => Some((1024, 1536)),
            RenderSize::Landscape1536x1024 => Some((1536, 1024)),
            RenderSize::Auto => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RenderSize::Square256 => "256x256",
            RenderSize::Square512 => "512x512",
            RenderSize::Square1024 => "1024x1024",
            RenderSize::Portrait1024x1536 => "1024x1536",
            RenderSize::Landscape1536x1024 => "1536x1024",
            RenderSize::Auto => "auto",
        }
    }

    pub fn is_square(self) -> bool {
        matches!(
            self,
            RenderSize::Square256 | RenderSize::Square512 | RenderSize::Square1024
        )
    }
}

impl fmt::Display for RenderSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RenderSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for RenderSize {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "square" | "1:1" => return Ok(RenderSize::Square1024),
            "auto" | "default" => return Ok(RenderSize::Auto),
            "portrait" | "tall" | "2:3" => return Ok(RenderSize::Portrait1024x1536),
            "landscape" | "wide" | "3:2" => return Ok(RenderSize::Landscape1536x1024),
            _ => {}
        }
        RenderSize::ALL
            .into_iter()
            .find(|size| size.as_str() == normalized.replace(' ', ""))
            .ok_or_else(|| {
                format!(
                    "unsupported size '{raw}'; use one of {}",
                    RenderSize::ALL.map(RenderSize::as_str).join("|")
                )
            })
    }
}

/// Caller choices for one render. Background and realism stay free-text tags;
/// unrecognized tags fall back to default phrasing when composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfiguration {
    pub variant: Variant,
    pub view: View,
    pub background: String,
    pub realism: String,
    pub requested_size: RenderSize,
    pub debug: bool,
}

impl RenderConfiguration {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            view: View::default(),
            background: DEFAULT_BACKGROUND.to_string(),
            realism: DEFAULT_REALISM.to_string(),
            requested_size: RenderSize::default(),
            debug: false,
        }
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = non_empty_or(background.into(), DEFAULT_BACKGROUND);
        self
    }

    pub fn with_realism(mut self, realism: impl Into<String>) -> Self {
        self.realism = non_empty_or(realism.into(), DEFAULT_REALISM);
        self
    }

    pub fn with_size(mut self, size: RenderSize) -> Self {
        self.requested_size = size;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_token(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}
