use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_HEIC_COMMAND: &str = "heif-convert {input} {output}";
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Process-level configuration, read once at startup and passed down
/// explicitly. Nothing below the binary reads the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_base: String,
    pub request_timeout: Duration,
    pub quality: Option<String>,
    pub mountable_only: bool,
    pub catalog_path: Option<PathBuf>,
    pub policy_path: Option<PathBuf>,
    pub heic_command: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: None,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            quality: Some("high".to_string()),
            mountable_only: true,
            catalog_path: None,
            policy_path: None,
            heic_command: DEFAULT_HEIC_COMMAND.to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let defaults = Self::default();
        Self {
            model: value("MOTORENDER_MODEL"),
            api_key: value("OPENAI_API_KEY").or_else(|| value("OPENAI_API_KEY_BACKUP")),
            api_base: value("OPENAI_API_BASE")
                .map(|raw| raw.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            request_timeout: value("MOTORENDER_TIMEOUT_SECS")
                .and_then(|raw| raw.parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.clamp(5, 900)))
                .unwrap_or(defaults.request_timeout),
            quality: value("MOTORENDER_QUALITY").or(defaults.quality),
            mountable_only: value("MOTORENDER_MOUNTABLE_ONLY")
                .map(|raw| parse_flag(&raw))
                .unwrap_or(defaults.mountable_only),
            catalog_path: value("MOTORENDER_CATALOG").map(PathBuf::from),
            policy_path: value("MOTORENDER_POLICY").map(PathBuf::from),
            heic_command: value("MOTORENDER_HEIC_COMMAND").unwrap_or(defaults.heic_command),
        }
    }

    pub fn backend_quality(&self) -> Option<&'static str> {
        self.quality.as_deref().and_then(normalize_quality)
    }
}

pub fn normalize_quality(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" | "fast" | "cheaper" => Some("low"),
        "medium" | "standard" => Some("medium"),
        "high" | "hd" | "quality" | "better" => Some("high"),
        "auto" => Some("auto"),
        _ => None,
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
