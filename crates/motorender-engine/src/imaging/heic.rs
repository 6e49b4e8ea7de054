use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ImagingError;

#[async_trait]
pub trait HeicDecoder: Send + Sync {
    async fn convert_to_png(&self, bytes: Vec<u8>) -> Result<Vec<u8>, ImagingError>;
}

/// Runs an external converter. The template must contain `{input}` and
/// `{output}` placeholders, e.g. `heif-convert {input} {output}`. The child
/// is killed if the conversion future is dropped.
#[derive(Debug, Clone)]
pub struct CommandHeicDecoder {
    argv: Vec<String>,
}

impl CommandHeicDecoder {
    pub fn from_template(template: &str) -> Result<Self, ImagingError> {
        let argv = shell_words::split(template).map_err(|err| {
            ImagingError::HeicConversion(format!("invalid converter command '{template}': {err}"))
        })?;
        if argv.is_empty() {
            return Err(ImagingError::HeicConversion(
                "converter command is empty".to_string(),
            ));
        }
        for placeholder in ["{input}", "{output}"] {
            if !argv.iter().any(|arg| arg.contains(placeholder)) {
                return Err(ImagingError::HeicConversion(format!(
                    "converter command '{template}' is missing {placeholder}"
                )));
            }
        }
        Ok(Self { argv })
    }

    fn expand(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{input}", input.as_ref())
                    .replace("{output}", output.as_ref())
            })
            .collect()
    }
}

#[async_trait]
impl HeicDecoder for CommandHeicDecoder {
    async fn convert_to_png(&self, bytes: Vec<u8>) -> Result<Vec<u8>, ImagingError> {
        let workdir = tempfile::tempdir()
            .map_err(|err| ImagingError::HeicConversion(format!("temp dir: {err}")))?;
        let input = workdir.path().join("upload.heic");
        let output = workdir.path().join("converted.png");
        tokio::fs::write(&input, &bytes)
            .await
            .map_err(|err| ImagingError::HeicConversion(format!("staging input: {err}")))?;

        let args = self.expand(&input, &output);
        let result = Command::new(&args[0])
            .args(&args[1..])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ImagingError::HeicConversion(format!("running {}: {err}", args[0])))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ImagingError::HeicConversion(format!(
                "{} exited with {}: {}",
                args[0],
                result.status,
                stderr.trim().chars().take(300).collect::<String>()
            )));
        }
        tokio::fs::read(&output)
            .await
            .map_err(|err| ImagingError::HeicConversion(format!("reading converted output: {err}")))
    }
}

pub fn looks_like_heic(mime_type: &str, file_name: &str) -> bool {
    let mime = mime_type.trim().to_ascii_lowercase();
    if matches!(
        mime.as_str(),
        "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence"
    ) {
        return true;
    }
    let ext = Path::new(file_name.trim())
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    matches!(ext.as_str(), "heic" | "heif")
}
