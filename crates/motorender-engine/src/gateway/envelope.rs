//! Image extraction from backend response bodies.
//!
//! Two envelopes are understood: `data[].b64_json` from the edits endpoint
//! and `output[]` items of type `image_generation_call` whose `result`
//! carries the image. Either may hold bare base64 or a data URL.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

use super::strategy::DecodedImage;

pub fn extract_image(body: &Value) -> Option<DecodedImage> {
    flat_data_payloads(body)
        .chain(generation_call_payloads(body))
        .find_map(decode_payload)
}

fn flat_data_payloads(body: &Value) -> impl Iterator<Item = &str> {
    body.get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|row| row.get("b64_json").and_then(Value::as_str))
}

fn generation_call_payloads(body: &Value) -> impl Iterator<Item = &str> {
    body.get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("image_generation_call"))
        .filter_map(|item| item.get("result").and_then(Value::as_str))
}

fn decode_payload(raw: &str) -> Option<DecodedImage> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (mime_type, payload) = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest.split_once(',')?;
            let mime = meta
                .split(';')
                .next()
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string);
            (mime, payload)
        }
        None => (None, trimmed),
    };
    let bytes = BASE64.decode(payload.trim().as_bytes()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(DecodedImage { bytes, mime_type })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::extract_image;

    #[test]
    fn flat_data_envelope() {
        let body = json!({ "data": [{ "b64_json": "aGVsbG8=" }] });
        let image = extract_image(&body).unwrap();
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.mime_type, None);
    }

    #[test]
    fn structured_output_envelope_skips_non_image_items() {
        let body = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [{ "type": "output_text", "text": "done" }] },
                { "type": "image_generation_call", "status": "completed", "result": "aGk=" }
            ]
        });
        assert_eq!(extract_image(&body).unwrap().bytes, b"hi");
    }

    #[test]
    fn data_url_payloads_keep_their_mime_type() {
        let body = json!({ "data": [{ "b64_json": "data:image/webp;base64,aGk=" }] });
        let image = extract_image(&body).unwrap();
        assert_eq!(image.bytes, b"hi");
        assert_eq!(image.mime_type.as_deref(), Some("image/webp"));
    }

    #[test]
    fn undecodable_or_absent_payloads_yield_nothing() {
        assert!(extract_image(&json!({ "data": [] })).is_none());
        assert!(extract_image(&json!({ "data": [{ "url": "https://example.com/a.png" }] })).is_none());
        assert!(extract_image(&json!({ "data": [{ "b64_json": "%%%" }] })).is_none());
        assert!(extract_image(&json!({ "output": [{ "type": "image_generation_call" }] })).is_none());
        assert!(extract_image(&json!("plain string")).is_none());
    }

    #[test]
    fn first_decodable_payload_wins() {
        let body = json!({ "data": [{ "b64_json": "%%%" }, { "b64_json": "aGVsbG8=" }] });
        assert_eq!(extract_image(&body).unwrap().bytes, b"hello");
    }
}
