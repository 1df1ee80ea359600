use base64::Engine;

/// Short preview of a possibly huge string (base64 payloads, raw model output).
pub fn preview(data: &str) -> String {
    let total = data.chars().count();
    if total > 50 {
        let head: String = data.chars().take(50).collect();
        format!("{}...[{} chars total]", head, total)
    } else {
        data.to_string()
    }
}

// Truncate base64 blobs in provider JSON for cleaner logging
pub fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

/// Outermost `{...}` span of a model reply, if any.
pub fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// MIME type of an uploaded photo, or `None` if the bytes are not a supported image.
pub fn image_mime_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

pub fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, base64_encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_span_takes_first_open_to_last_close() {
        assert_eq!(json_object_span("```json\n{\"a\":{\"b\":1}}\n```"), Some("{\"a\":{\"b\":1}}"));
        assert_eq!(json_object_span("no braces here"), None);
        assert_eq!(json_object_span("} backwards {"), None);
    }

    #[test]
    fn sniffs_png_and_rejects_text() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(image_mime_type(&png), Some("image/png"));
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];
        assert_eq!(image_mime_type(&jpeg), Some("image/jpeg"));
        assert_eq!(image_mime_type(b"hello world"), None);
    }

    #[test]
    fn preview_truncates_long_payloads() {
        let long = "A".repeat(120);
        assert_eq!(preview(&long), format!("{}...[120 chars total]", "A".repeat(50)));
        assert_eq!(preview("short"), "short");
        let accented = "é".repeat(60);
        assert_eq!(preview(&accented), format!("{}...[60 chars total]", "é".repeat(50)));
    }
}
