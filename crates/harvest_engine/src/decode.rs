use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use harvest_logging::harvest_warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown encoding label `{0}`")]
    UnknownEncoding(String),
}

/// How far into the document to look for a `<meta charset>` declaration.
const META_SNIFF_LIMIT: usize = 2048;

/// Decode raw bytes into UTF-8 using: BOM -> forced label -> Content-Type charset
/// -> meta charset -> chardetng fallback.
pub fn decode_html(
    bytes: &[u8],
    content_type: Option<&str>,
    forced_label: Option<&str>,
) -> Result<DecodedHtml, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return Ok(decode_with(bytes, encoding));
    }

    if let Some(label) = forced_label.map(str::trim).filter(|l| !l.is_empty()) {
        let enc = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| DecodeError::UnknownEncoding(label.to_string()))?;
        return Ok(decode_with(bytes, enc));
    }

    let declared = content_type
        .and_then(extract_charset)
        .or_else(|| sniff_meta_charset(bytes));
    if let Some(enc) = declared.and_then(|label| Encoding::for_label(label.as_bytes())) {
        return Ok(decode_with(bytes, enc));
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    Ok(decode_with(bytes, enc))
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()))
        })
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LIMIT)];
    let lower = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let label: String = lower[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        harvest_warn!("malformed {} sequences replaced while decoding", enc.name());
    }
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: enc.name().to_string(),
        had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_parameter_is_case_insensitive() {
        assert_eq!(
            extract_charset("text/html; Charset=\"GBK\"").as_deref(),
            Some("GBK")
        );
        assert_eq!(extract_charset("text/html"), None);
    }

    #[test]
    fn meta_charset_is_sniffed() {
        let html = br#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=gbk"></head>"#;
        assert_eq!(sniff_meta_charset(html).as_deref(), Some("gbk"));
        let html5 = br#"<meta charset="utf-8">"#;
        assert_eq!(sniff_meta_charset(html5).as_deref(), Some("utf-8"));
    }
}
