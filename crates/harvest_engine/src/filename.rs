use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::datauri::is_data_uri;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico"];

/// File name for a downloaded image.
///
/// Prefers the `Content-Disposition` filename, then the last URL path
/// segment (percent-decoded, query dropped). An extension is added from the
/// content type, or `.jpg`, when the name has no image extension.
pub fn image_filename(
    url: &str,
    content_type: Option<&str>,
    content_disposition: Option<&str>,
) -> String {
    let raw = content_disposition
        .and_then(disposition_filename)
        .or_else(|| last_segment(url))
        .unwrap_or_default();

    let mut name = sanitize_name(&raw);
    if name.is_empty() {
        name = format!("image-{}", short_hash(url));
    }
    if !has_image_extension(&name) {
        let ext = content_type.and_then(extension_for_mime).unwrap_or("jpg");
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Make `name` unique among `taken` by inserting ` - N` before the extension,
/// then record it.
pub fn dedupe_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let mut counter = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} - {counter}.{ext}"),
            None => format!("{stem} - {counter}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.rsplit("''").next().unwrap_or(value);
                if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => plain = Some(value.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }
    plain.filter(|name| !name.is_empty())
}

fn last_segment(url: &str) -> Option<String> {
    if is_data_uri(url) {
        return None;
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, segment) = after_scheme.rsplit_once('/')?;
    if segment.is_empty() {
        return None;
    }
    Some(
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string()),
    )
}

fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or(content_type).trim();
    match mime.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/bmp" | "image/x-ms-bmp" => Some("bmp"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        _ => None,
    }
}

fn has_image_extension(name: &str) -> bool {
    split_extension(name)
        .1
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// Windows-safe file name; forbidden characters become `_`.
pub fn sanitize_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }

    if compacted.chars().count() > 120 {
        compacted = compacted.chars().take(120).collect();
    }
    let stem = split_extension(&compacted).0;
    if is_reserved_windows_name(stem) {
        compacted.insert(stem.len(), '_');
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_segment_is_decoded_and_query_dropped() {
        assert_eq!(
            image_filename("http://x.com/img/%E5%9B%BE%201.png?v=3", None, None),
            "图 1.png"
        );
    }

    #[test]
    fn extension_comes_from_content_type_or_defaults_to_jpg() {
        assert_eq!(image_filename("http://x.com/pic", Some("image/gif"), None), "pic.gif");
        assert_eq!(image_filename("http://x.com/pic.php?id=1", None, None), "pic.php.jpg");
    }

    #[test]
    fn disposition_wins_over_url() {
        let name = image_filename(
            "http://x.com/download?id=9",
            Some("image/png"),
            Some("attachment; filename=\"cover.png\""),
        );
        assert_eq!(name, "cover.png");
        let name = image_filename(
            "http://x.com/download",
            None,
            Some("attachment; filename*=UTF-8''%E5%B0%81%E9%9D%A2.jpg"),
        );
        assert_eq!(name, "封面.jpg");
    }

    #[test]
    fn nameless_urls_get_a_hash() {
        let name = image_filename("http://x.com/", None, None);
        assert!(name.starts_with("image-"), "{name}");
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn duplicates_are_numbered() {
        let mut taken = HashSet::new();
        assert_eq!(dedupe_name("a.jpg", &mut taken), "a.jpg");
        assert_eq!(dedupe_name("a.jpg", &mut taken), "a - 1.jpg");
        assert_eq!(dedupe_name("a.jpg", &mut taken), "a - 2.jpg");
    }

    #[test]
    fn reserved_names_are_escaped() {
        assert_eq!(sanitize_name("con.png"), "con_.png");
        assert_eq!(sanitize_name("a:b*c.png"), "a_b_c.png");
    }
}
