use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

// Inline images in the wild are often unpadded.
const PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A decoded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Lower-cased media type, `None` when the URI leaves it out.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

pub fn is_data_uri(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// `None` for anything that is not a well-formed `data:` URI.
pub fn parse_data_uri(url: &str) -> Option<DataUri> {
    if !is_data_uri(url) {
        return None;
    }
    let (header, payload) = url.get(5..)?.split_once(',')?;
    let mut params = header.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_ascii_lowercase);
    let base64 = params.any(|param| param.trim().eq_ignore_ascii_case("base64"));

    let bytes = if base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = urlencoding::decode(&compact).ok()?;
        PAYLOAD.decode(compact.as_bytes()).ok()?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };
    Some(DataUri { mime, bytes })
}
