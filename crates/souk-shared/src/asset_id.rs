//! Recover an asset's opaque id from its public URL.
//!
//! Hosted asset URLs follow
//! `https://<host>/<cloud>/image/upload/[<transformations>/]v<digits>/<public/id>.<ext>`.
//! The opaque id is everything after the version segment (or after `upload`
//! when there is none), with the extension of the last segment removed.
//!
//! Failure to parse means "no id available"; it is never an error.

use url::Url;

/// Parse the opaque asset id out of `raw_url`.
pub fn public_id_from_url(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url.trim()).ok()?;
    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(percent_decode)
        .collect();

    let upload_at = segments.iter().position(|s| s == "upload")?;
    let rest = &segments[upload_at + 1..];

    let start = rest
        .iter()
        .position(|s| is_version_segment(s))
        .map_or(0, |i| i + 1);
    let id_segments = &rest[start..];

    let (last, dirs) = id_segments.split_last()?;
    let stem = match last.rfind('.') {
        Some(0) | None => last.as_str(),
        Some(dot) => &last[..dot],
    };
    if stem.is_empty() {
        return None;
    }

    let mut id = dirs.join("/");
    if !id.is_empty() {
        id.push('/');
    }
    id.push_str(stem);
    Some(id)
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}

fn percent_decode(segment: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned()
}
