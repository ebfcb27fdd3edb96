//! Request signing for the asset host's authenticated endpoints.

use sha1::{Digest, Sha1};

/// `sha1_hex("public_id=<id>&timestamp=<unix>" + secret)`.
pub fn destroy_signature(public_id: &str, timestamp: i64, api_secret: &str) -> String {
    sign_params(
        &[("public_id", public_id), ("timestamp", &timestamp.to_string())],
        api_secret,
    )
}

/// Sign request parameters: sort by name, join as `k=v` with `&`, append the
/// secret, hex-encode the SHA-1 digest. Empty values are left out.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut params: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
