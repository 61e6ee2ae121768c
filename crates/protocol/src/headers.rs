//! Header value encodings used by the service.
//!
//! `Content-MD5` carries the base64 of the *hex string's* UTF-8 bytes rather
//! than the raw digest. Older deployments sent the raw digest, and some
//! proxies pass the hex string through untouched, so decoding accepts all
//! three forms.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;

/// Encodes a lowercase hex digest for the `Content-MD5` header.
pub fn encode_content_md5(hex_digest: &str) -> String {
    STANDARD.encode(hex_digest.as_bytes())
}

/// Decodes a `Content-MD5` header into a lowercase hex digest.
pub fn decode_content_md5(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(bytes) = STANDARD.decode(value) {
        if let Ok(text) = std::str::from_utf8(&bytes)
            && is_hex_digest(text)
        {
            return Some(text.to_ascii_lowercase());
        }
        if bytes.len() == 16 {
            return Some(hex::encode(&bytes));
        }
    }

    if is_hex_digest(value) {
        return Some(value.to_ascii_lowercase());
    }
    None
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extracts the file name from a `Content-Disposition` value.
///
/// `filename*` (RFC 5987) wins over `filename` when both are present.
pub fn disposition_file_name(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value).into_iter().skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();
        match key.as_str() {
            "filename" => plain = Some(unquote(raw)),
            "filename*" => {
                // charset'lang'percent-encoded
                let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
                extended = percent_decode_str(encoded)
                    .decode_utf8()
                    .ok()
                    .map(|s| s.into_owned());
            }
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Builds the `Content-Range` value for a part: `bytes first-last/total`.
pub fn content_range(offset: u64, size: u64, total: u64) -> String {
    if size == 0 {
        return format!("bytes */{total}");
    }
    format!("bytes {}-{}/{}", offset, offset + size - 1, total)
}

/// Parses an HTTP-date (`Last-Modified`), e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
