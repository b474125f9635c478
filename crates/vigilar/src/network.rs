//! Admission and size guards for intercepted HTTP exchanges.
//!
//! The host's interceptor forwards every exchange; these helpers decide
//! which ones are worth handing to the resolvers (any `fs-`-prefixed
//! request/response header or URL parameter) and cap how much body text is
//! collected from large responses.

use std::collections::HashMap;

use crate::config::{CORRELATION_KEY, DETAIL_PREFIX};
use crate::signal::{RequestInfo, ResponseInfo};

/// Hard cap on processed response bodies
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Bodies above this size are collected chunk-wise instead of whole
pub const STREAMING_THRESHOLD: usize = 512 * 1024;

fn is_marker(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with(DETAIL_PREFIX) || key.starts_with(CORRELATION_KEY)
}

fn url_param_names(url: &str) -> impl Iterator<Item = &str> {
    url.split_once('?')
        .map(|(_, query)| query.split('#').next().unwrap_or(query))
        .unwrap_or("")
        .split('&')
        .map(|pair| pair.split_once('=').map_or(pair, |(key, _)| key))
}

/// Whether an exchange carries any assertion marker and should be routed to
/// the resolvers at all
#[must_use]
pub fn should_process(request: &RequestInfo, response_headers: &HashMap<String, String>) -> bool {
    if response_headers.contains_key(CORRELATION_KEY) {
        return true;
    }
    if request.headers.keys().any(|key| is_marker(key)) {
        return true;
    }
    url_param_names(&request.url).any(is_marker)
}

/// Declared response size from the `content-length` header, zero when
/// absent or unparsable
#[must_use]
pub fn content_length(response_headers: &HashMap<String, String>) -> usize {
    response_headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

/// Whether the declared size exceeds the processing cap
#[must_use]
pub fn is_response_too_large(response_headers: &HashMap<String, String>, url: &str) -> bool {
    let size = content_length(response_headers);
    if size > MAX_RESPONSE_SIZE {
        tracing::warn!(
            url,
            size,
            limit = MAX_RESPONSE_SIZE,
            "skipping response processing, size exceeds limit"
        );
        return true;
    }
    false
}

/// Collect body chunks into text, stopping once the size cap is crossed.
/// Invalid UTF-8 is replaced rather than erroring.
pub fn collect_body<I>(chunks: I) -> String
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut bytes: Vec<u8> = Vec::new();
    for chunk in chunks {
        if bytes.len() + chunk.len() > MAX_RESPONSE_SIZE {
            tracing::warn!(
                limit = MAX_RESPONSE_SIZE,
                "stopping response body collection, size cap exceeded"
            );
            break;
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Build a [`ResponseInfo`], dropping the body of an oversized response
#[must_use]
pub fn response_info(
    status: u16,
    response_text: String,
    response_headers: HashMap<String, String>,
    url: &str,
) -> ResponseInfo {
    let response_text = if is_response_too_large(&response_headers, url) {
        String::new()
    } else {
        response_text
    };
    ResponseInfo {
        status,
        response_text,
        response_headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn plain_request(url: &str) -> RequestInfo {
        RequestInfo {
            url: url.to_string(),
            params: None,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn response_correlation_header_admits_exchange() {
        let request = plain_request("https://api.example/x");
        let response_headers = headers(&[("fs-resp-for", "k")]);
        assert!(should_process(&request, &response_headers));
    }

    #[test]
    fn prefixed_request_header_admits_exchange() {
        let mut request = plain_request("https://api.example/x");
        request.headers = headers(&[("FS-Resp-For", "k")]);
        assert!(should_process(&request, &HashMap::new()));
    }

    #[test]
    fn prefixed_url_param_admits_exchange() {
        let request = plain_request("https://api.example/x?fs-resp-for=k&page=1");
        assert!(should_process(&request, &HashMap::new()));
    }

    #[test]
    fn unmarked_exchange_is_skipped() {
        let request = plain_request("https://api.example/x?page=1");
        let response_headers = headers(&[("content-type", "text/html")]);
        assert!(!should_process(&request, &response_headers));
    }

    #[test]
    fn content_length_is_case_insensitive() {
        assert_eq!(content_length(&headers(&[("Content-Length", "42")])), 42);
        assert_eq!(content_length(&headers(&[("content-length", "bad")])), 0);
        assert_eq!(content_length(&HashMap::new()), 0);
    }

    #[test]
    fn oversized_response_is_rejected() {
        let big = (MAX_RESPONSE_SIZE + 1).to_string();
        assert!(is_response_too_large(
            &headers(&[("content-length", &big)]),
            "https://api.example/big"
        ));
        assert!(!is_response_too_large(
            &headers(&[("content-length", "1024")]),
            "https://api.example/small"
        ));
    }

    #[test]
    fn collect_body_stops_at_the_cap() {
        let chunk = vec![b'a'; STREAMING_THRESHOLD];
        let collected = collect_body(vec![chunk.clone(), chunk.clone(), chunk]);
        // the third chunk would cross the cap and is dropped
        assert_eq!(collected.len(), 2 * STREAMING_THRESHOLD);
    }

    #[test]
    fn collect_body_replaces_invalid_utf8() {
        let collected = collect_body(vec![vec![0xff, 0xfe], b"ok".to_vec()]);
        assert!(collected.ends_with("ok"));
    }

    #[test]
    fn oversized_body_is_dropped_from_response_info() {
        let big = (MAX_RESPONSE_SIZE + 1).to_string();
        let info = response_info(
            200,
            "body".to_string(),
            headers(&[("content-length", &big), ("fs-resp-for", "k")]),
            "https://api.example/big",
        );
        assert!(info.response_text.is_empty());
        assert_eq!(info.status, 200);
    }
}
