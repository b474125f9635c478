//! HTTP resolvers: correlate network exchanges to pending assertions.
//!
//! Correlation id lookup order: response header, request header, URL query
//! parameter, request body parameter. Only assertions whose key equals the
//! extracted id are candidates; everything else is left untouched by the
//! exchange.
//!
//! A transport-level error fails every correlated pending assertion with
//! the error message, except `response-status` assertions: those always
//! evaluate the actual numeric status, so a 404 matching an expected 404
//! passes even when the call site treated the response as an error.

use std::collections::HashMap;

use serde_json::Value;

use crate::assertion::{complete, Assertion, AssertionType, CompletedAssertion};
use crate::config::CORRELATION_KEY;
use crate::signal::{HttpErrorInfo, RequestInfo, ResponseInfo};

/// Check every key of `expected` exists in `actual` with an equal value
#[must_use]
pub fn is_subset(expected: &HashMap<String, String>, actual: &HashMap<String, String>) -> bool {
    expected
        .iter()
        .all(|(key, value)| actual.get(key) == Some(value))
}

fn pretty_print_headers(headers: &HashMap<String, String>) -> String {
    let mut entries: Vec<String> = headers
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect();
    entries.sort();
    entries.join("\n")
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| value.to_string())
    })
}

fn body_param(params: &str, name: &str) -> Option<String> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(params) {
        return match map.get(name)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
    }
    // fall back to form-encoded bodies
    params.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Extract the correlation id from a completed exchange
#[must_use]
pub fn correlation_id(request: &RequestInfo, response_headers: Option<&HashMap<String, String>>) -> Option<String> {
    if let Some(id) = response_headers.and_then(|h| h.get(CORRELATION_KEY)) {
        return Some(id.clone());
    }
    if let Some(id) = request.headers.get(CORRELATION_KEY) {
        return Some(id.clone());
    }
    if let Some(id) = query_param(&request.url, CORRELATION_KEY) {
        return Some(id);
    }
    request
        .params
        .as_deref()
        .and_then(|params| body_param(params, CORRELATION_KEY))
}

/// Resolve pending HTTP assertions against a successful exchange
pub fn resolve_response(
    request: &RequestInfo,
    response: &ResponseInfo,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let Some(id) = correlation_id(request, Some(&response.response_headers)) else {
        return Vec::new();
    };

    let mut completed = Vec::new();
    for assertion in assertions.iter_mut().filter(|a| a.is_pending()) {
        if !assertion.kind.is_http() || assertion.assertion_key != id {
            continue;
        }
        let done = match assertion.kind {
            AssertionType::ResponseHeaders => {
                match serde_json::from_str::<HashMap<String, String>>(&assertion.type_value) {
                    Ok(expected) => {
                        let passed = is_subset(&expected, &response.response_headers);
                        let reason = format!(
                            "Expected HTTP response headers not found in actual headers:\n\n\
                             Expected:\n{}\n\nActual:\n{}",
                            pretty_print_headers(&expected),
                            pretty_print_headers(&response.response_headers),
                        );
                        complete(assertion, passed, &reason, now_ms)
                    }
                    Err(_) => complete(
                        assertion,
                        false,
                        "Expected HTTP response headers is not a valid JSON",
                        now_ms,
                    ),
                }
            }
            _ => complete_status(assertion, response.status, now_ms),
        };
        completed.extend(done);
    }
    completed
}

fn complete_status(
    assertion: &mut Assertion,
    actual: u16,
    now_ms: u64,
) -> Option<CompletedAssertion> {
    let expected = assertion.type_value.trim().parse::<u16>().ok();
    let passed = expected == Some(actual);
    let reason = format!(
        "HTTP response status ({actual}) does not match the expected status ({})",
        assertion.type_value
    );
    complete(assertion, passed, &reason, now_ms)
}

/// Resolve pending assertions against a failed exchange.
///
/// Every correlated pending assertion fails with the transport error
/// message, whatever its type — except `response-status`, which still
/// compares the actual status and may pass. A status-code mismatch on an
/// errored exchange carries the transport message rather than the
/// comparison message.
pub fn resolve_error(
    error: &HttpErrorInfo,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let request = RequestInfo {
        url: error.url.clone(),
        params: None,
        headers: error.request_headers.clone(),
    };
    let Some(id) = correlation_id(&request, error.response_headers.as_ref()) else {
        return Vec::new();
    };

    let mut completed = Vec::new();
    for assertion in assertions.iter_mut().filter(|a| a.is_pending()) {
        if assertion.assertion_key != id {
            continue;
        }
        let done = if assertion.kind == AssertionType::ResponseStatus && error.status > 0 {
            let passed = assertion.type_value.trim().parse::<u16>().ok() == Some(error.status);
            complete(assertion, passed, &error.message, now_ms)
        } else {
            complete(assertion, false, &error.message, now_ms)
        };
        completed.extend(done);
    }
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{test_assertion, AssertionStatus};

    const NOW: u64 = 1_230_000_000_500;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn correlated_response(key: &str, status: u16) -> (RequestInfo, ResponseInfo) {
        (
            RequestInfo {
                url: "https://api.example/orders".to_string(),
                params: None,
                headers: HashMap::new(),
            },
            ResponseInfo {
                status,
                response_text: String::new(),
                response_headers: headers(&[("fs-resp-for", key)]),
            },
        )
    }

    mod correlation_tests {
        use super::*;

        #[test]
        fn response_header_wins_over_request_header() {
            let request = RequestInfo {
                url: "https://api.example/x".to_string(),
                params: None,
                headers: headers(&[("fs-resp-for", "from-request")]),
            };
            let response_headers = headers(&[("fs-resp-for", "from-response")]);
            assert_eq!(
                correlation_id(&request, Some(&response_headers)),
                Some("from-response".to_string())
            );
        }

        #[test]
        fn url_param_is_third_choice() {
            let request = RequestInfo {
                url: "https://api.example/x?fs-resp-for=from-url&page=2".to_string(),
                params: None,
                headers: HashMap::new(),
            };
            assert_eq!(
                correlation_id(&request, None),
                Some("from-url".to_string())
            );
        }

        #[test]
        fn body_param_is_last_choice() {
            let json_body = RequestInfo {
                url: "https://api.example/x".to_string(),
                params: Some(r#"{"fs-resp-for": "from-json"}"#.to_string()),
                headers: HashMap::new(),
            };
            assert_eq!(
                correlation_id(&json_body, None),
                Some("from-json".to_string())
            );

            let form_body = RequestInfo {
                url: "https://api.example/x".to_string(),
                params: Some("a=1&fs-resp-for=from-form".to_string()),
                headers: HashMap::new(),
            };
            assert_eq!(
                correlation_id(&form_body, None),
                Some("from-form".to_string())
            );
        }

        #[test]
        fn uncorrelated_exchange_yields_nothing() {
            let request = RequestInfo {
                url: "https://api.example/x".to_string(),
                params: Some("not json".to_string()),
                headers: HashMap::new(),
            };
            assert_eq!(correlation_id(&request, None), None);
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn header_map() -> impl Strategy<Value = HashMap<String, String>> {
            proptest::collection::hash_map("[a-z-]{1,12}", "[a-zA-Z0-9/;= ]{0,20}", 0..6)
        }

        proptest! {
            /// Every map is a subset of itself
            #[test]
            fn subset_is_reflexive(map in header_map()) {
                prop_assert!(is_subset(&map, &map));
            }

            /// Extra actual headers never break a subset match
            #[test]
            fn extra_actual_headers_preserve_subset(
                expected in header_map(),
                extra in header_map(),
            ) {
                let mut actual = extra;
                actual.extend(expected.clone());
                prop_assert!(is_subset(&expected, &actual));
            }

            /// A changed value breaks the subset
            #[test]
            fn changed_value_breaks_subset(mut map in header_map(), key in "[a-z-]{1,12}") {
                map.insert(key.clone(), "original".to_string());
                let mut actual = map.clone();
                actual.insert(key, "changed".to_string());
                prop_assert!(!is_subset(&map, &actual));
            }
        }
    }

    mod response_tests {
        use super::*;

        #[test]
        fn status_equality_passes() {
            let (request, response) = correlated_response("order-created", 201);
            let mut assertions = vec![test_assertion(
                "order-created",
                AssertionType::ResponseStatus,
                "201",
            )];
            let completed = resolve_response(&request, &response, &mut assertions, NOW);
            assert_eq!(completed[0].status(), AssertionStatus::Passed);
        }

        #[test]
        fn status_mismatch_fails_with_both_codes() {
            let (request, response) = correlated_response("order-created", 500);
            let mut assertions = vec![test_assertion(
                "order-created",
                AssertionType::ResponseStatus,
                "201",
            )];
            let completed = resolve_response(&request, &response, &mut assertions, NOW);
            assert_eq!(
                completed[0].status_reason(),
                "HTTP response status (500) does not match the expected status (201)"
            );
        }

        #[test]
        fn uncorrelated_assertion_is_untouched() {
            let (request, response) = correlated_response("order-created", 200);
            let mut assertions = vec![test_assertion(
                "different-key",
                AssertionType::ResponseStatus,
                "200",
            )];
            assert!(resolve_response(&request, &response, &mut assertions, NOW).is_empty());
            assert!(assertions[0].is_pending());
        }

        #[test]
        fn header_subset_passes_with_extra_actual_headers() {
            let (request, mut response) = correlated_response("hdrs", 200);
            response
                .response_headers
                .extend(headers(&[("content-type", "application/json"), ("etag", "abc")]));
            let mut assertions = vec![test_assertion(
                "hdrs",
                AssertionType::ResponseHeaders,
                r#"{"content-type": "application/json"}"#,
            )];
            let completed = resolve_response(&request, &response, &mut assertions, NOW);
            assert_eq!(completed[0].status(), AssertionStatus::Passed);
        }

        #[test]
        fn missing_expected_header_fails_with_both_header_sets() {
            let (request, response) = correlated_response("hdrs", 200);
            let mut assertions = vec![test_assertion(
                "hdrs",
                AssertionType::ResponseHeaders,
                r#"{"x-trace": "on"}"#,
            )];
            let completed = resolve_response(&request, &response, &mut assertions, NOW);
            assert_eq!(completed[0].status(), AssertionStatus::Failed);
            let reason = completed[0].status_reason();
            assert!(reason.starts_with(
                "Expected HTTP response headers not found in actual headers:"
            ));
            assert!(reason.contains("Expected:\nx-trace: on"));
            assert!(reason.contains("Actual:\nfs-resp-for: hdrs"));
        }

        #[test]
        fn malformed_expected_headers_fail_outright() {
            let (request, response) = correlated_response("hdrs", 200);
            let mut assertions = vec![test_assertion(
                "hdrs",
                AssertionType::ResponseHeaders,
                "{broken",
            )];
            let completed = resolve_response(&request, &response, &mut assertions, NOW);
            assert_eq!(
                completed[0].status_reason(),
                "Expected HTTP response headers is not a valid JSON"
            );
        }

        #[test]
        fn dom_assertions_ignore_http_exchanges() {
            let (request, response) = correlated_response("k", 200);
            let mut assertions = vec![test_assertion("k", AssertionType::Added, "#panel")];
            assert!(resolve_response(&request, &response, &mut assertions, NOW).is_empty());
        }
    }

    mod error_tests {
        use super::*;

        fn not_found_error(key: &str) -> HttpErrorInfo {
            HttpErrorInfo {
                message: "HTTP Error: Not Found".to_string(),
                status: 404,
                response_text: String::new(),
                request_headers: HashMap::new(),
                response_headers: Some(headers(&[("fs-resp-for", key)])),
                url: "https://api.example/orders".to_string(),
            }
        }

        #[test]
        fn errored_exchange_fails_correlated_status_assertion_with_error_message() {
            let mut assertions = vec![test_assertion(
                "order-created",
                AssertionType::ResponseStatus,
                "200",
            )];
            let completed = resolve_error(&not_found_error("order-created"), &mut assertions, NOW);
            assert_eq!(completed[0].status(), AssertionStatus::Failed);
            assert_eq!(completed[0].status_reason(), "HTTP Error: Not Found");
            assert_eq!(completed[0].assertion().kind, AssertionType::ResponseStatus);
        }

        #[test]
        fn expected_error_status_still_passes() {
            let mut assertions = vec![test_assertion(
                "order-created",
                AssertionType::ResponseStatus,
                "404",
            )];
            let completed = resolve_error(&not_found_error("order-created"), &mut assertions, NOW);
            assert_eq!(completed[0].status(), AssertionStatus::Passed);
        }

        #[test]
        fn network_failure_fails_every_correlated_assertion() {
            let error = HttpErrorInfo {
                message: "Failed to fetch".to_string(),
                status: 0,
                response_text: String::new(),
                request_headers: headers(&[("fs-resp-for", "order-created")]),
                response_headers: None,
                url: "https://api.example/orders".to_string(),
            };
            let mut assertions = vec![
                test_assertion("order-created", AssertionType::ResponseStatus, "200"),
                test_assertion("order-created", AssertionType::ResponseHeaders, "{}"),
                test_assertion("unrelated", AssertionType::ResponseStatus, "200"),
            ];
            let completed = resolve_error(&error, &mut assertions, NOW);
            assert_eq!(completed.len(), 2);
            assert!(completed
                .iter()
                .all(|c| c.status_reason() == "Failed to fetch"));
            assert!(assertions[2].is_pending());
        }
    }
}
