use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per method, normalized path and status.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Replaces session ids and answer positions with placeholders to keep
/// label cardinality bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_object_id(segment) {
                "{id}"
            } else if is_numeric_id(segment) {
                "{position}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// 24 hex characters, the string form of a MongoDB ObjectId.
fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/sessions/65f0c0ffee0000000000abcd"),
            "/sessions/{id}"
        );
        assert_eq!(
            normalize_path("/session_answers/65f0c0ffee0000000000abcd/3"),
            "/session_answers/{id}/{position}"
        );
        assert_eq!(
            normalize_path("/session_answers/65f0c0ffee0000000000abcd/update-multiple-answers"),
            "/session_answers/{id}/update-multiple-answers"
        );
        assert_eq!(normalize_path("/sessions/"), "/sessions/");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_is_object_id() {
        assert!(is_object_id("65f0c0ffee0000000000abcd"));
        assert!(!is_object_id("65f0c0ffee0000000000abc"));
        assert!(!is_object_id("not-an-object-id-at-all!"));
    }
}
