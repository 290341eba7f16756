use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per normalized route.
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

/// Replaces identifier segments with `{id}` to keep label cardinality bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if is_identifier(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_identifier(segment: &str) -> bool {
    is_uuid_like(segment)
        || is_object_id(segment)
        || is_numeric_id(segment)
        || segment.starts_with("ORD-")
        || segment.starts_with("CERT-")
        || segment.starts_with("pay_")
}

fn is_uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// Legacy 24-hex document ids.
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
            normalize_path("/api/quiz/550e8400-e29b-41d4-a716-446655440000/start"),
            "/api/quiz/{id}/start"
        );
        assert_eq!(
            normalize_path("/api/orders/ORD-1700000000000-AB12CD34E"),
            "/api/orders/{id}"
        );
        assert_eq!(
            normalize_path("/api/certificates/verify/CERT-1700000000000-0042"),
            "/api/certificates/verify/{id}"
        );
        assert_eq!(
            normalize_path("/api/video/course/64f1c2a9e4b0a1b2c3d4e5f6"),
            "/api/video/course/{id}"
        );
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn plain_words_are_kept() {
        assert!(!is_identifier("my-certificates"));
        assert!(!is_identifier("create"));
        assert!(is_identifier("123"));
    }
}
