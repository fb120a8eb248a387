use axum::http::HeaderValue;
use common::CorsConfig;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// One allowed origin: exact, or `scheme://*.suffix` matching any subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPattern {
    Exact(String),
    Subdomains { scheme: String, suffix: String },
}

impl OriginPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.split_once("://*.") {
            Some((scheme, suffix)) => OriginPattern::Subdomains {
                scheme: format!("{scheme}://"),
                suffix: format!(".{suffix}"),
            },
            None => OriginPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Exact(allowed) => allowed == origin,
            OriginPattern::Subdomains { scheme, suffix } => origin
                .strip_prefix(scheme.as_str())
                .and_then(|host| host.strip_suffix(suffix.as_str()))
                .is_some_and(|sub| !sub.is_empty() && sub.split('.').all(is_dns_label)),
        }
    }
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Allowed origins plus mirrored methods and headers. Wildcards for methods
/// and headers cannot be combined with credentials, so requests are mirrored.
pub fn layer(config: &CorsConfig) -> CorsLayer {
    let patterns: Vec<OriginPattern> = config
        .allowed_origins
        .iter()
        .map(|p| OriginPattern::parse(p))
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request| {
                origin
                    .to_str()
                    .is_ok_and(|origin| patterns.iter().any(|p| p.matches(origin)))
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.allow_credentials)
}
