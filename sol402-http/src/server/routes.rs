//! Route configuration and pattern matching.
//!
//! Route maps are keyed `"[VERB ]path"`; a missing verb matches any method.
//! Paths support `[param]` (one segment) and `*` (any run of characters,
//! shortest match). Incoming paths are normalized before matching:
//! percent-decoded, backslashes to slashes, slash runs collapsed, query
//! and fragment stripped, trailing slashes stripped, compared
//! case-insensitively. When several patterns match, the longest pattern
//! wins.

use std::borrow::Cow;
use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use serde_json::Value;

use sol402::Network;
use sol402::price::{AssetDescriptor, Price};

/// Payment configuration for one protected route.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// The price of the resource.
    pub price: Price,
    /// Network the payment must settle on.
    pub network: Network,
    /// Human-readable description included in challenges.
    pub description: String,
    /// MIME type of the protected resource.
    pub mime_type: String,
    /// Upper bound on settlement time, in seconds.
    pub max_timeout_seconds: u64,
    /// Whether the route may be listed by discovery tooling.
    pub discoverable: bool,
    /// Override for the resource URL advertised in challenges.
    pub resource: Option<String>,
    /// Optional metadata describing the endpoint's request/response shape.
    pub output_schema: Option<Value>,
    /// Custom HTML served to browsers instead of the built-in paywall.
    pub custom_paywall_html: Option<String>,
    /// Token used to denominate USD prices instead of the network's USDC.
    pub default_token: Option<AssetDescriptor>,
}

impl RouteConfig {
    /// A route priced in USD on the given network, with defaults for the
    /// rest.
    #[must_use]
    pub fn new(price: impl Into<Price>, network: Network) -> Self {
        Self {
            price: price.into(),
            network,
            description: String::new(),
            mime_type: "application/json".to_owned(),
            max_timeout_seconds: 60,
            discoverable: false,
            resource: None,
            output_schema: None,
            custom_paywall_html: None,
            default_token: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the settlement timeout bound.
    #[must_use]
    pub const fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }
}

/// Route map: `"[VERB ]path"` pattern → config.
pub type RoutesConfig = HashMap<String, RouteConfig>;

/// One parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Literal text, compared case-insensitively.
    Literal(String),
    /// `[param]` — exactly one path segment (no `/`).
    Param,
    /// `*` — any run of characters, shortest match.
    Wildcard,
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
struct Pattern {
    tokens: Vec<Token>,
    /// Source length, for the longest-pattern tie-break.
    source_len: usize,
}

impl Pattern {
    fn compile(source: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('*') {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Wildcard);
                rest = after;
            } else if rest.starts_with('[') {
                if let Some(close) = rest.find(']') {
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Param);
                    rest = &rest[close + 1..];
                } else {
                    literal.push('[');
                    rest = &rest[1..];
                }
            } else {
                let mut chars = rest.chars();
                literal.push(chars.next().unwrap_or_default());
                rest = chars.as_str();
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Self {
            tokens,
            source_len: source.len(),
        }
    }

    fn matches(&self, path: &str) -> bool {
        Self::match_tokens(&self.tokens, path)
    }

    fn match_tokens(tokens: &[Token], path: &str) -> bool {
        let Some((first, rest)) = tokens.split_first() else {
            return path.is_empty();
        };
        match first {
            Token::Literal(literal) => {
                if path.len() < literal.len() {
                    return false;
                }
                let (head, tail) = path.split_at(literal.len());
                head.eq_ignore_ascii_case(literal) && Self::match_tokens(rest, tail)
            }
            Token::Param => {
                let segment_end = path.find('/').unwrap_or(path.len());
                if segment_end == 0 {
                    return false;
                }
                // A param consumes one whole segment.
                Self::match_tokens(rest, &path[segment_end..])
            }
            Token::Wildcard => {
                // Shortest match first.
                (0..=path.len()).any(|split| Self::match_tokens(rest, &path[split..]))
            }
        }
    }
}

/// A compiled `(verb, pattern, config)` entry.
#[derive(Debug, Clone)]
struct CompiledRoute {
    /// Uppercase HTTP method, or `None` for any.
    method: Option<String>,
    pattern: Pattern,
    config: RouteConfig,
}

/// The compiled form of a [`RoutesConfig`].
#[derive(Debug, Clone, Default)]
pub struct CompiledRoutes {
    routes: Vec<CompiledRoute>,
}

impl CompiledRoutes {
    /// Compiles a route map.
    #[must_use]
    pub fn compile(routes: RoutesConfig) -> Self {
        let routes = routes
            .into_iter()
            .map(|(key, config)| {
                let (method, mut path) = parse_route_key(&key);
                // Incoming paths are matched with trailing slashes
                // stripped; keep patterns on the same footing.
                while path.len() > 1 && path.ends_with('/') {
                    path.pop();
                }
                CompiledRoute {
                    method,
                    pattern: Pattern::compile(&path),
                    config,
                }
            })
            .collect();
        Self { routes }
    }

    /// Finds the configuration for a request, if any route matches.
    ///
    /// On ambiguity the route with the longest pattern source wins.
    #[must_use]
    pub fn find(&self, method: &str, raw_path: &str) -> Option<&RouteConfig> {
        let path = normalize_path(raw_path);
        self.routes
            .iter()
            .filter(|route| {
                route
                    .method
                    .as_ref()
                    .is_none_or(|m| m.eq_ignore_ascii_case(method))
                    && route.pattern.matches(&path)
            })
            .max_by_key(|route| route.pattern.source_len)
            .map(|route| &route.config)
    }

    /// Number of compiled routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Splits a route key into `(method, path)`.
fn parse_route_key(key: &str) -> (Option<String>, String) {
    let trimmed = key.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((method, path)) => (Some(method.to_uppercase()), path.trim().to_owned()),
        None => (None, trimmed.to_owned()),
    }
}

/// Normalizes a request path for matching.
///
/// Percent-decodes, converts `\` to `/`, collapses slash runs, strips the
/// query/fragment and trailing slashes.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let without_query = raw
        .split_once(['?', '#'])
        .map_or(raw, |(path, _)| path);
    let decoded: Cow<'_, str> = percent_decode_str(without_query).decode_utf8_lossy();

    let mut normalized = String::with_capacity(decoded.len());
    let mut previous_slash = false;
    for ch in decoded.chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        normalized.push(ch);
    }
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}
