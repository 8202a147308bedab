//! Browser paywall rendering.
//!
//! When a browser hits a protected route without payment, the gate answers
//! with an HTML page instead of the JSON challenge. The page is an opaque
//! blob as far as the protocol is concerned: the payment requirements are
//! embedded as JSON for wallet tooling to pick up, and routes may supply
//! their own HTML entirely.

use http::HeaderMap;

use sol402::proto::PaymentRequired;

/// Whether a request looks like an interactive browser navigation.
///
/// Browsers advertise `text/html` in `Accept` and a Mozilla-family
/// `User-Agent`; API clients do neither.
#[must_use]
pub fn is_browser_request(headers: &HeaderMap) -> bool {
    let accepts_html = headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));
    let mozilla_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("Mozilla"));
    accepts_html && mozilla_agent
}

/// Renders the built-in paywall page for a 402 challenge.
#[must_use]
pub fn render_paywall(challenge: &PaymentRequired) -> String {
    let requirements_json =
        serde_json::to_string(challenge).unwrap_or_else(|_| "{}".to_owned());
    let description = challenge
        .accepts
        .first()
        .map(|r| r.description.as_str())
        .filter(|d| !d.is_empty())
        .unwrap_or("this resource");
    let amount = challenge
        .accepts
        .first()
        .map_or(String::new(), |r| {
            format!("{} atomic units", r.max_amount_required)
        });

    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Payment Required</title>\n\
         <script type=\"application/json\" id=\"x402\">{requirements_json}</script>\n\
         </head>\n<body>\n\
         <h1>Payment Required</h1>\n\
         <p>Access to {description} requires a payment of {amount}.</p>\n\
         <p>Retry the request with an <code>X-PAYMENT</code> header signed by your wallet.</p>\n\
         </body>\n</html>\n"
    )
}
