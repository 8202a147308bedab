//! HTTP constants for the x402 protocol.

/// Request header carrying the base64 payment payload (client → server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64 settlement result (server → client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header name for exposing custom headers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// Error text of a 402 challenge issued for a request without payment.
pub const PAYMENT_HEADER_REQUIRED: &str = "X-PAYMENT header is required";

/// Default client-side spending ceiling, in atomic units (0.1 USDC).
pub const DEFAULT_MAX_ATOMIC: u64 = 100_000;
