//! Resource-server payment middleware.
//!
//! [`PaymentGateLayer`] wraps an inner tower service so that requests to
//! configured routes must carry a valid `X-PAYMENT` header. The gate
//! enforces the commit ordering of the protocol: the payment is verified
//! before the handler runs, the handler's full response is buffered, and
//! settlement happens only after the handler succeeded — a failed handler
//! never charges the ledger, and the client never sees protected bytes
//! until settlement was at least attempted.

mod gate;
mod paywall;
mod routes;

pub use gate::{PaymentGateLayer, PaymentGateService};
pub use paywall::{is_browser_request, render_paywall};
pub use routes::{CompiledRoutes, RouteConfig, RoutesConfig, normalize_path};
