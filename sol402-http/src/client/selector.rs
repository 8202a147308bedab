//! Default payment requirement selection.

use sol402::SCHEME_EXACT;
use sol402::network::usdc_deployment;
use sol402::proto::PaymentRequirements;

/// Picks the requirement the default client strategy would pay.
///
/// Preference order: exact-scheme offers on Solana networks, then among
/// those the ones paying in the network's canonical USDC, and otherwise
/// the original `accepts` order. Returns the index into `accepts`, or
/// `None` when nothing is payable.
#[must_use]
pub fn select_requirement(accepts: &[PaymentRequirements]) -> Option<usize> {
    let payable = |r: &PaymentRequirements| r.scheme == SCHEME_EXACT && r.network.is_solana();

    let usdc_match = accepts.iter().position(|r| {
        payable(r)
            && usdc_deployment(r.network).is_some_and(|deployment| deployment.mint == r.asset)
    });
    if usdc_match.is_some() {
        return usdc_match;
    }

    accepts.iter().position(payable)
}
