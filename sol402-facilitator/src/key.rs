//! Facilitator signing key loading.
//!
//! The fee-payer keypair is process-wide state: loaded once at startup and
//! held for the life of the service. The intermediate byte buffer used
//! during parsing is overwritten before it is dropped so decoded key
//! material does not linger in freed memory.

use solana_keypair::Keypair;

/// Error loading a facilitator keypair.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The value is not valid base58.
    #[error("signer keypair is not valid base58")]
    Base58,
    /// The decoded bytes are not a valid 64-byte keypair.
    #[error("signer keypair bytes are invalid")]
    Bytes,
    /// The value still contains an unresolved `$VAR` reference.
    #[error("signer keypair references an unresolved environment variable")]
    Unresolved,
}

/// Parses a base58-encoded 64-byte keypair.
///
/// # Errors
///
/// Returns [`KeyError`] on malformed input or an unresolved `$VAR`
/// placeholder left by config expansion.
pub fn parse_keypair(encoded: &str) -> Result<Keypair, KeyError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() || trimmed.starts_with('$') {
        return Err(KeyError::Unresolved);
    }

    let mut bytes = bs58::decode(trimmed)
        .into_vec()
        .map_err(|_| KeyError::Base58)?;
    let keypair = Keypair::try_from(bytes.as_slice()).map_err(|_| KeyError::Bytes);
    bytes.fill(0);
    keypair
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_signer::Signer;

    #[test]
    fn round_trips_a_keypair() {
        let keypair = Keypair::new();
        let encoded = keypair.to_base58_string();
        let parsed = parse_keypair(&encoded).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn rejects_unresolved_placeholders() {
        assert!(matches!(
            parse_keypair("$FACILITATOR_KEY"),
            Err(KeyError::Unresolved)
        ));
        assert!(matches!(parse_keypair("  "), Err(KeyError::Unresolved)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_keypair("0OIl"), Err(KeyError::Base58)));
        assert!(matches!(parse_keypair("abc"), Err(KeyError::Bytes)));
    }
}
