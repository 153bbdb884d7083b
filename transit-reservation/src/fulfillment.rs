use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use transit_core::{CoreError, CoreResult};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// What a proof-of-purchase token binds together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
}

/// Signs and checks the scannable proof attached to a booking.
///
/// Token format: `base64url(json payload) "." base64url(hmac_sha256(json payload))`.
#[derive(Clone)]
pub struct ProofSigner {
    key: Vec<u8>,
}

impl ProofSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> CoreResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CoreError::Unavailable(format!("Proof key rejected: {}", e)))
    }

    pub fn sign(&self, booking_id: Uuid, passenger_id: Uuid) -> CoreResult<String> {
        let payload = serde_json::to_vec(&ProofPayload { booking_id, passenger_id })
            .map_err(|e| CoreError::Unavailable(format!("Proof encoding failed: {}", e)))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Fails with `Unauthorized` on any malformed or forged token.
    pub fn verify(&self, token: &str) -> CoreResult<ProofPayload> {
        let invalid = || CoreError::Unauthorized("Invalid proof of purchase".into());

        let (payload_b64, tag_b64) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&tag).map_err(|_| invalid())?;

        serde_json::from_slice(&payload).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_proof_verifies() {
        let signer = ProofSigner::new("proof-secret");
        let booking_id = Uuid::new_v4();
        let passenger_id = Uuid::new_v4();

        let token = signer.sign(booking_id, passenger_id).unwrap();
        let payload = signer.verify(&token).unwrap();
        assert_eq!(payload.booking_id, booking_id);
        assert_eq!(payload.passenger_id, passenger_id);
    }

    #[test]
    fn test_tampered_or_foreign_proof_is_rejected() {
        let signer = ProofSigner::new("proof-secret");
        let token = signer.sign(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let other = ProofSigner::new("another-secret");
        assert!(matches!(other.verify(&token), Err(CoreError::Unauthorized(_))));

        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&ProofPayload {
                booking_id: Uuid::new_v4(),
                passenger_id: Uuid::new_v4(),
            })
            .unwrap(),
        );
        let (_, tag) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", forged_payload, tag);
        assert!(signer.verify(&forged).is_err());

        assert!(signer.verify("not-a-token").is_err());
    }
}
