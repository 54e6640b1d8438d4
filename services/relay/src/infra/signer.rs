use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::repository::PayloadSigner;
use crate::error::RelayError;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 payload signer. Signatures are lowercase hex.
#[derive(Clone, Copy, Default)]
pub struct HmacSigner;

impl PayloadSigner for HmacSigner {
    fn sign(
        &self,
        tenant_id: Option<Uuid>,
        secret: &str,
        payload: &str,
    ) -> Result<String, RelayError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| RelayError::SignatureFailure(format!("invalid key: {e}")))?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        tracing::debug!(tenant_id = ?tenant_id, "webhook payload signed");
        Ok(signature)
    }
}
