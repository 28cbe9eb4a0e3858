//! Wallet identity format and the certificates it carries.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ca::Role;
use crate::crypto::{sign_hex, signing_key_from_hex, verify_signature};
use crate::errors::*;

/// Value of the `type` field for every identity this crate issues.
pub const IDENTITY_TYPE: &str = "ed25519";

/// Signed statement binding a public key to a subject within an MSP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBody {
    pub subject: String,
    pub affiliation: String,
    pub role: Role,
    pub msp_id: String,
    /// Hex encoded Ed25519 verifying key of the subject.
    pub public_key: String,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
}

impl CertificateBody {
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(flatten)]
    pub body: CertificateBody,
    /// Issuer's hex encoded signature over the body.
    pub signature: String,
}

impl Certificate {
    /// Base64 of the JSON document, as stored in the wallet.
    pub fn encode(&self) -> Result<String> {
        Ok(general_purpose::STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| IdentityError::InvalidCredentials(format!("certificate: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Check the issuer signature against the CA's public key.
    pub fn verify(&self, issuer_public_key: &str) -> Result<()> {
        verify_signature(issuer_public_key, &self.body.signing_bytes()?, &self.signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub certificate: String,
    /// Hex encoded Ed25519 secret key.
    pub private_key: String,
}

/// Contents of a `<label>.id` wallet file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub credentials: Credentials,
    pub msp_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
}

impl Identity {
    pub fn new(certificate: String, private_key: String, msp_id: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                certificate,
                private_key,
            },
            msp_id: msp_id.into(),
            kind: IDENTITY_TYPE.to_string(),
            version: 1,
        }
    }

    pub fn certificate(&self) -> Result<Certificate> {
        Certificate::decode(&self.credentials.certificate)
    }

    pub fn public_key(&self) -> Result<String> {
        Ok(self.certificate()?.body.public_key)
    }

    /// Sign `message` with the identity's private key; hex encoded.
    pub fn sign(&self, message: &[u8]) -> Result<String> {
        let key = signing_key_from_hex(&self.credentials.private_key)?;
        Ok(sign_hex(&key, message))
    }

    /// Check that the private key matches the certified public key.
    pub fn validate(&self) -> Result<()> {
        let key = signing_key_from_hex(&self.credentials.private_key)?;
        let certified = self.public_key()?;
        if hex::encode(key.verifying_key().to_bytes()) != certified {
            return Err(IdentityError::InvalidCredentials(
                "private key does not match certificate".into(),
            ));
        }
        Ok(())
    }
}
