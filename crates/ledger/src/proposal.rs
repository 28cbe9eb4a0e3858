//! Signed transaction proposals.

use filechain_identity::{verify_signature, Certificate, Identity};
use filechain_types::{compute_tx_id, TxCreator};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::errors::*;

const NONCE_LEN: usize = 24;

/// A request to invoke `function` on a chaincode, signed by its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub channel: String,
    pub chaincode: String,
    pub function: String,
    pub args: Vec<String>,
    pub creator: TxCreator,
    /// Base64 certificate of the creator, as issued by its CA.
    pub certificate: String,
    /// Hex encoded random nonce; makes every proposal unique.
    pub nonce: String,
    /// Hex encoded Ed25519 signature over [`Proposal::signing_bytes`].
    #[serde(default)]
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedFields<'a> {
    channel: &'a str,
    chaincode: &'a str,
    function: &'a str,
    args: &'a [String],
    creator: &'a TxCreator,
    certificate: &'a str,
    nonce: &'a str,
}

impl Proposal {
    /// Build and sign a proposal for `identity` (stored under `label`).
    pub fn signed(
        identity: &Identity,
        label: &str,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: Vec<String>,
    ) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut proposal = Self {
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            function: function.to_string(),
            args,
            creator: TxCreator {
                msp_id: identity.msp_id.clone(),
                label: label.to_string(),
                public_key: identity.public_key()?,
            },
            certificate: identity.credentials.certificate.clone(),
            nonce: hex::encode(nonce),
            signature: String::new(),
        };
        proposal.signature = identity.sign(&proposal.signing_bytes()?)?;
        Ok(proposal)
    }

    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&SignedFields {
            channel: &self.channel,
            chaincode: &self.chaincode,
            function: &self.function,
            args: &self.args,
            creator: &self.creator,
            certificate: &self.certificate,
            nonce: &self.nonce,
        })?)
    }

    pub fn tx_id(&self) -> String {
        compute_tx_id(self.nonce.as_bytes(), &self.creator)
    }

    /// Check the creator's certificate against `ca_public_key` and the
    /// proposal signature against the certified key. Returns the verified
    /// certificate.
    pub fn verify(&self, ca_public_key: &str) -> Result<Certificate> {
        let certificate = Certificate::decode(&self.certificate)?;
        certificate.verify(ca_public_key)?;
        if certificate.body.msp_id != self.creator.msp_id {
            return Err(LedgerError::Unauthorized(format!(
                "certificate belongs to {}, proposal claims {}",
                certificate.body.msp_id, self.creator.msp_id
            )));
        }
        if certificate.body.public_key != self.creator.public_key {
            return Err(LedgerError::Unauthorized(
                "creator key does not match certificate".into(),
            ));
        }
        verify_signature(&self.creator.public_key, &self.signing_bytes()?, &self.signature)?;
        Ok(certificate)
    }

    /// Subject named in the creator's certificate.
    pub fn subject(&self) -> Result<String> {
        Ok(Certificate::decode(&self.certificate)?.body.subject)
    }
}
