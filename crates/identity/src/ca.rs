//! Certificate authority abstraction and the local file-backed CA.
//!
//! The local CA keeps its signing key in `ca.key` and the registration table
//! in `registrations.json` under its directory. Registrations store a BLAKE3
//! hash of the enrollment secret, never the secret itself.

use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::{decode_key, generate_keypair, random_token, sign_hex};
use crate::errors::*;
use crate::identity::{Certificate, CertificateBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

/// Key pair and certificate handed out by a successful enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub certificate: String,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    pub affiliation: String,
    pub role: Role,
    /// Secret to register with; generated when `None`.
    pub secret: Option<String>,
}

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Name clients use to address this CA.
    fn name(&self) -> &str;

    /// MSP whose members this CA certifies.
    fn msp_id(&self) -> &str;

    /// Hex encoded public key that signs every issued certificate.
    fn public_key(&self) -> String;

    /// Register a new enrollment id. `registrar_certificate` must be an
    /// admin certificate issued by this CA. Returns the enrollment secret.
    async fn register(
        &self,
        registrar_certificate: &str,
        request: RegistrationRequest,
    ) -> Result<String>;

    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Registration {
    secret_hash: String,
    affiliation: String,
    role: Role,
    enrollments: u32,
}

fn hash_secret(secret: &str) -> String {
    blake3::hash(secret.as_bytes()).to_hex().to_string()
}

/// File-backed CA for a single MSP.
pub struct LocalCertificateAuthority {
    name: String,
    msp_id: String,
    signing_key: SigningKey,
    registrations_path: PathBuf,
    registrations: Mutex<BTreeMap<String, Registration>>,
}

impl LocalCertificateAuthority {
    /// Open the CA stored in `dir`, creating its key on first use. The
    /// bootstrap admin (`admin_id` / `admin_secret`) is registered if absent.
    pub fn open(
        dir: impl AsRef<Path>,
        name: impl Into<String>,
        msp_id: impl Into<String>,
        admin_id: &str,
        admin_secret: &str,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let key_path = dir.join("ca.key");
        let signing_key = if key_path.is_file() {
            let hex_key = fs::read_to_string(&key_path)?;
            SigningKey::from_bytes(&decode_key(hex_key.trim(), "ca.key")?)
        } else {
            let (secret, _) = generate_keypair();
            write_atomic(&key_path, hex::encode(secret).as_bytes())?;
            tracing::info!(path = %key_path.display(), "generated new CA signing key");
            SigningKey::from_bytes(&secret)
        };

        let registrations_path = dir.join("registrations.json");
        let mut registrations: BTreeMap<String, Registration> = if registrations_path.is_file() {
            serde_json::from_slice(&fs::read(&registrations_path)?)?
        } else {
            BTreeMap::new()
        };

        registrations
            .entry(admin_id.to_string())
            .or_insert_with(|| Registration {
                secret_hash: hash_secret(admin_secret),
                affiliation: String::new(),
                role: Role::Admin,
                enrollments: 0,
            });

        let ca = Self {
            name: name.into(),
            msp_id: msp_id.into(),
            signing_key,
            registrations_path,
            registrations: Mutex::new(BTreeMap::new()),
        };
        ca.persist(&registrations)?;
        *ca.registrations.lock() = registrations;
        Ok(ca)
    }

    fn persist(&self, registrations: &BTreeMap<String, Registration>) -> Result<()> {
        let data = serde_json::to_vec_pretty(registrations)?;
        write_atomic(&self.registrations_path, &data)
    }

    fn issue(&self, subject: &str, registration: &Registration) -> Result<Enrollment> {
        let (secret, public) = generate_keypair();
        let body = CertificateBody {
            subject: subject.to_string(),
            affiliation: registration.affiliation.clone(),
            role: registration.role,
            msp_id: self.msp_id.clone(),
            public_key: hex::encode(public),
            issuer: self.name.clone(),
            issued_at: Utc::now(),
        };
        let signature = sign_hex(&self.signing_key, &body.signing_bytes()?);
        let certificate = Certificate { body, signature }.encode()?;
        Ok(Enrollment {
            certificate,
            private_key: hex::encode(secret),
        })
    }
}

#[async_trait]
impl CertificateAuthority for LocalCertificateAuthority {
    fn name(&self) -> &str {
        &self.name
    }

    fn msp_id(&self) -> &str {
        &self.msp_id
    }

    fn public_key(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    async fn register(
        &self,
        registrar_certificate: &str,
        request: RegistrationRequest,
    ) -> Result<String> {
        let registrar = Certificate::decode(registrar_certificate)?;
        registrar
            .verify(&self.public_key())
            .map_err(|_| IdentityError::Unauthorized("registrar not issued by this CA".into()))?;
        if registrar.body.role != Role::Admin {
            return Err(IdentityError::Unauthorized(format!(
                "{} may not register identities",
                registrar.body.subject
            )));
        }
        if request.enrollment_id.trim().is_empty() {
            return Err(IdentityError::InvalidLabel(request.enrollment_id));
        }

        let mut registrations = self.registrations.lock();
        if registrations.contains_key(&request.enrollment_id) {
            return Err(IdentityError::AlreadyRegistered(request.enrollment_id));
        }

        let secret = request.secret.unwrap_or_else(|| random_token(16));
        registrations.insert(
            request.enrollment_id.clone(),
            Registration {
                secret_hash: hash_secret(&secret),
                affiliation: request.affiliation,
                role: request.role,
                enrollments: 0,
            },
        );
        self.persist(&registrations)?;
        tracing::info!(
            enrollment_id = %request.enrollment_id,
            registrar = %registrar.body.subject,
            "registered identity"
        );
        Ok(secret)
    }

    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment> {
        let mut registrations = self.registrations.lock();
        let registration = registrations
            .get_mut(enrollment_id)
            .ok_or_else(|| IdentityError::Authentication(format!("{enrollment_id} is not registered")))?;
        if registration.secret_hash != hash_secret(secret) {
            return Err(IdentityError::Authentication(format!(
                "invalid secret for {enrollment_id}"
            )));
        }

        registration.enrollments += 1;
        let enrollment = self.issue(enrollment_id, registration)?;
        self.persist(&registrations)?;
        Ok(enrollment)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
