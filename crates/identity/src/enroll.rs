//! Wallet bootstrap helpers: enroll the CA admin and onboard users.

use crate::ca::{CertificateAuthority, RegistrationRequest, Role};
use crate::errors::*;
use crate::identity::Identity;
use crate::wallet::Wallet;

/// Bootstrap admin registered with every local CA.
pub const ADMIN_USER_ID: &str = "admin";
pub const ADMIN_USER_PASSWD: &str = "adminpw";

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub enrollment_id: String,
    pub secret: String,
}

impl Default for AdminCredentials {
    fn default() -> Self {
        Self {
            enrollment_id: ADMIN_USER_ID.to_string(),
            secret: ADMIN_USER_PASSWD.to_string(),
        }
    }
}

fn check_msp(ca: &dyn CertificateAuthority, msp_id: &str) -> Result<()> {
    if ca.msp_id() != msp_id {
        return Err(IdentityError::UnknownMsp(format!(
            "{msp_id} (CA {} serves {})",
            ca.name(),
            ca.msp_id()
        )));
    }
    Ok(())
}

/// Enroll the CA admin into the wallet. No-op if the wallet already holds it.
pub async fn enroll_admin(
    ca: &dyn CertificateAuthority,
    wallet: &Wallet,
    msp_id: &str,
    admin: &AdminCredentials,
) -> Result<()> {
    if wallet.exists(&admin.enrollment_id)? {
        tracing::info!(label = %admin.enrollment_id, "admin identity already in wallet");
        return Ok(());
    }
    check_msp(ca, msp_id)?;

    let enrollment = ca.enroll(&admin.enrollment_id, &admin.secret).await?;
    let identity = Identity::new(enrollment.certificate, enrollment.private_key, msp_id);
    wallet.put(&admin.enrollment_id, &identity)?;
    tracing::info!(label = %admin.enrollment_id, msp_id, "enrolled admin identity");
    Ok(())
}

/// Register `user_id` with the CA as a client of `affiliation`, enroll it and
/// store the identity. No-op if the wallet already holds `user_id`. The admin
/// must have been enrolled first.
pub async fn register_and_enroll_user(
    ca: &dyn CertificateAuthority,
    wallet: &Wallet,
    msp_id: &str,
    user_id: &str,
    affiliation: &str,
    admin_label: &str,
) -> Result<()> {
    if wallet.exists(user_id)? {
        tracing::info!(label = user_id, "user identity already in wallet");
        return Ok(());
    }
    check_msp(ca, msp_id)?;

    let admin = wallet.get(admin_label)?.ok_or_else(|| {
        IdentityError::NotFound(format!(
            "{admin_label} (enroll the admin before registering users)"
        ))
    })?;

    let secret = ca
        .register(
            &admin.credentials.certificate,
            RegistrationRequest {
                enrollment_id: user_id.to_string(),
                affiliation: affiliation.to_string(),
                role: Role::Client,
                secret: None,
            },
        )
        .await?;
    let enrollment = ca.enroll(user_id, &secret).await?;
    wallet.put(
        user_id,
        &Identity::new(enrollment.certificate, enrollment.private_key, msp_id),
    )?;
    tracing::info!(label = user_id, msp_id, affiliation, "registered and enrolled user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::LocalCertificateAuthority;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        ca: LocalCertificateAuthority,
        wallet: Wallet,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let ca = LocalCertificateAuthority::open(
            dir.path().join("ca"),
            "ca.org1.example.com",
            "Org1MSP",
            ADMIN_USER_ID,
            ADMIN_USER_PASSWD,
        )
        .unwrap();
        let wallet = Wallet::open(dir.path().join("wallet")).unwrap();
        Fixture {
            _dir: dir,
            ca,
            wallet,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_sequence() {
        let f = fixture();
        enroll_admin(&f.ca, &f.wallet, "Org1MSP", &AdminCredentials::default())
            .await
            .unwrap();
        register_and_enroll_user(&f.ca, &f.wallet, "Org1MSP", "appUser", "org1.department1", ADMIN_USER_ID)
            .await
            .unwrap();

        let user = f.wallet.require("appUser").unwrap();
        user.validate().unwrap();
        let cert = user.certificate().unwrap();
        assert_eq!(cert.body.role, Role::Client);
        cert.verify(&f.ca.public_key()).unwrap();
    }

    #[tokio::test]
    async fn test_repeat_calls_are_noops() {
        let f = fixture();
        let admin = AdminCredentials::default();
        enroll_admin(&f.ca, &f.wallet, "Org1MSP", &admin).await.unwrap();
        let first = f.wallet.require(ADMIN_USER_ID).unwrap();
        enroll_admin(&f.ca, &f.wallet, "Org1MSP", &admin).await.unwrap();
        assert_eq!(f.wallet.require(ADMIN_USER_ID).unwrap(), first);

        register_and_enroll_user(&f.ca, &f.wallet, "Org1MSP", "bob", "org1.department1", ADMIN_USER_ID)
            .await
            .unwrap();
        // A second registration would fail at the CA; the wallet check short-circuits it.
        register_and_enroll_user(&f.ca, &f.wallet, "Org1MSP", "bob", "org1.department1", ADMIN_USER_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_requires_enrolled_admin() {
        let f = fixture();
        assert!(matches!(
            register_and_enroll_user(&f.ca, &f.wallet, "Org1MSP", "appUser", "org1.department1", ADMIN_USER_ID).await,
            Err(IdentityError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_msp_is_rejected() {
        let f = fixture();
        assert!(matches!(
            enroll_admin(&f.ca, &f.wallet, "Org2MSP", &AdminCredentials::default()).await,
            Err(IdentityError::UnknownMsp(_))
        ));
    }
}
