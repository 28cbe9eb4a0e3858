//! Identities, the wallet that stores them, and the certificate authority
//! that issues them.
//!
//! An [`Identity`] is an Ed25519 key pair plus a certificate signed by a
//! [`CertificateAuthority`]. Identities are persisted as `<label>.id` files in
//! a [`Wallet`] directory and used to sign ledger proposals.

pub mod ca;
pub mod crypto;
pub mod enroll;
pub mod errors;
pub mod identity;
pub mod wallet;

pub use ca::{
    CertificateAuthority, Enrollment, LocalCertificateAuthority, RegistrationRequest, Role,
};
pub use crypto::{generate_keypair, verify_signature};
pub use enroll::{
    enroll_admin, register_and_enroll_user, AdminCredentials, ADMIN_USER_ID, ADMIN_USER_PASSWD,
};
pub use errors::{IdentityError, Result};
pub use identity::{Certificate, CertificateBody, Credentials, Identity, IDENTITY_TYPE};
pub use wallet::{Wallet, WalletEntry};
