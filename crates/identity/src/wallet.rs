//! Directory of `<label>.id` identity files.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::*;
use crate::identity::Identity;

const ID_EXTENSION: &str = "id";

/// Summary row for identity listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletEntry {
    pub label: String,
    pub msp_id: String,
    pub kind: String,
}

/// Filesystem wallet
#[derive(Debug, Clone)]
pub struct Wallet {
    dir: PathBuf,
}

impl Wallet {
    /// Open a wallet directory, creating it if missing.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, label: &str) -> Result<PathBuf> {
        validate_label(label)?;
        Ok(self.dir.join(format!("{label}.{ID_EXTENSION}")))
    }

    pub fn exists(&self, label: &str) -> Result<bool> {
        Ok(self.path_for(label)?.is_file())
    }

    pub fn get(&self, label: &str) -> Result<Option<Identity>> {
        let path = self.path_for(label)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Like [`Wallet::get`] but a missing identity is an error.
    pub fn require(&self, label: &str) -> Result<Identity> {
        self.get(label)?
            .ok_or_else(|| IdentityError::NotFound(label.to_string()))
    }

    pub fn put(&self, label: &str, identity: &Identity) -> Result<()> {
        let path = self.path_for(label)?;
        let data = serde_json::to_vec_pretty(identity)?;

        // Write to temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        fs::rename(&temp_path, &path)?;
        tracing::debug!(label, msp_id = %identity.msp_id, "stored identity in wallet");
        Ok(())
    }

    /// Every identity in the wallet, sorted by label.
    pub fn list(&self) -> Result<Vec<WalletEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(ID_EXTENSION) {
                continue;
            }
            let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read(&path)
                .map_err(IdentityError::from)
                .and_then(|data| Ok(serde_json::from_slice::<Identity>(&data)?))
            {
                Ok(identity) => entries.push(WalletEntry {
                    label: label.to_string(),
                    msp_id: identity.msp_id,
                    kind: identity.kind,
                }),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable wallet entry")
                }
            }
        }
        entries.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(entries)
    }
}

fn validate_label(label: &str) -> Result<()> {
    let valid = !label.is_empty()
        && label.len() <= 64
        && !label.starts_with('.')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(IdentityError::InvalidLabel(label.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dummy(msp: &str) -> Identity {
        Identity::new("Y2VydA==".into(), "00".repeat(32), msp)
    }

    #[test]
    fn test_put_get_list() {
        let dir = tempdir().unwrap();
        let wallet = Wallet::open(dir.path().join("wallet")).unwrap();

        assert!(!wallet.exists("appUser").unwrap());
        wallet.put("appUser", &dummy("Org1MSP")).unwrap();
        wallet.put("admin", &dummy("Org1MSP")).unwrap();

        assert!(wallet.exists("appUser").unwrap());
        assert_eq!(wallet.get("appUser").unwrap().unwrap().msp_id, "Org1MSP");
        assert!(dir.path().join("wallet/appUser.id").is_file());

        let labels: Vec<String> = wallet.list().unwrap().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["admin", "appUser"]);
    }

    #[test]
    fn test_missing_identity() {
        let dir = tempdir().unwrap();
        let wallet = Wallet::open(dir.path()).unwrap();
        assert!(wallet.get("ghost").unwrap().is_none());
        assert!(matches!(
            wallet.require("ghost"),
            Err(IdentityError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_labels() {
        let dir = tempdir().unwrap();
        let wallet = Wallet::open(dir.path()).unwrap();
        for label in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                wallet.put(label, &dummy("Org1MSP")),
                Err(IdentityError::InvalidLabel(_))
            ));
        }
    }

    #[test]
    fn test_list_skips_foreign_and_corrupt_files() {
        let dir = tempdir().unwrap();
        let wallet = Wallet::open(dir.path()).unwrap();
        wallet.put("good", &dummy("Org2MSP")).unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        fs::write(dir.path().join("broken.id"), "{").unwrap();

        let entries = wallet.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].msp_id, "Org2MSP");
        assert_eq!(entries[0].kind, "ed25519");
    }
}
