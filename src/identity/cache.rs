//! Persisted account and token cache.
//!
//! DESIGN
//! ======
//! Plays the role browser local storage plays for MSAL: one JSON document
//! holding known accounts, the active account, access tokens keyed by
//! account + scope set, and one refresh token per account. Every mutation
//! rewrites the whole file; the document is small.
//!
//! TRADE-OFFS
//! ==========
//! A corrupt cache file is logged and replaced by an empty cache rather than
//! failing startup. The user pays with one extra consent prompt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{Account, IdentityError, normalize_scopes};

/// Access tokens are not served once fewer than this many seconds remain.
pub const TOKEN_RENEWAL_OFFSET_SECS: i64 = 300;

#[cfg(unix)]
const CACHE_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenEntry {
    pub home_account_id: String,
    pub secret: String,
    /// Normalized (lowercase, sorted) scope set.
    pub scopes: Vec<String>,
    /// Unix seconds.
    pub expires_on: i64,
}

impl AccessTokenEntry {
    fn covers(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }

    fn is_fresh(&self, now: i64) -> bool {
        self.expires_on - now > TOKEN_RENEWAL_OFFSET_SECS
    }
}

/// On-disk document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub accounts: BTreeMap<String, Account>,
    #[serde(default)]
    pub active_account: Option<String>,
    #[serde(default)]
    pub access_tokens: Vec<AccessTokenEntry>,
    #[serde(default)]
    pub refresh_tokens: BTreeMap<String, String>,
}

pub struct TokenCache {
    path: Option<PathBuf>,
    inner: Mutex<CacheDocument>,
}

impl TokenCache {
    /// Cache that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self { path: None, inner: Mutex::new(CacheDocument::default()) }
    }

    /// Load the cache at `path`. A missing file yields an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let path = path.into();
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<CacheDocument>(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "account cache unreadable; starting empty");
                    CacheDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheDocument::default(),
            Err(e) => return Err(IdentityError::Cache(format!("{}: {e}", path.display()))),
        };
        Ok(Self { path: Some(path), inner: Mutex::new(doc) })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_doc<T>(&self, f: impl FnOnce(&mut CacheDocument) -> T) -> T {
        let mut doc = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut doc)
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheDocument {
        self.with_doc(|doc| doc.clone())
    }

    #[must_use]
    pub fn active_account(&self) -> Option<Account> {
        self.with_doc(|doc| {
            doc.active_account
                .as_ref()
                .and_then(|id| doc.accounts.get(id))
                .cloned()
        })
    }

    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        self.with_doc(|doc| doc.accounts.values().cloned().collect())
    }

    /// Record `account` and make it the active one.
    pub async fn set_active_account(&self, account: Account) -> Result<(), IdentityError> {
        self.with_doc(|doc| {
            doc.active_account = Some(account.home_account_id.clone());
            doc.accounts.insert(account.home_account_id.clone(), account);
        });
        self.persist().await
    }

    /// A fresh access token for `home_account_id` covering every requested scope.
    #[must_use]
    pub fn find_access_token(&self, home_account_id: &str, scopes: &[String], now: i64) -> Option<AccessTokenEntry> {
        let requested = normalize_scopes(scopes);
        self.with_doc(|doc| {
            doc.access_tokens
                .iter()
                .filter(|e| e.home_account_id == home_account_id && e.is_fresh(now) && e.covers(&requested))
                .max_by_key(|e| e.expires_on)
                .cloned()
        })
    }

    #[must_use]
    pub fn refresh_token(&self, home_account_id: &str) -> Option<String> {
        self.with_doc(|doc| doc.refresh_tokens.get(home_account_id).cloned())
    }

    /// Store an access token and/or refresh token for `account`.
    ///
    /// Replaces any access token with the same scope set and drops expired ones.
    pub async fn store_tokens(
        &self,
        account: &Account,
        access: Option<AccessTokenEntry>,
        refresh_token: Option<String>,
        now: i64,
    ) -> Result<(), IdentityError> {
        self.with_doc(|doc| {
            doc.accounts
                .entry(account.home_account_id.clone())
                .or_insert_with(|| account.clone());
            apply_tokens(doc, account, access, refresh_token, now);
        });
        self.persist().await
    }

    /// Make `account` active and store its tokens in a single write.
    pub async fn sign_in(
        &self,
        account: &Account,
        access: Option<AccessTokenEntry>,
        refresh_token: Option<String>,
        now: i64,
    ) -> Result<(), IdentityError> {
        self.with_doc(|doc| {
            doc.active_account = Some(account.home_account_id.clone());
            doc.accounts.insert(account.home_account_id.clone(), account.clone());
            apply_tokens(doc, account, access, refresh_token, now);
        });
        self.persist().await
    }

    /// Forget everything.
    pub async fn clear(&self) -> Result<(), IdentityError> {
        self.with_doc(|doc| *doc = CacheDocument::default());
        self.persist().await
    }

    async fn persist(&self) -> Result<(), IdentityError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(&self.snapshot()).map_err(|e| IdentityError::Cache(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IdentityError::Cache(format!("{}: {e}", parent.display())))?;
        }
        write_private(path, raw.as_bytes())
            .await
            .map_err(|e| IdentityError::Cache(format!("{}: {e}", path.display())))
    }
}

fn apply_tokens(
    doc: &mut CacheDocument,
    account: &Account,
    access: Option<AccessTokenEntry>,
    refresh_token: Option<String>,
    now: i64,
) {
    doc.access_tokens.retain(|e| e.expires_on > now);
    if let Some(entry) = access {
        doc.access_tokens
            .retain(|e| !(e.home_account_id == entry.home_account_id && e.scopes == entry.scopes));
        doc.access_tokens.push(entry);
    }
    if let Some(rt) = refresh_token {
        doc.refresh_tokens.insert(account.home_account_id.clone(), rt);
    }
}

/// The file holds refresh tokens; keep it owner-only.
#[cfg(unix)]
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CACHE_FILE_MODE)
        .open(path)
        .await?;
    // `mode` only applies when the file is created.
    file.set_permissions(std::fs::Permissions::from_mode(CACHE_FILE_MODE))
        .await?;
    file.write_all(contents).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, contents).await
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
