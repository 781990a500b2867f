//! Account cache: accounts, refresh tokens and access tokens per scope set.
//!
//! The cache lives in memory for the lifetime of the process. When built
//! with [`AccountCache::load`] it is also written back to a JSON file after
//! every change.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::auth::models::{AccessToken, Account};

/// Scopes the identity platform adds on its own; never used for matching.
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// An access token together with the scopes it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedToken {
    /// Lowercased, non-reserved scopes.
    pub scopes: Vec<String>,
    /// The token itself.
    pub token: AccessToken,
}

/// Everything cached for one signed-in account.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedAccount {
    /// The account.
    pub account: Account,
    /// Refresh token used for silent reacquisition.
    pub refresh_token: Option<String>,
    /// Access tokens issued so far.
    #[serde(default)]
    pub access_tokens: Vec<ScopedToken>,
}

impl fmt::Debug for CachedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedAccount")
            .field("account", &self.account)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("access_tokens", &self.access_tokens)
            .finish()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    accounts: Vec<CachedAccount>,
}

/// In-memory account cache with optional JSON persistence.
#[derive(Debug, Default)]
pub struct AccountCache {
    accounts: Vec<CachedAccount>,
    path: Option<PathBuf>,
}

impl AccountCache {
    /// An empty cache that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load a persisted cache; a missing file yields an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let accounts = if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| AuthError::Cache(format!("reading {}: {e}", path.display())))?;
            let file: CacheFile = serde_json::from_str(&text)
                .map_err(|e| AuthError::Cache(format!("parsing {}: {e}", path.display())))?;
            file.accounts
        } else {
            Vec::new()
        };

        log::debug!(
            "loaded {} cached account(s) from {}",
            accounts.len(),
            path.display()
        );

        Ok(Self {
            accounts,
            path: Some(path.to_path_buf()),
        })
    }

    /// Accounts known to the cache, most recently used first.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(|c| c.account.clone()).collect()
    }

    /// A cached access token for `account` covering `scopes`, valid for at least `skew`.
    #[must_use]
    pub fn access_token(
        &self,
        account: &Account,
        scopes: &[String],
        skew: TimeDelta,
    ) -> Option<AccessToken> {
        let wanted = normalize_scopes(scopes);
        self.find(account)?
            .access_tokens
            .iter()
            .filter(|t| t.token.is_valid_for(skew))
            .find(|t| wanted.iter().all(|s| t.scopes.contains(s)))
            .map(|t| t.token.clone())
    }

    /// The refresh token cached for `account`, if any.
    #[must_use]
    pub fn refresh_token(&self, account: &Account) -> Option<String> {
        self.find(account)?.refresh_token.clone()
    }

    /// Record a token acquisition and move the account to the front.
    ///
    /// A `None` refresh token keeps the previously cached one.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is persisted and cannot be written.
    pub fn store(
        &mut self,
        account: Account,
        refresh_token: Option<String>,
        scopes: &[String],
        token: AccessToken,
    ) -> Result<(), AuthError> {
        let mut entry = self
            .accounts
            .iter()
            .position(|c| c.account.home_account_id == account.home_account_id)
            .map_or_else(
                || CachedAccount {
                    account: account.clone(),
                    refresh_token: None,
                    access_tokens: Vec::new(),
                },
                |idx| self.accounts.remove(idx),
            );

        entry.account = account;
        if refresh_token.is_some() {
            entry.refresh_token = refresh_token;
        }

        let scopes = normalize_scopes(scopes);
        entry
            .access_tokens
            .retain(|t| t.scopes != scopes && t.token.is_valid_for(TimeDelta::zero()));
        entry.access_tokens.push(ScopedToken { scopes, token });

        self.accounts.insert(0, entry);
        self.save()
    }

    /// Forget an account entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is persisted and cannot be written.
    pub fn remove(&mut self, account: &Account) -> Result<(), AuthError> {
        self.accounts
            .retain(|c| c.account.home_account_id != account.home_account_id);
        self.save()
    }

    fn find(&self, account: &Account) -> Option<&CachedAccount> {
        self.accounts
            .iter()
            .find(|c| c.account.home_account_id == account.home_account_id)
    }

    fn save(&self) -> Result<(), AuthError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AuthError::Cache(format!("creating {}: {e}", parent.display())))?;
        }

        let file = CacheFile {
            accounts: self.accounts.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AuthError::Cache(format!("serializing cache: {e}")))?;
        fs::write(path, json)
            .map_err(|e| AuthError::Cache(format!("writing {}: {e}", path.display())))
    }
}

/// Lowercase, drop reserved scopes, sort and dedup.
#[must_use]
pub fn normalize_scopes(scopes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = scopes
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && !RESERVED_SCOPES.contains(&s.as_str()))
        .collect();
    out.sort();
    out.dedup();
    out
}
