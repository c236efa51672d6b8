//! DID collaborator: resolves access tokens to users and runs the
//! sign-in challenge flow.
//!
//! `StaticTokenResolver` keeps its token table in memory and, when given a
//! path, persists it as JSON on every mutation (same approach as a trust
//! registry file). Presentation verification is delegated: a presentation is
//! accepted when it carries a challenge this resolver issued.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use feeds_core::obj::UserInfo;
use feeds_core::ErrCode;

/// User id reserved for the service owner.
pub const OWNER_USER_ID: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("did layer not ready")]
    NotReady,
    #[error("access token not recognized")]
    InvalidToken,
    #[error("unknown or expired challenge")]
    InvalidChallenge,
    #[error("bad did document: {0}")]
    InvalidDocument(String),
    #[error("service already owned by another did")]
    OwnerMismatch,
}

impl From<AuthError> for ErrCode {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotReady => ErrCode::DidNotReady,
            AuthError::InvalidToken | AuthError::InvalidChallenge => ErrCode::InvalidAccessToken,
            AuthError::InvalidDocument(_) => ErrCode::InvalidArgument,
            AuthError::OwnerMismatch => ErrCode::NotAuthorized,
        }
    }
}

/// Failure loading a persisted token table.
#[derive(Debug, thiserror::Error)]
pub enum TokenTableError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
}

pub trait TokenResolver: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Resolve a token. Called once per request; results are not cached here.
    fn verify(&self, token: &str) -> Result<UserInfo, AuthError>;

    /// Start sign-in for a DID document. Returns the challenge to sign.
    fn sign_in(&self, document: &str) -> Result<String, AuthError>;

    /// Finish sign-in with a presentation. Returns the new token and its user.
    fn did_auth(&self, user_name: &str, jwt_vp: &str) -> Result<(String, UserInfo), AuthError>;

    /// Bind the service to its owner. The first declaration wins; repeating
    /// it with the same DID is accepted, any other DID is `OwnerMismatch`.
    /// Returns true when this call made the declaration.
    fn declare_owner(&self, owner_did: &str) -> Result<bool, AuthError>;
}

/// Short stable fingerprint of a token, safe to log.
pub fn fingerprint(token: &str) -> String {
    hex::encode(&blake3::hash(token.as_bytes()).as_bytes()[..8])
}

// ── Static resolver ───────────────────────────────────────────────────────────

/// On-disk token table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenFile {
    /// DID that signs in as the owner. Empty until one is declared.
    pub owner_did: String,
    pub tokens: HashMap<String, TokenEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEntry {
    pub user_id: u64,
    pub did: String,
    pub name: String,
    pub email: String,
    pub is_owner: bool,
}

impl From<&TokenEntry> for UserInfo {
    fn from(e: &TokenEntry) -> Self {
        UserInfo {
            user_id: e.user_id,
            did: e.did.clone(),
            name: e.name.clone(),
            email: e.email.clone(),
            is_owner: e.is_owner,
        }
    }
}

impl From<&UserInfo> for TokenEntry {
    fn from(u: &UserInfo) -> Self {
        TokenEntry {
            user_id: u.user_id,
            did: u.did.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            is_owner: u.is_owner,
        }
    }
}

#[derive(Clone)]
pub struct StaticTokenResolver {
    tokens: Arc<DashMap<String, TokenEntry>>,
    /// challenge -> did
    challenges: Arc<DashMap<String, String>>,
    /// did -> user id, for every non-owner DID seen so far.
    user_ids: Arc<DashMap<String, u64>>,
    next_user_id: Arc<AtomicU64>,
    owner_did: Arc<OnceLock<String>>,
    ready: Arc<AtomicBool>,
    nonce: Arc<AtomicU64>,
    persist_path: Arc<Option<PathBuf>>,
}

impl StaticTokenResolver {
    /// In-memory resolver. An empty `owner_did` leaves the owner undeclared.
    pub fn new(owner_did: &str) -> Self {
        let owner = OnceLock::new();
        if !owner_did.is_empty() {
            let _ = owner.set(owner_did.to_string());
        }
        Self {
            tokens: Arc::new(DashMap::new()),
            challenges: Arc::new(DashMap::new()),
            user_ids: Arc::new(DashMap::new()),
            next_user_id: Arc::new(AtomicU64::new(OWNER_USER_ID + 1)),
            owner_did: Arc::new(owner),
            ready: Arc::new(AtomicBool::new(true)),
            nonce: Arc::new(AtomicU64::new(0)),
            persist_path: Arc::new(None),
        }
    }

    /// Load the table at `path` and persist changes back to it. A missing
    /// file starts an empty table; an unreadable or corrupt one is an error
    /// so it is never overwritten.
    pub fn with_persistence(path: PathBuf) -> Result<Self, TokenTableError> {
        let file = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<TokenFile>(&text)
                .map_err(|e| TokenTableError::ParseFailed(path.clone(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TokenFile::default(),
            Err(e) => return Err(TokenTableError::ReadFailed(path, e)),
        };
        let resolver = Self::new(&file.owner_did);
        for (token, entry) in file.tokens {
            resolver.remember(token, entry);
        }
        tracing::info!(
            tokens = resolver.tokens.len(),
            owner = resolver.owner_did().unwrap_or("-"),
            path = %path.display(),
            "token table loaded"
        );
        Ok(Self {
            persist_path: Arc::new(Some(path)),
            ..resolver
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// The declared owner DID, if any.
    pub fn owner_did(&self) -> Option<&str> {
        self.owner_did.get().map(String::as_str)
    }

    fn is_owner_did(&self, did: &str) -> bool {
        self.owner_did() == Some(did)
    }

    /// Register a token directly.
    pub fn insert(&self, token: &str, user: &UserInfo) {
        self.remember(token.to_string(), TokenEntry::from(user));
        self.save_to_disk();
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
        self.save_to_disk();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Record a token and keep the id allocator ahead of its user id.
    fn remember(&self, token: String, entry: TokenEntry) {
        if entry.user_id != OWNER_USER_ID && !entry.did.is_empty() {
            self.user_ids.insert(entry.did.clone(), entry.user_id);
        }
        self.next_user_id
            .fetch_max(entry.user_id.saturating_add(1), Ordering::SeqCst);
        self.tokens.insert(token, entry);
    }

    /// Existing user id for `did`, or a freshly allocated one. The entry
    /// lock makes lookup and allocation one step per DID.
    fn user_id_for(&self, did: &str) -> u64 {
        if self.is_owner_did(did) {
            return OWNER_USER_ID;
        }
        *self
            .user_ids
            .entry(did.to_string())
            .or_insert_with(|| self.next_user_id.fetch_add(1, Ordering::SeqCst))
    }

    fn save_to_disk(&self) {
        let Some(path) = self.persist_path.as_ref() else {
            return;
        };
        let snapshot = TokenFile {
            owner_did: self.owner_did().unwrap_or_default().to_string(),
            tokens: self
                .tokens
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist token table");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize token table"),
        }
    }
}

/// DID documents arrive either as JSON with an `id` or as a bare DID.
fn document_did(document: &str) -> Result<String, AuthError> {
    let trimmed = document.trim();
    if trimmed.starts_with('{') {
        #[derive(Deserialize)]
        struct Doc {
            id: String,
        }
        let doc: Doc = serde_json::from_str(trimmed)
            .map_err(|e| AuthError::InvalidDocument(e.to_string()))?;
        return Ok(doc.id);
    }
    if trimmed.starts_with("did:") {
        return Ok(trimmed.to_string());
    }
    Err(AuthError::InvalidDocument("not a did".into()))
}

impl TokenResolver for StaticTokenResolver {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn verify(&self, token: &str) -> Result<UserInfo, AuthError> {
        if !self.is_ready() {
            return Err(AuthError::NotReady);
        }
        self.tokens
            .get(token)
            .map(|e| UserInfo::from(e.value()))
            .ok_or(AuthError::InvalidToken)
    }

    fn sign_in(&self, document: &str) -> Result<String, AuthError> {
        if !self.is_ready() {
            return Err(AuthError::NotReady);
        }
        let did = document_did(document)?;
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(did.as_bytes());
        hasher.update(&nonce.to_be_bytes());
        let challenge = hasher.finalize().to_hex().to_string();
        self.challenges.insert(challenge.clone(), did);
        Ok(challenge)
    }

    fn did_auth(&self, user_name: &str, jwt_vp: &str) -> Result<(String, UserInfo), AuthError> {
        if !self.is_ready() {
            return Err(AuthError::NotReady);
        }
        let (challenge, did) = self
            .challenges
            .remove(jwt_vp)
            .ok_or(AuthError::InvalidChallenge)?;
        let user = UserInfo {
            user_id: self.user_id_for(&did),
            is_owner: self.is_owner_did(&did),
            did,
            name: user_name.to_string(),
            email: String::new(),
        };
        let token = blake3::hash(format!("token:{challenge}").as_bytes())
            .to_hex()
            .to_string();
        self.insert(&token, &user);
        tracing::info!(user_id = user.user_id, token = %fingerprint(&token), "access token issued");
        Ok((token, user))
    }

    fn declare_owner(&self, owner_did: &str) -> Result<bool, AuthError> {
        let owner_did = owner_did.trim();
        if !owner_did.starts_with("did:") {
            return Err(AuthError::InvalidDocument("owner is not a did".into()));
        }
        let declared = self.owner_did.set(owner_did.to_string()).is_ok();
        if !self.is_owner_did(owner_did) {
            tracing::warn!(
                expected = self.owner_did().unwrap_or_default(),
                actual = owner_did,
                "owner mismatch"
            );
            return Err(AuthError::OwnerMismatch);
        }
        if declared {
            self.save_to_disk();
            tracing::info!(owner = owner_did, "owner declared");
        }
        Ok(declared)
    }
}
