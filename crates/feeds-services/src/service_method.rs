//! Service listener: owner-only maintenance calls.
//!
//! `backup_service_data` snapshots the database and uploads it to a named
//! cloud drive. The reply is queued first, then a `backup_service_data`
//! notify, so the owner sees both in order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feeds_core::method::{notify, Access, Method};
use feeds_core::rpc::{Notify, NotifyPayload, Params, Request, Response, ResultPayload};
use feeds_core::ErrCode;

use crate::service::{CallContext, Listener, MethodTable, Outcome};
use crate::store::FeedsStore;

pub const BACKUP_FILE_NAME: &str = "feeds-backup.sqlite3";

// ── Drives ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("drive rejected credentials")]
    Unauthorized,
    #[error("drive i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Upload target for backups.
pub trait CloudDrive: Send + Sync {
    fn upload(&self, url: &str, token: &str, file_name: &str, data: &[u8]) -> Result<(), DriveError>;
}

/// Drive backed by a local directory. `url` selects a subdirectory.
pub struct FolderDrive {
    root: PathBuf,
}

impl FolderDrive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keep only the final path component so uploads stay under the root.
fn leaf(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

impl CloudDrive for FolderDrive {
    fn upload(&self, url: &str, _token: &str, file_name: &str, data: &[u8]) -> Result<(), DriveError> {
        let mut dir = self.root.clone();
        if let Some(sub) = leaf(url) {
            dir.push(sub);
        }
        std::fs::create_dir_all(&dir)?;
        let name = leaf(file_name).unwrap_or(BACKUP_FILE_NAME);
        std::fs::write(dir.join(name), data)?;
        Ok(())
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

pub struct ServiceMethod {
    table: MethodTable<ServiceMethod>,
    store: Arc<FeedsStore>,
    drives: HashMap<String, Arc<dyn CloudDrive>>,
}

impl ServiceMethod {
    pub fn new(store: Arc<FeedsStore>) -> Self {
        let table = MethodTable::new().with(Method::BackupServiceData, Self::backup_service_data);
        Self {
            table,
            store,
            drives: HashMap::new(),
        }
    }

    pub fn with_drive(mut self, name: &str, drive: Arc<dyn CloudDrive>) -> Self {
        self.drives.insert(name.to_string(), drive);
        self
    }

    fn backup_service_data(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::BackupServiceData(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let drive = self.drives.get(&p.drive_name).ok_or_else(|| {
            tracing::warn!(drive = %p.drive_name, "backup to unknown drive");
            ErrCode::InvalidArgument
        })?;

        let snapshot = self.store.snapshot()?;
        drive
            .upload(&p.drive_url, &p.drive_access_token, BACKUP_FILE_NAME, &snapshot)
            .map_err(|e| {
                tracing::error!(drive = %p.drive_name, error = %e, "backup upload failed");
                match e {
                    DriveError::Unauthorized => ErrCode::NotAuthorized,
                    DriveError::Io(_) => ErrCode::StdSystem,
                }
            })?;
        tracing::info!(
            peer = ctx.peer,
            drive = %p.drive_name,
            bytes = snapshot.len(),
            "service data backed up"
        );

        ctx.outbox
            .enqueue_response(ctx.peer, &Response::reply(request, ResultPayload::Empty))?;
        ctx.outbox.notify(
            ctx.peer,
            &Notify {
                dialect: request.dialect,
                version: request.version,
                method: notify::BACKUP_SERVICE_DATA.to_string(),
                params: NotifyPayload::Empty,
            },
        );
        Ok(Outcome::Finished)
    }
}

impl Listener for ServiceMethod {
    fn name(&self) -> &'static str {
        "service_method"
    }

    fn lookup(&self, method: Method) -> Option<Access> {
        self.table.access(method)
    }

    fn handle(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        self.table.dispatch(self, ctx, request)
    }
}
