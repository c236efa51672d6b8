//! SQLite-backed feeds store.
//!
//! One connection behind a mutex: SQLite serializes writers anyway, and the
//! handlers that call in here already run on blocking worker threads.
//! Listing queries are visitor-style so the paginator can consume rows as
//! they are stepped instead of materializing the whole result set.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use feeds_core::obj::{
    ChannelRecord, CommentRecord, PostCounts, PostRecord, QueryCriteria, QueryField, Status,
    UserInfo, PLACEHOLDER,
};
use feeds_core::rpc::{
    CreateChannelParams, EditCommentParams, EditPostParams, PostCommentParams, PublishPostParams,
};
use feeds_core::ErrCode;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    did     TEXT NOT NULL,
    name    TEXT NOT NULL DEFAULT 'NA',
    email   TEXT NOT NULL DEFAULT 'NA'
);
CREATE TABLE IF NOT EXISTS channels (
    channel_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL,
    name         TEXT NOT NULL UNIQUE,
    intro        TEXT NOT NULL,
    subscribers  INTEGER NOT NULL DEFAULT 0,
    next_post_id INTEGER NOT NULL DEFAULT 1,
    avatar       BLOB NOT NULL,
    tip_methods  TEXT NOT NULL DEFAULT 'NA',
    proof        TEXT NOT NULL DEFAULT 'NA'
);
CREATE TABLE IF NOT EXISTS posts (
    channel_id      INTEGER NOT NULL REFERENCES channels(channel_id),
    post_id         INTEGER NOT NULL,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    next_comment_id INTEGER NOT NULL DEFAULT 1,
    comments        INTEGER NOT NULL DEFAULT 0,
    likes           INTEGER NOT NULL DEFAULT 0,
    status          INTEGER NOT NULL DEFAULT 0,
    content         BLOB NOT NULL,
    thumbnails      BLOB NOT NULL,
    hash_id         TEXT NOT NULL DEFAULT 'NA',
    proof           TEXT NOT NULL DEFAULT 'NA',
    PRIMARY KEY (channel_id, post_id)
);
CREATE TABLE IF NOT EXISTS comments (
    channel_id       INTEGER NOT NULL,
    post_id          INTEGER NOT NULL,
    comment_id       INTEGER NOT NULL,
    refer_comment_id INTEGER NOT NULL DEFAULT 0,
    user_id          INTEGER NOT NULL,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL,
    likes            INTEGER NOT NULL DEFAULT 0,
    status           INTEGER NOT NULL DEFAULT 0,
    content          BLOB NOT NULL,
    thumbnails       BLOB NOT NULL,
    hash_id          TEXT NOT NULL DEFAULT 'NA',
    proof            TEXT NOT NULL DEFAULT 'NA',
    PRIMARY KEY (channel_id, post_id, comment_id)
);
CREATE TABLE IF NOT EXISTS likes (
    user_id    INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    post_id    INTEGER NOT NULL,
    comment_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, channel_id, post_id, comment_id)
);
CREATE TABLE IF NOT EXISTS subscriptions (
    user_id    INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, channel_id)
);
"#;

const CHANNEL_COLUMNS: &str = "SELECT channel_id, name, intro, avatar, created_at, updated_at, \
     subscribers, next_post_id, tip_methods, proof FROM channels";

const POST_COLUMNS: &str = "SELECT channel_id, post_id, created_at, updated_at, comments, likes, \
     status, content, thumbnails, hash_id, proof FROM posts";

const COMMENT_COLUMNS: &str = "SELECT c.channel_id, c.post_id, c.comment_id, c.refer_comment_id, \
     COALESCE(u.did, 'NA'), COALESCE(u.name, 'NA'), c.content, c.likes, c.status, \
     c.created_at, c.updated_at, c.thumbnails, c.hash_id, c.proof \
     FROM comments c LEFT JOIN users u ON u.user_id = c.user_id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("wrong state")]
    WrongState,
    #[error("not authorized")]
    NotAuthorized,
}

impl From<StoreError> for ErrCode {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ErrCode::NotFound,
            StoreError::AlreadyExists => ErrCode::AlreadyExists,
            StoreError::WrongState => ErrCode::WrongState,
            StoreError::NotAuthorized => ErrCode::NotAuthorized,
            StoreError::Sqlite(e) => {
                tracing::error!(error = %e, "storage query failed");
                ErrCode::DatabaseException
            }
            StoreError::Io(e) => {
                tracing::error!(error = %e, "storage i/o failed");
                ErrCode::StdSystem
            }
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct FeedsStore {
    conn: Mutex<Connection>,
}

impl FeedsStore {
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub fn upsert_user(&self, user: &UserInfo) -> StoreResult<()> {
        let name = non_empty(&user.name);
        let email = non_empty(&user.email);
        self.lock().execute(
            "INSERT INTO users (user_id, did, name, email) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(user_id) DO UPDATE SET did = excluded.did, name = excluded.name, \
             email = excluded.email",
            params![user.user_id as i64, &user.did, name, email],
        )?;
        Ok(())
    }

    pub fn user(&self, user_id: u64) -> StoreResult<Option<UserInfo>> {
        let user = self
            .lock()
            .query_row(
                "SELECT user_id, did, name, email FROM users WHERE user_id = ?1",
                params![user_id as i64],
                |row| {
                    Ok(UserInfo {
                        user_id: row.get::<_, i64>(0)? as u64,
                        did: row.get(1)?,
                        name: row.get(2)?,
                        email: row.get(3)?,
                        is_owner: false,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ── Channels ─────────────────────────────────────────────────────────────

    pub fn create_channel(&self, p: &CreateChannelParams) -> StoreResult<u64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT channel_id FROM channels WHERE name = ?1",
                params![&p.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        let now = now();
        tx.execute(
            "INSERT INTO channels (created_at, updated_at, name, intro, avatar, tip_methods, proof) \
             VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                now,
                &p.name,
                &p.introduction,
                &p.avatar.0,
                non_empty(&p.tip_methods),
                non_empty(&p.proof)
            ],
        )?;
        let id = tx.last_insert_rowid() as u64;
        tx.commit()?;
        Ok(id)
    }

    pub fn channel(&self, channel_id: u64) -> StoreResult<Option<ChannelRecord>> {
        let sql = format!("{CHANNEL_COLUMNS} WHERE channel_id = ?1");
        let rec = self
            .lock()
            .query_row(&sql, params![channel_id as i64], channel_row)
            .optional()?;
        Ok(rec)
    }

    pub fn channels(&self, qc: &QueryCriteria) -> StoreResult<Vec<ChannelRecord>> {
        let (sql, args) = criteria_sql(CHANNEL_COLUMNS, "", "channel_id", Vec::new(), qc);
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), channel_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn subscribed_channels(
        &self,
        user_id: u64,
        qc: &QueryCriteria,
    ) -> StoreResult<Vec<ChannelRecord>> {
        let select = "SELECT c.channel_id, c.name, c.intro, c.avatar, c.created_at, c.updated_at, \
             c.subscribers, c.next_post_id, c.tip_methods, c.proof FROM channels c \
             JOIN subscriptions s ON s.channel_id = c.channel_id";
        let filters = vec![("s.user_id", user_id as i64)];
        let (sql, args) = criteria_sql(select, "c.", "channel_id", filters, qc);
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), channel_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Visit `(channel_id, subscribers)` for one channel, or all when `channel_id` is 0.
    pub fn for_each_subscriber_count(
        &self,
        channel_id: u64,
        mut visit: impl FnMut(u64, u64),
    ) -> StoreResult<()> {
        let filters = id_filters(&[("channel_id", channel_id)]);
        let (sql, args) = criteria_sql(
            "SELECT channel_id, subscribers FROM channels",
            "",
            "channel_id",
            filters,
            &QueryCriteria::all(),
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        while let Some(row) = rows.next()? {
            visit(row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64);
        }
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    pub fn subscribe(&self, user_id: u64, channel_id: u64) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        require_channel(&tx, channel_id)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO subscriptions (user_id, channel_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id as i64, channel_id as i64, now()],
        )?;
        if inserted == 0 {
            return Err(StoreError::WrongState);
        }
        tx.execute(
            "UPDATE channels SET subscribers = subscribers + 1 WHERE channel_id = ?1",
            params![channel_id as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn unsubscribe(&self, user_id: u64, channel_id: u64) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        require_channel(&tx, channel_id)?;
        let removed = tx.execute(
            "DELETE FROM subscriptions WHERE user_id = ?1 AND channel_id = ?2",
            params![user_id as i64, channel_id as i64],
        )?;
        if removed == 0 {
            return Err(StoreError::WrongState);
        }
        tx.execute(
            "UPDATE channels SET subscribers = subscribers - 1 WHERE channel_id = ?1",
            params![channel_id as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn subscribed_channel_ids(&self, user_id: u64) -> StoreResult<Vec<u64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT channel_id FROM subscriptions WHERE user_id = ?1 ORDER BY channel_id",
        )?;
        let rows = stmt.query_map(params![user_id as i64], |row| {
            Ok(row.get::<_, i64>(0)? as u64)
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    // ── Posts ────────────────────────────────────────────────────────────────

    pub fn publish_post(&self, p: &PublishPostParams) -> StoreResult<PostRecord> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let post_id: i64 = tx
            .query_row(
                "SELECT next_post_id FROM channels WHERE channel_id = ?1",
                params![p.channel_id as i64],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        let now = now();
        tx.execute(
            "INSERT INTO posts (channel_id, post_id, created_at, updated_at, content, thumbnails, hash_id, proof) \
             VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7)",
            params![
                p.channel_id as i64,
                post_id,
                now,
                &p.content.0,
                &p.thumbnails.0,
                non_empty(&p.hash_id),
                non_empty(&p.proof)
            ],
        )?;
        tx.execute(
            "UPDATE channels SET next_post_id = next_post_id + 1, updated_at = ?2 WHERE channel_id = ?1",
            params![p.channel_id as i64, now],
        )?;
        let sql = format!("{POST_COLUMNS} WHERE channel_id = ?1 AND post_id = ?2");
        let rec = tx.query_row(&sql, params![p.channel_id as i64, post_id], post_row)?;
        tx.commit()?;
        Ok(rec)
    }

    pub fn post(&self, channel_id: u64, post_id: u64) -> StoreResult<Option<PostRecord>> {
        let sql = format!("{POST_COLUMNS} WHERE channel_id = ?1 AND post_id = ?2");
        let rec = self
            .lock()
            .query_row(&sql, params![channel_id as i64, post_id as i64], post_row)
            .optional()?;
        Ok(rec)
    }

    pub fn posts(&self, channel_id: u64, qc: &QueryCriteria) -> StoreResult<Vec<PostRecord>> {
        let filters = vec![("channel_id", channel_id as i64)];
        let (sql, args) = criteria_sql(POST_COLUMNS, "", "post_id", filters, qc);
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), post_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Replace a post's content. Deleted posts cannot be edited.
    pub fn edit_post(&self, p: &EditPostParams) -> StoreResult<PostRecord> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if post_status(&tx, p.channel_id, p.id)? == Status::Deleted {
            return Err(StoreError::WrongState);
        }
        let now = now();
        tx.execute(
            "UPDATE posts SET content = ?3, thumbnails = ?4, hash_id = ?5, proof = ?6, \
             status = ?7, updated_at = ?8 WHERE channel_id = ?1 AND post_id = ?2",
            params![
                p.channel_id as i64,
                p.id as i64,
                &p.content.0,
                &p.thumbnails.0,
                non_empty(&p.hash_id),
                non_empty(&p.proof),
                Status::Edited as i64,
                now
            ],
        )?;
        touch_channel(&tx, p.channel_id, now)?;
        let sql = format!("{POST_COLUMNS} WHERE channel_id = ?1 AND post_id = ?2");
        let rec = tx.query_row(&sql, params![p.channel_id as i64, p.id as i64], post_row)?;
        tx.commit()?;
        Ok(rec)
    }

    /// Mark a post deleted and drop its content. The row and its counters stay.
    pub fn delete_post(&self, channel_id: u64, post_id: u64) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if post_status(&tx, channel_id, post_id)? == Status::Deleted {
            return Err(StoreError::WrongState);
        }
        let now = now();
        tx.execute(
            "UPDATE posts SET content = x'', thumbnails = x'', status = ?3, updated_at = ?4 \
             WHERE channel_id = ?1 AND post_id = ?2",
            params![channel_id as i64, post_id as i64, Status::Deleted as i64, now],
        )?;
        touch_channel(&tx, channel_id, now)?;
        tx.commit()?;
        Ok(())
    }

    /// Posts `user_id` has liked (post likes only, not comment likes).
    pub fn liked_posts(&self, user_id: u64, qc: &QueryCriteria) -> StoreResult<Vec<PostRecord>> {
        let select = "SELECT p.channel_id, p.post_id, p.created_at, p.updated_at, p.comments, \
             p.likes, p.status, p.content, p.thumbnails, p.hash_id, p.proof FROM posts p \
             JOIN likes l ON l.channel_id = p.channel_id AND l.post_id = p.post_id";
        let filters = vec![("l.user_id", user_id as i64), ("l.comment_id", 0)];
        let (sql, args) = criteria_sql(select, "p.", "post_id", filters, qc);
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), post_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Visit post counters. Zero ids mean "any".
    pub fn for_each_post_counts(
        &self,
        channel_id: u64,
        post_id: u64,
        qc: &QueryCriteria,
        mut visit: impl FnMut(PostCounts),
    ) -> StoreResult<()> {
        let filters = id_filters(&[("channel_id", channel_id), ("post_id", post_id)]);
        let (sql, args) = criteria_sql(
            "SELECT channel_id, post_id, comments, likes FROM posts",
            "",
            "post_id",
            filters,
            qc,
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        while let Some(row) = rows.next()? {
            visit(PostCounts {
                channel_id: row.get::<_, i64>(0)? as u64,
                post_id: row.get::<_, i64>(1)? as u64,
                comments: row.get::<_, i64>(2)? as u64,
                likes: row.get::<_, i64>(3)? as u64,
            });
        }
        Ok(())
    }

    // ── Comments ─────────────────────────────────────────────────────────────

    pub fn post_comment(&self, user: &UserInfo, p: &PostCommentParams) -> StoreResult<CommentRecord> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let comment_id: i64 = tx
            .query_row(
                "SELECT next_comment_id FROM posts WHERE channel_id = ?1 AND post_id = ?2",
                params![p.channel_id as i64, p.post_id as i64],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        if p.comment_id != 0 {
            require_comment(&tx, p.channel_id, p.post_id, p.comment_id)?;
        }
        let now = now();
        tx.execute(
            "INSERT INTO comments (channel_id, post_id, comment_id, refer_comment_id, user_id, \
             created_at, updated_at, content, thumbnails, hash_id, proof) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9, ?10)",
            params![
                p.channel_id as i64,
                p.post_id as i64,
                comment_id,
                p.comment_id as i64,
                user.user_id as i64,
                now,
                &p.content.0,
                &p.thumbnails.0,
                non_empty(&p.hash_id),
                non_empty(&p.proof)
            ],
        )?;
        tx.execute(
            "UPDATE posts SET next_comment_id = next_comment_id + 1, comments = comments + 1 \
             WHERE channel_id = ?1 AND post_id = ?2",
            params![p.channel_id as i64, p.post_id as i64],
        )?;
        let sql = format!(
            "{COMMENT_COLUMNS} WHERE c.channel_id = ?1 AND c.post_id = ?2 AND c.comment_id = ?3"
        );
        let rec = tx.query_row(
            &sql,
            params![p.channel_id as i64, p.post_id as i64, comment_id],
            comment_row,
        )?;
        tx.commit()?;
        Ok(rec)
    }

    /// Replace a comment's content. Only its author may edit, and only while
    /// the comment is neither deleted nor blocked.
    pub fn edit_comment(&self, user_id: u64, p: &EditCommentParams) -> StoreResult<CommentRecord> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let (author, status) = comment_owner_status(&tx, p.channel_id, p.post_id, p.id)?;
        if author != user_id {
            return Err(StoreError::NotAuthorized);
        }
        if !status.is_readable() {
            return Err(StoreError::WrongState);
        }
        tx.execute(
            "UPDATE comments SET content = ?4, thumbnails = ?5, hash_id = ?6, proof = ?7, \
             status = ?8, updated_at = ?9 \
             WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
            params![
                p.channel_id as i64,
                p.post_id as i64,
                p.id as i64,
                &p.content.0,
                &p.thumbnails.0,
                non_empty(&p.hash_id),
                non_empty(&p.proof),
                Status::Edited as i64,
                now()
            ],
        )?;
        let sql = format!(
            "{COMMENT_COLUMNS} WHERE c.channel_id = ?1 AND c.post_id = ?2 AND c.comment_id = ?3"
        );
        let rec = tx.query_row(
            &sql,
            params![p.channel_id as i64, p.post_id as i64, p.id as i64],
            comment_row,
        )?;
        tx.commit()?;
        Ok(rec)
    }

    /// Mark a comment deleted. Its author or the owner may delete it.
    pub fn delete_comment(
        &self,
        user: &UserInfo,
        channel_id: u64,
        post_id: u64,
        comment_id: u64,
    ) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let (author, status) = comment_owner_status(&tx, channel_id, post_id, comment_id)?;
        if author != user.user_id && !user.is_owner {
            return Err(StoreError::NotAuthorized);
        }
        if status == Status::Deleted {
            return Err(StoreError::WrongState);
        }
        tx.execute(
            "UPDATE comments SET content = x'', thumbnails = x'', status = ?4, updated_at = ?5 \
             WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
            params![
                channel_id as i64,
                post_id as i64,
                comment_id as i64,
                Status::Deleted as i64,
                now()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Block (`blocked` true) or unblock a comment. Blocking needs a readable
    /// comment; unblocking needs a blocked one and restores it as available.
    pub fn set_comment_blocked(
        &self,
        channel_id: u64,
        post_id: u64,
        comment_id: u64,
        blocked: bool,
    ) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let (_, status) = comment_owner_status(&tx, channel_id, post_id, comment_id)?;
        let allowed = if blocked {
            status.is_readable()
        } else {
            status == Status::Blocked
        };
        if !allowed {
            return Err(StoreError::WrongState);
        }
        let next = if blocked {
            Status::Blocked
        } else {
            Status::Available
        };
        tx.execute(
            "UPDATE comments SET status = ?4, updated_at = ?5 \
             WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
            params![
                channel_id as i64,
                post_id as i64,
                comment_id as i64,
                next as i64,
                now()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Visit comments. Zero channel/post ids mean "any".
    pub fn for_each_comment(
        &self,
        channel_id: u64,
        post_id: u64,
        qc: &QueryCriteria,
        mut visit: impl FnMut(CommentRecord),
    ) -> StoreResult<()> {
        let filters = id_filters(&[("c.channel_id", channel_id), ("c.post_id", post_id)]);
        let (sql, args) = criteria_sql(COMMENT_COLUMNS, "c.", "comment_id", filters, qc);
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        while let Some(row) = rows.next()? {
            visit(comment_row(row)?);
        }
        Ok(())
    }

    pub fn comments(
        &self,
        channel_id: u64,
        post_id: u64,
        qc: &QueryCriteria,
    ) -> StoreResult<Vec<CommentRecord>> {
        let mut out = Vec::new();
        self.for_each_comment(channel_id, post_id, qc, |c| out.push(c))?;
        Ok(out)
    }

    // ── Likes ────────────────────────────────────────────────────────────────

    /// Like a post (`comment_id` 0) or a comment. Returns the new like total.
    pub fn like(&self, user_id: u64, channel_id: u64, post_id: u64, comment_id: u64) -> StoreResult<u64> {
        self.toggle_like(user_id, channel_id, post_id, comment_id, true)
    }

    pub fn unlike(&self, user_id: u64, channel_id: u64, post_id: u64, comment_id: u64) -> StoreResult<u64> {
        self.toggle_like(user_id, channel_id, post_id, comment_id, false)
    }

    fn toggle_like(
        &self,
        user_id: u64,
        channel_id: u64,
        post_id: u64,
        comment_id: u64,
        like: bool,
    ) -> StoreResult<u64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if comment_id == 0 {
            require_post(&tx, channel_id, post_id)?;
        } else {
            require_comment(&tx, channel_id, post_id, comment_id)?;
        }
        let (u, c, p, cm) = (user_id as i64, channel_id as i64, post_id as i64, comment_id as i64);
        let changed = if like {
            tx.execute(
                "INSERT OR IGNORE INTO likes (user_id, channel_id, post_id, comment_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![u, c, p, cm, now()],
            )?
        } else {
            tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND channel_id = ?2 AND post_id = ?3 AND comment_id = ?4",
                params![u, c, p, cm],
            )?
        };
        if changed == 0 {
            return Err(StoreError::WrongState);
        }
        let delta: i64 = if like { 1 } else { -1 };
        let total: i64 = if comment_id == 0 {
            tx.execute(
                "UPDATE posts SET likes = likes + ?3 WHERE channel_id = ?1 AND post_id = ?2",
                params![channel_id as i64, post_id as i64, delta],
            )?;
            tx.query_row(
                "SELECT likes FROM posts WHERE channel_id = ?1 AND post_id = ?2",
                params![channel_id as i64, post_id as i64],
                |row| row.get(0),
            )?
        } else {
            tx.execute(
                "UPDATE comments SET likes = likes + ?4 WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
                params![channel_id as i64, post_id as i64, comment_id as i64, delta],
            )?;
            tx.query_row(
                "SELECT likes FROM comments WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
                params![channel_id as i64, post_id as i64, comment_id as i64],
                |row| row.get(0),
            )?
        };
        tx.commit()?;
        Ok(total as u64)
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Consistent copy of the whole database, as SQLite file bytes.
    pub fn snapshot(&self) -> StoreResult<Vec<u8>> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "feeds-snapshot-{}-{nanos}.sqlite3",
            std::process::id()
        ));
        let target = path.to_string_lossy().into_owned();
        self.lock().execute("VACUUM INTO ?1", params![target])?;
        let bytes = std::fs::read(&path);
        let _ = std::fs::remove_file(&path);
        Ok(bytes?)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn non_empty(s: &str) -> &str {
    if s.is_empty() {
        PLACEHOLDER
    } else {
        s
    }
}

/// Equality filters for the non-zero ids.
fn id_filters<'a>(ids: &[(&'a str, u64)]) -> Vec<(&'a str, i64)> {
    ids.iter()
        .filter(|(_, v)| *v > 0)
        .map(|(col, v)| (*col, *v as i64))
        .collect()
}

/// Append filters, criteria bounds, ordering and limit to `select`.
fn criteria_sql(
    select: &str,
    prefix: &str,
    id_col: &str,
    filters: Vec<(&str, i64)>,
    qc: &QueryCriteria,
) -> (String, Vec<i64>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    for (col, v) in filters {
        clauses.push(format!("{col} = ?"));
        args.push(v);
    }

    let by_col = match qc.by {
        QueryField::None | QueryField::Id => format!("{prefix}{id_col}"),
        QueryField::UpdatedAt => format!("{prefix}updated_at"),
        QueryField::CreatedAt => format!("{prefix}created_at"),
    };
    if let Some(lower) = qc.lower {
        clauses.push(format!("{by_col} >= ?"));
        args.push(lower as i64);
    }
    if let Some(upper) = qc.upper {
        clauses.push(format!("{by_col} <= ?"));
        args.push(upper as i64);
    }

    let mut sql = select.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    let dir = if qc.by.ascending() { "ASC" } else { "DESC" };
    sql.push_str(&format!(" ORDER BY {by_col} {dir}"));
    if let Some(limit) = qc.limit {
        sql.push_str(" LIMIT ?");
        args.push(limit.min(i64::MAX as u64) as i64);
    }
    (sql, args)
}

fn require_channel(conn: &Connection, channel_id: u64) -> StoreResult<()> {
    conn.query_row(
        "SELECT 1 FROM channels WHERE channel_id = ?1",
        params![channel_id as i64],
        |_| Ok(()),
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn require_post(conn: &Connection, channel_id: u64, post_id: u64) -> StoreResult<()> {
    conn.query_row(
        "SELECT 1 FROM posts WHERE channel_id = ?1 AND post_id = ?2",
        params![channel_id as i64, post_id as i64],
        |_| Ok(()),
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn post_status(conn: &Connection, channel_id: u64, post_id: u64) -> StoreResult<Status> {
    conn.query_row(
        "SELECT status FROM posts WHERE channel_id = ?1 AND post_id = ?2",
        params![channel_id as i64, post_id as i64],
        |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(Status::from_i64)
    .ok_or(StoreError::NotFound)
}

/// Author user id and status of a comment.
fn comment_owner_status(
    conn: &Connection,
    channel_id: u64,
    post_id: u64,
    comment_id: u64,
) -> StoreResult<(u64, Status)> {
    conn.query_row(
        "SELECT user_id, status FROM comments WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
        params![channel_id as i64, post_id as i64, comment_id as i64],
        |row| Ok((row.get::<_, i64>(0)? as u64, Status::from_i64(row.get(1)?))),
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn touch_channel(conn: &Connection, channel_id: u64, now: i64) -> StoreResult<()> {
    conn.execute(
        "UPDATE channels SET updated_at = ?2 WHERE channel_id = ?1",
        params![channel_id as i64, now],
    )?;
    Ok(())
}

fn require_comment(conn: &Connection, channel_id: u64, post_id: u64, comment_id: u64) -> StoreResult<()> {
    conn.query_row(
        "SELECT 1 FROM comments WHERE channel_id = ?1 AND post_id = ?2 AND comment_id = ?3",
        params![channel_id as i64, post_id as i64, comment_id as i64],
        |_| Ok(()),
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn channel_row(row: &Row<'_>) -> rusqlite::Result<ChannelRecord> {
    Ok(ChannelRecord {
        channel_id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        intro: row.get(2)?,
        avatar: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        updated_at: row.get::<_, i64>(5)? as u64,
        subscribers: row.get::<_, i64>(6)? as u64,
        next_post_id: row.get::<_, i64>(7)? as u64,
        tip_methods: row.get(8)?,
        proof: row.get(9)?,
    })
}

fn post_row(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        channel_id: row.get::<_, i64>(0)? as u64,
        post_id: row.get::<_, i64>(1)? as u64,
        created_at: row.get::<_, i64>(2)? as u64,
        updated_at: row.get::<_, i64>(3)? as u64,
        comments: row.get::<_, i64>(4)? as u64,
        likes: row.get::<_, i64>(5)? as u64,
        status: Status::from_i64(row.get(6)?),
        content: row.get(7)?,
        thumbnails: row.get(8)?,
        hash_id: row.get(9)?,
        proof: row.get(10)?,
    })
}

fn comment_row(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        channel_id: row.get::<_, i64>(0)? as u64,
        post_id: row.get::<_, i64>(1)? as u64,
        comment_id: row.get::<_, i64>(2)? as u64,
        refer_comment_id: row.get::<_, i64>(3)? as u64,
        user_did: row.get(4)?,
        user_name: row.get(5)?,
        content: row.get(6)?,
        likes: row.get::<_, i64>(7)? as u64,
        status: Status::from_i64(row.get(8)?),
        created_at: row.get::<_, i64>(9)? as u64,
        updated_at: row.get::<_, i64>(10)? as u64,
        thumbnails: row.get(11)?,
        hash_id: row.get(12)?,
        proof: row.get(13)?,
    })
}
