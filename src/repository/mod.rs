//! 仓库协作方接口
//!
//! 核心流程只通过 [`Repository`] 读取变更列表和修订元数据；
//! 仓库访问错误对整个事件是致命的。

pub mod replay;

pub use replay::{RepositoryDump, ReplayRepository};

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::event::Change;

/// 文件 MIME 类型属性
pub const MIME_TYPE_PROPERTY: &str = "svn:mime-type";

/// 属性的新旧值，`None` 表示不存在
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// 仓库访问接口
pub trait Repository {
    /// 仓库根路径（不带结尾斜杠）
    fn path(&self) -> &str;

    /// 修订中的有序变更列表
    fn changes(&self, revision: u64) -> Result<Vec<Change>>;

    fn revision_author(&self, revision: u64) -> Result<Option<String>>;

    fn revision_time(&self, revision: u64) -> Result<DateTime<Utc>>;

    fn revision_log(&self, revision: u64) -> Result<Option<String>>;

    fn revision_property(&self, revision: u64, name: &str) -> Result<Option<String>>;

    fn path_property(&self, name: &str, path: &str, revision: u64) -> Result<Option<String>>;

    /// 指定修订的文件内容
    fn path_content(&self, path: &str, revision: u64) -> Result<Vec<u8>>;

    /// 变更中修改过的路径属性（按名称排序）
    fn property_changes(
        &self,
        change: &Change,
        revision: u64,
    ) -> Result<BTreeMap<String, PropertyChange>>;

    /// 锁注释（锁事件）
    fn lock_comment(&self, path: &str) -> Result<Option<String>>;
}

/// 渲染途中的仓库访问错误
///
/// 经 [`RepositoryGuard`] 读取时，仓库返回的错误都包成这个类型，
/// 外层加了 `.context` 后仍可用 [`RepositoryError::is_within`] 识别。
#[derive(Debug, Error)]
#[error("{0:#}")]
pub struct RepositoryError(anyhow::Error);

impl RepositoryError {
    pub fn wrap(error: anyhow::Error) -> anyhow::Error {
        if Self::is_within(&error) {
            return error;
        }
        anyhow::Error::new(Self(error))
    }

    /// 错误链中是否有仓库访问错误
    pub fn is_within(error: &anyhow::Error) -> bool {
        error.is::<Self>()
    }
}

/// 把所有仓库错误标记为 [`RepositoryError`]
pub struct RepositoryGuard<'a> {
    inner: &'a dyn Repository,
}

impl<'a> RepositoryGuard<'a> {
    pub fn new(inner: &'a dyn Repository) -> Self {
        Self { inner }
    }
}

impl Repository for RepositoryGuard<'_> {
    fn path(&self) -> &str {
        self.inner.path()
    }

    fn changes(&self, revision: u64) -> Result<Vec<Change>> {
        self.inner.changes(revision).map_err(RepositoryError::wrap)
    }

    fn revision_author(&self, revision: u64) -> Result<Option<String>> {
        self.inner
            .revision_author(revision)
            .map_err(RepositoryError::wrap)
    }

    fn revision_time(&self, revision: u64) -> Result<DateTime<Utc>> {
        self.inner
            .revision_time(revision)
            .map_err(RepositoryError::wrap)
    }

    fn revision_log(&self, revision: u64) -> Result<Option<String>> {
        self.inner
            .revision_log(revision)
            .map_err(RepositoryError::wrap)
    }

    fn revision_property(&self, revision: u64, name: &str) -> Result<Option<String>> {
        self.inner
            .revision_property(revision, name)
            .map_err(RepositoryError::wrap)
    }

    fn path_property(&self, name: &str, path: &str, revision: u64) -> Result<Option<String>> {
        self.inner
            .path_property(name, path, revision)
            .map_err(RepositoryError::wrap)
    }

    fn path_content(&self, path: &str, revision: u64) -> Result<Vec<u8>> {
        self.inner
            .path_content(path, revision)
            .map_err(RepositoryError::wrap)
    }

    fn property_changes(
        &self,
        change: &Change,
        revision: u64,
    ) -> Result<BTreeMap<String, PropertyChange>> {
        self.inner
            .property_changes(change, revision)
            .map_err(RepositoryError::wrap)
    }

    fn lock_comment(&self, path: &str) -> Result<Option<String>> {
        self.inner.lock_comment(path).map_err(RepositoryError::wrap)
    }
}

/// MIME 类型是否表示二进制内容
pub fn is_binary_mime_type(mime: Option<&str>) -> bool {
    match mime {
        Some(m) => !m.trim().is_empty() && !m.trim_start().starts_with("text/"),
        None => false,
    }
}

/// 变更的任一版本是否是二进制文件
pub fn change_is_binary(repos: &dyn Repository, change: &Change, revision: u64) -> Result<bool> {
    if !change.was_deleted() {
        let mime = repos.path_property(MIME_TYPE_PROPERTY, &change.path, revision)?;
        if is_binary_mime_type(mime.as_deref()) {
            return Ok(true);
        }
    }
    if !change.was_added() || change.was_copied() {
        let mime = repos.path_property(
            MIME_TYPE_PROPERTY,
            change.base_path(),
            change.base_revision(revision),
        )?;
        if is_binary_mime_type(mime.as_deref()) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_binary_mime_type() {
        assert!(!is_binary_mime_type(None));
        assert!(!is_binary_mime_type(Some("text/plain; charset=utf-8")));
        assert!(is_binary_mime_type(Some("application/octet-stream")));
        assert!(is_binary_mime_type(Some("image/png")));
        assert!(!is_binary_mime_type(Some("  ")));
    }

    #[test]
    fn test_guard_marks_repository_errors() {
        let repos = ReplayRepository::from_dump(
            serde_json::from_str(r#"{ "path": "/srv/svn", "revisions": [], "files": [] }"#)
                .unwrap(),
        );
        let guarded = RepositoryGuard::new(&repos);

        assert_eq!(guarded.path(), "/srv/svn");
        let err = guarded.path_content("trunk/a.c", 3).unwrap_err();
        assert!(RepositoryError::is_within(&err));
        let err = err.context("Failed to render diff");
        assert!(RepositoryError::is_within(&err));
        assert!(format!("{:#}", err).contains("trunk/a.c"));

        let plain = repos.path_content("trunk/a.c", 3).unwrap_err();
        assert!(!RepositoryError::is_within(&plain));
    }
}
