//! 仓库回放 - 从 JSON 导出文件读取修订数据
//!
//! 导出格式：
//! ```json
//! {
//!   "path": "/var/svn/repos",
//!   "revisions": [{ "revision": 42, "author": "alice", "date": "2024-05-01T10:00:00Z",
//!                   "log": "Fix parser", "changes": [{ "path": "trunk/a.c", "kind": "modified",
//!                   "has_content_changes": true }] }],
//!   "files": [{ "path": "trunk/a.c", "revision": 41, "content": "...",
//!               "properties": { "svn:mime-type": "text/plain" } }],
//!   "property_changes": [{ "path": "trunk/a.c", "revision": 42, "name": "svn:eol-style",
//!                         "old": null, "new": "native" }],
//!   "locks": { "trunk/a.c": "Editing the parser" }
//! }
//! ```
//!
//! 文件内容按“不晚于请求修订的最新快照”查找。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{PropertyChange, Repository};
use crate::event::{Change, CopySource};

/// 单个修订
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub revision: u64,
    #[serde(default)]
    pub author: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
    /// 其他修订属性
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// 某个修订的文件快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub revision: u64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// 路径属性变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyChangeRecord {
    pub path: String,
    pub revision: u64,
    pub name: String,
    #[serde(default)]
    pub old: Option<String>,
    #[serde(default)]
    pub new: Option<String>,
}

/// 完整导出
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryDump {
    pub path: String,
    #[serde(default)]
    pub revisions: Vec<RevisionRecord>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub property_changes: Vec<PropertyChangeRecord>,
    #[serde(default)]
    pub locks: BTreeMap<String, String>,
}

/// 基于导出数据的只读仓库
pub struct ReplayRepository {
    path: String,
    revisions: HashMap<u64, RevisionRecord>,
    files: Vec<FileRecord>,
    property_changes: Vec<PropertyChangeRecord>,
    locks: BTreeMap<String, String>,
}

impl ReplayRepository {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read repository dump {}", path.display()))?;
        let dump: RepositoryDump = serde_json::from_str(&content)
            .with_context(|| format!("Invalid repository dump {}", path.display()))?;
        debug!(
            path = %path.display(),
            revisions = dump.revisions.len(),
            "Repository dump loaded"
        );
        Ok(Self::from_dump(dump))
    }

    pub fn from_dump(dump: RepositoryDump) -> Self {
        let revisions = dump
            .revisions
            .into_iter()
            .map(|mut rec| {
                rec.changes = rec.changes.into_iter().map(normalize_change).collect();
                (rec.revision, rec)
            })
            .collect();
        let files = dump
            .files
            .into_iter()
            .map(|mut f| {
                f.path = normalize(&f.path);
                f
            })
            .collect();
        let property_changes = dump
            .property_changes
            .into_iter()
            .map(|mut p| {
                p.path = normalize(&p.path);
                p
            })
            .collect();
        let locks = dump
            .locks
            .into_iter()
            .map(|(path, comment)| (normalize(&path), comment))
            .collect();

        Self {
            path: dump.path.trim_end_matches('/').to_string(),
            revisions,
            files,
            property_changes,
            locks,
        }
    }

    fn revision(&self, revision: u64) -> Result<&RevisionRecord> {
        self.revisions
            .get(&revision)
            .ok_or_else(|| anyhow!("No such revision {}", revision))
    }

    /// 不晚于 revision 的最新快照
    fn snapshot(&self, path: &str, revision: u64) -> Option<&FileRecord> {
        let path = normalize(path);
        self.files
            .iter()
            .filter(|f| f.path == path && f.revision <= revision)
            .max_by_key(|f| f.revision)
    }
}

impl Repository for ReplayRepository {
    fn path(&self) -> &str {
        &self.path
    }

    fn changes(&self, revision: u64) -> Result<Vec<Change>> {
        Ok(self.revision(revision)?.changes.clone())
    }

    fn revision_author(&self, revision: u64) -> Result<Option<String>> {
        Ok(self.revision(revision)?.author.clone())
    }

    fn revision_time(&self, revision: u64) -> Result<DateTime<Utc>> {
        Ok(self.revision(revision)?.date)
    }

    fn revision_log(&self, revision: u64) -> Result<Option<String>> {
        Ok(self.revision(revision)?.log.clone())
    }

    fn revision_property(&self, revision: u64, name: &str) -> Result<Option<String>> {
        let rec = self.revision(revision)?;
        Ok(match name {
            "svn:author" => rec.author.clone(),
            "svn:log" => rec.log.clone(),
            "svn:date" => Some(rec.date.to_rfc3339()),
            _ => rec.properties.get(name).cloned(),
        })
    }

    fn path_property(&self, name: &str, path: &str, revision: u64) -> Result<Option<String>> {
        Ok(self
            .snapshot(path, revision)
            .and_then(|f| f.properties.get(name).cloned()))
    }

    fn path_content(&self, path: &str, revision: u64) -> Result<Vec<u8>> {
        self.snapshot(path, revision)
            .map(|f| f.content.clone().into_bytes())
            .ok_or_else(|| anyhow!("Path {} not found in revision {}", path, revision))
    }

    fn property_changes(
        &self,
        change: &Change,
        revision: u64,
    ) -> Result<BTreeMap<String, PropertyChange>> {
        Ok(self
            .property_changes
            .iter()
            .filter(|p| p.path == change.path && p.revision == revision)
            .map(|p| {
                (
                    p.name.clone(),
                    PropertyChange {
                        old: p.old.clone(),
                        new: p.new.clone(),
                    },
                )
            })
            .collect())
    }

    fn lock_comment(&self, path: &str) -> Result<Option<String>> {
        Ok(self.locks.get(&normalize(path)).cloned())
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn normalize_change(mut change: Change) -> Change {
    change.path = normalize(&change.path);
    if let Some(source) = change.copy_source.take() {
        change.copy_source = Some(CopySource {
            path: normalize(&source.path),
            revision: source.revision,
        });
    }
    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;

    const DUMP: &str = r#"{
        "path": "/var/svn/repos/",
        "revisions": [{
            "revision": 42, "author": "alice", "date": "2024-05-01T10:00:00Z",
            "log": "Fix parser",
            "changes": [{ "path": "/trunk/a.c", "kind": "modified", "has_content_changes": true }],
            "properties": { "bugtraq:id": "17" }
        }],
        "files": [
            { "path": "trunk/a.c", "revision": 40, "content": "old\n" },
            { "path": "trunk/a.c", "revision": 42, "content": "new\n",
              "properties": { "svn:mime-type": "text/x-c" } }
        ],
        "property_changes": [
            { "path": "trunk/a.c", "revision": 42, "name": "svn:eol-style", "new": "native" }
        ],
        "locks": { "/trunk/a.c": "mine" }
    }"#;

    fn repos() -> ReplayRepository {
        ReplayRepository::from_dump(serde_json::from_str(DUMP).unwrap())
    }

    #[test]
    fn test_changes_are_normalized() {
        let repos = repos();
        assert_eq!(repos.path(), "/var/svn/repos");
        let changes = repos.changes(42).unwrap();
        assert_eq!(changes[0].path, "trunk/a.c");
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_content_uses_latest_snapshot() {
        let repos = repos();
        assert_eq!(repos.path_content("trunk/a.c", 41).unwrap(), b"old\n");
        assert_eq!(repos.path_content("trunk/a.c", 42).unwrap(), b"new\n");
        assert!(repos.path_content("trunk/a.c", 39).is_err());
    }

    #[test]
    fn test_revision_metadata() {
        let repos = repos();
        assert_eq!(repos.revision_author(42).unwrap().as_deref(), Some("alice"));
        assert_eq!(repos.revision_property(42, "svn:log").unwrap().as_deref(), Some("Fix parser"));
        assert_eq!(repos.revision_property(42, "bugtraq:id").unwrap().as_deref(), Some("17"));
        assert!(repos.revision_log(7).is_err());
    }

    #[test]
    fn test_property_changes_and_locks() {
        let repos = repos();
        let change = Change::new("trunk/a.c", ChangeKind::Modified);
        let props = repos.property_changes(&change, 42).unwrap();
        assert_eq!(props["svn:eol-style"].new.as_deref(), Some("native"));
        assert_eq!(props["svn:eol-style"].old, None);
        assert_eq!(repos.lock_comment("trunk/a.c").unwrap().as_deref(), Some("mine"));
        assert_eq!(
            repos.path_property("svn:mime-type", "trunk/a.c", 42).unwrap().as_deref(),
            Some("text/x-c")
        );
    }
}
