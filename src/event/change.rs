//! 变更记录 - 一次事件中单个路径的修改

use serde::{Deserialize, Serialize};

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    Copied,
}

/// 复制来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    pub path: String,
    pub revision: u64,
}

/// 单个路径的变更记录
///
/// 由仓库协作方在每次事件中创建一次，之后只读。
/// 存储的路径既不以 `/` 开头，也不带目录结尾的 `/`；
/// 目录斜杠只出现在渲染出来的路径字符串里（见 [`Change::display_path`]）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    #[serde(default)]
    pub is_directory: bool,
    pub kind: ChangeKind,
    #[serde(default)]
    pub has_content_changes: bool,
    #[serde(default)]
    pub has_property_changes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_source: Option<CopySource>,
}

impl Change {
    /// 创建变更，自动规范化路径
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: normalize_path(&path.into()),
            is_directory: false,
            kind,
            has_content_changes: false,
            has_property_changes: false,
            copy_source: None,
        }
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    pub fn with_content_changes(mut self) -> Self {
        self.has_content_changes = true;
        self
    }

    pub fn with_property_changes(mut self) -> Self {
        self.has_property_changes = true;
        self
    }

    /// 标记为复制，kind 同时变为 `Copied`
    pub fn copied_from(mut self, path: impl Into<String>, revision: u64) -> Self {
        self.kind = ChangeKind::Copied;
        self.copy_source = Some(CopySource {
            path: normalize_path(&path.into()),
            revision,
        });
        self
    }

    /// 复制也算作新增
    pub fn was_added(&self) -> bool {
        matches!(self.kind, ChangeKind::Added | ChangeKind::Copied)
    }

    pub fn was_copied(&self) -> bool {
        self.kind == ChangeKind::Copied
    }

    pub fn was_deleted(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }

    pub fn was_modified(&self) -> bool {
        self.kind == ChangeKind::Modified
    }

    /// 渲染用路径，目录带结尾斜杠
    pub fn display_path(&self) -> String {
        if self.is_directory {
            format!("{}/", self.path)
        } else {
            self.path.clone()
        }
    }

    /// 旧版本所在路径（复制时为来源路径）
    pub fn base_path(&self) -> &str {
        self.copy_source
            .as_ref()
            .map(|s| s.path.as_str())
            .unwrap_or(&self.path)
    }

    /// 旧版本号；非复制变更为 `revision - 1`
    pub fn base_revision(&self, revision: u64) -> u64 {
        self.copy_source
            .as_ref()
            .map(|s| s.revision)
            .unwrap_or_else(|| revision.saturating_sub(1))
    }
}

/// 去掉开头和结尾的斜杠
fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_normalized() {
        let change = Change::new("/trunk/src/", ChangeKind::Modified).directory();
        assert_eq!(change.path, "trunk/src");
        assert_eq!(change.display_path(), "trunk/src/");
    }

    #[test]
    fn test_copy_counts_as_added() {
        let change = Change::new("branches/b1", ChangeKind::Added).copied_from("/trunk", 10);
        assert!(change.was_added());
        assert!(change.was_copied());
        assert_eq!(change.base_path(), "trunk");
        assert_eq!(change.base_revision(42), 10);
    }

    #[test]
    fn test_base_revision_defaults_to_previous() {
        let change = Change::new("a.txt", ChangeKind::Modified);
        assert_eq!(change.base_path(), "a.txt");
        assert_eq!(change.base_revision(42), 41);
        assert_eq!(change.base_revision(0), 0);
    }

    #[test]
    fn test_deserialize_defaults() {
        let change: Change =
            serde_json::from_str(r#"{"path": "trunk/x.c", "kind": "modified"}"#).unwrap();
        assert!(!change.is_directory);
        assert!(!change.has_content_changes);
        assert!(change.copy_source.is_none());
    }
}
