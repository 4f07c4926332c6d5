//! 主题行 - 模板替换、公共前缀压缩、目录回退和省略号截断
//!
//! 每个分组集只计算一次（文件列表还是目录列表在这里决定），
//! 拆分时每个分片只替换 `%(part)s` 标记。

use std::collections::BTreeMap;

use crate::classify::{substitute, GroupSet, Substitutions};
use crate::event::{Change, EventKind};

/// 未设置长度上限时，超过该长度也改用目录列表
const SHORT_SUBJECT_LENGTH: usize = 255;

const FILES_OR_DIRS: &str = "%(files/dirs)s";
const PART_PLACEHOLDER: &str = "%(part)s";

/// 提取公共目录前缀
///
/// 路径中目录以 `/` 结尾，不以 `/` 开头。返回 (不带结尾斜杠的前缀, 剥离后的路径)；
/// 剥离后为空的路径写作 `./`。只有一个路径或包含根目录时不压缩。
pub fn common_paths(paths: &[String]) -> (String, Vec<String>) {
    if paths.len() <= 1 || paths.iter().any(|p| p == "/") {
        return (String::new(), paths.to_vec());
    }

    let first = paths[0].as_bytes();
    let mut len = paths[1..].iter().fold(first.len(), |len, path| {
        first[..len]
            .iter()
            .zip(path.as_bytes())
            .take_while(|(a, b)| a == b)
            .count()
    });
    while !paths[0].is_char_boundary(len) {
        len -= 1;
    }
    // 退到最近的目录边界
    match paths[0][..len].rfind('/') {
        Some(pos) if len == 0 || first[len - 1] != b'/' => len = pos + 1,
        Some(_) => {}
        None => len = 0,
    }
    if len == 0 {
        return (String::new(), paths.to_vec());
    }

    let stripped = paths
        .iter()
        .map(|p| {
            let rest = &p[len..];
            if rest.is_empty() {
                "./".to_string()
            } else {
                rest.to_string()
            }
        })
        .collect();
    (paths[0][..len - 1].to_string(), stripped)
}

/// 渲染路径列表：`/a /b` 或 `in /common: a b`
pub fn path_string(common: &str, paths: &[String]) -> String {
    let slash = if common.is_empty() { "/" } else { "" };
    let joined = paths
        .iter()
        .map(|p| {
            if p.starts_with('/') {
                p.clone()
            } else {
                format!("{}{}", slash, p)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    if common.is_empty() {
        joined
    } else {
        format!("in /{}: {}", common, joined)
    }
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

fn prefixed(paths: Vec<String>) -> String {
    let (common, mut paths) = common_paths(&paths);
    paths.sort();
    path_string(&common, &paths)
}

/// 文件列表（压缩公共前缀后）
pub fn prefixed_files(changes: &[&Change]) -> String {
    prefixed(unique(changes.iter().map(|c| c.display_path())))
}

/// 所在目录列表（压缩公共前缀后）
pub fn prefixed_directories(changes: &[&Change]) -> String {
    prefixed(unique(changes.iter().map(|c| {
        let dir = if c.is_directory {
            c.path.as_str()
        } else {
            c.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
        };
        if dir.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", dir)
        }
    })))
}

/// 按字符截断并加省略号
fn ellipsize(text: String, max_length: usize) -> String {
    if max_length == 0 || text.chars().count() <= max_length {
        return text;
    }
    let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 一个分组集的主题行
#[derive(Debug, Clone)]
pub struct SubjectLine {
    /// `%(files/dirs)s` 已确定的模板
    template: String,
    values: BTreeMap<String, String>,
    max_length: usize,
}

impl SubjectLine {
    pub fn new(kind: &EventKind, set: &GroupSet<'_>, subst: &Substitutions) -> Self {
        let group = set.representative();
        let config = group.config;

        let mut values = subst.values(group.id).cloned().unwrap_or_default();
        let prefix = config
            .subjects
            .prefix_for(kind)
            .map(|p| subst.render(group.id, p))
            .unwrap_or_default();
        values.insert("prefix".to_string(), prefix);

        let mut changes = set.changes.clone();
        if let Some(xchanges) = &set.xchanges {
            changes.extend(xchanges.iter().copied());
        }
        values.insert("files".to_string(), prefixed_files(&changes));
        values.insert("dirs".to_string(), prefixed_directories(&changes));

        let max_length = config.max_subject_length;
        let short_length = if max_length == 0 {
            SHORT_SUBJECT_LENGTH
        } else {
            max_length
        };

        let raw = config.subjects.template_for(kind);
        let mut subject = Self {
            template: raw.replace(FILES_OR_DIRS, "%(files)s"),
            values,
            max_length,
        };
        if subject.expand(None).chars().count() > short_length {
            subject.template = raw.replace(FILES_OR_DIRS, "%(dirs)s");
        }
        subject
    }

    fn expand(&self, marker: Option<&str>) -> String {
        let mut values = self.values.clone();
        values.insert("part".to_string(), marker.unwrap_or_default().to_string());
        normalize_whitespace(&substitute(&self.template, &values))
    }

    /// 渲染主题；`marker` 为拆分分片的 `[i/N]`
    ///
    /// 模板里没有 `%(part)s` 时，标记追加在截断之后。
    pub fn render(&self, marker: Option<&str>) -> String {
        if self.template.contains(PART_PLACEHOLDER) {
            return ellipsize(self.expand(marker), self.max_length);
        }
        let subject = ellipsize(self.expand(None), self.max_length);
        match marker {
            Some(marker) => format!("{} {}", subject, marker),
            None => subject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::GroupRef;
    use crate::config::{GroupConfig, GroupId};
    use crate::event::ChangeKind;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_common_paths_strips_directory_prefix() {
        let (common, paths) = common_paths(&strings(&["trunk/src/a.c", "trunk/src/b.c", "trunk/doc/"]));
        assert_eq!(common, "trunk");
        assert_eq!(paths, strings(&["src/a.c", "src/b.c", "doc/"]));
    }

    #[test]
    fn test_common_paths_cuts_at_directory_boundary() {
        let (common, paths) = common_paths(&strings(&["trunk/abc.c", "trunk/abd.c"]));
        assert_eq!(common, "trunk");
        assert_eq!(paths, strings(&["abc.c", "abd.c"]));

        let (common, paths) = common_paths(&strings(&["trunk/", "trunk/a.c"]));
        assert_eq!(common, "trunk");
        assert_eq!(paths, strings(&["./", "a.c"]));
    }

    #[test]
    fn test_common_paths_without_prefix() {
        let input = strings(&["a.c", "b.c"]);
        assert_eq!(common_paths(&input), (String::new(), input.clone()));
        let single = strings(&["trunk/a.c"]);
        assert_eq!(common_paths(&single), (String::new(), single.clone()));
        let root = strings(&["/", "trunk/a.c"]);
        assert_eq!(common_paths(&root), (String::new(), root.clone()));
    }

    #[test]
    fn test_path_string() {
        assert_eq!(path_string("", &strings(&["a.c", "b/"])), "/a.c /b/");
        assert_eq!(path_string("trunk", &strings(&["a.c", "b.c"])), "in /trunk: a.c b.c");
    }

    #[test]
    fn test_directories_are_unique() {
        let a = Change::new("trunk/src/a.c", ChangeKind::Modified);
        let b = Change::new("trunk/src/b.c", ChangeKind::Modified);
        let d = Change::new("trunk/doc", ChangeKind::Added).directory();
        let top = Change::new("README", ChangeKind::Modified);
        assert_eq!(prefixed_directories(&[&a, &b, &d]), "in /trunk: doc/ src/");
        assert_eq!(prefixed_files(&[&a, &b]), "in /trunk/src: a.c b.c");
        assert_eq!(prefixed_directories(&[&top]), "/");
    }

    fn group_set<'a>(config: &'a GroupConfig, changes: Vec<&'a Change>) -> GroupSet<'a> {
        GroupSet {
            groups: vec![GroupRef {
                id: GroupId(0),
                config,
            }],
            changes,
            xchanges: None,
        }
    }

    fn subst(revision: &str) -> Substitutions {
        let mut subst = Substitutions::new();
        let values = [("revision", revision), ("author", "alice")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        subst.update(GroupId(0), values);
        subst
    }

    #[test]
    fn test_commit_subject_with_prefix_and_marker() {
        let mut config = GroupConfig::new("core");
        config.subjects.commit_prefix = Some("[svn:%(author)s]".to_string());
        let a = Change::new("trunk/a.c", ChangeKind::Modified);
        let b = Change::new("trunk/b.c", ChangeKind::Modified);
        let set = group_set(&config, vec![&a, &b]);
        let subject = SubjectLine::new(&EventKind::Commit, &set, &subst("42"));

        assert_eq!(subject.render(None), "[svn:alice] r42 - in /trunk: a.c b.c");
        assert_eq!(
            subject.render(Some("[2/3]")),
            "[svn:alice] r42 [2/3] - in /trunk: a.c b.c"
        );
    }

    #[test]
    fn test_long_file_list_falls_back_to_directories() {
        let mut config = GroupConfig::new("core");
        config.max_subject_length = 40;
        let changes: Vec<Change> = (0..10)
            .map(|i| Change::new(format!("trunk/src/file{}.c", i), ChangeKind::Modified))
            .chain(std::iter::once(Change::new("trunk/doc/x.txt", ChangeKind::Modified)))
            .collect();
        let set = group_set(&config, changes.iter().collect());
        let subject = SubjectLine::new(&EventKind::Commit, &set, &subst("7"));
        assert_eq!(subject.render(None), "r7 - in /trunk: doc/ src/");
    }

    #[test]
    fn test_too_long_subject_gets_ellipsis() {
        let mut config = GroupConfig::new("core");
        config.max_subject_length = 20;
        let changes: Vec<Change> = (0..5)
            .map(|i| Change::new(format!("dir{}/file.c", i), ChangeKind::Modified))
            .collect();
        let set = group_set(&config, changes.iter().collect());
        let rendered = SubjectLine::new(&EventKind::Commit, &set, &subst("7")).render(None);
        assert_eq!(rendered.chars().count(), 20);
        assert!(rendered.ends_with("..."));
        assert!(rendered.starts_with("r7 - /dir0/"));
    }

    #[test]
    fn test_marker_appended_when_template_has_no_part() {
        let mut config = GroupConfig::new("core");
        config.subjects.commit_template = Some("commit %(revision)s".to_string());
        let a = Change::new("a.c", ChangeKind::Modified);
        let set = group_set(&config, vec![&a]);
        let subject = SubjectLine::new(&EventKind::Commit, &set, &subst("9"));
        assert_eq!(subject.render(Some("[1/2]")), "commit 9 [1/2]");
    }
}
