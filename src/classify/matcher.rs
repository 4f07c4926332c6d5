//! 分组匹配 - 对单个变更求出适用的分组

use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::trace;

use super::Substitutions;
use crate::config::{GroupConfig, GroupId, Settings};
use crate::event::Change;

/// 匹配时用到的事件元数据
#[derive(Debug, Clone, Default)]
pub struct EventMeta {
    pub author: Option<String>,
    pub revision: Option<u64>,
    /// 修订属性名（propchange 事件）
    pub property: Option<String>,
    /// 仓库根路径，不带结尾斜杠
    pub repos_path: String,
}

/// 单个变更的匹配结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub selected: Vec<GroupId>,
    /// 设置了 `ignore_if_other_matches` 的分组
    pub suppressed: Vec<GroupId>,
}

impl MatchOutcome {
    /// 最终适用的分组：有主分组时只用主分组，否则全部备用分组
    pub fn applicable(&self) -> &[GroupId] {
        if self.selected.is_empty() {
            &self.suppressed
        } else {
            &self.selected
        }
    }
}

/// 分组匹配器
pub struct GroupMatcher<'a> {
    settings: &'a Settings,
    meta: &'a EventMeta,
}

impl<'a> GroupMatcher<'a> {
    pub fn new(settings: &'a Settings, meta: &'a EventMeta) -> Self {
        Self { settings, meta }
    }

    /// 按配置顺序评估所有分组
    ///
    /// 适用分组的替换表写入 `subst`。配置合法时不会失败。
    pub fn match_change(&self, change: &Change, subst: &mut Substitutions) -> MatchOutcome {
        let path = change.display_path();
        let repos_path = self.meta.repos_path.as_str();
        let mut outcome = MatchOutcome::default();

        for (idx, group) in self.settings.groups.iter().enumerate() {
            let mut values = self.base_values(group, &path);

            if let Some(re) = &group.for_repository {
                if !capture_into(re, repos_path, &mut values) {
                    continue;
                }
            }
            if let Some(re) = &group.exclude_paths {
                if re.is_match(&path) {
                    trace!(group = %group.name, path = %path, "Path excluded");
                    continue;
                }
            }
            if let Some(re) = &group.for_paths {
                if !capture_into(re, &path, &mut values) {
                    continue;
                }
            }

            let id = GroupId(idx);
            subst.update(id, values);
            if group.ignore_if_other_matches {
                outcome.suppressed.push(id);
            } else {
                outcome.selected.push(id);
            }
        }

        trace!(
            path = %path,
            selected = outcome.selected.len(),
            suppressed = outcome.suppressed.len(),
            "Change matched"
        );
        outcome
    }

    /// 为默认分组写入替换表
    pub fn fill_default(&self, change: &Change, subst: &mut Substitutions) {
        let values = self.base_values(&self.settings.default_group, &change.display_path());
        subst.update(self.settings.default_group_id(), values);
    }

    /// 基础替换表
    ///
    /// 默认分组的 `for_repository` / `for_paths` 只用来提供命名捕获，
    /// 对所有分组生效。
    fn base_values(&self, group: &GroupConfig, path: &str) -> BTreeMap<String, String> {
        let author = self
            .meta
            .author
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "no_author".to_string());

        let mut values = BTreeMap::new();
        values.insert("group".to_string(), group.name.clone());
        values.insert(
            "property".to_string(),
            self.meta.property.clone().unwrap_or_default(),
        );
        values.insert(
            "revision".to_string(),
            self.meta
                .revision
                .map(|r| r.to_string())
                .unwrap_or_default(),
        );

        if group.extract_x509_author {
            if let Some((realname, mail)) = extract_x509_user(&author) {
                let address = match &realname {
                    Some(name) => format!("{} <{}>", name, mail),
                    None => mail.clone(),
                };
                values.insert("x509_address".to_string(), address);
                values.insert("x509_CN".to_string(), realname.unwrap_or_default());
                values.insert("x509_emailAddress".to_string(), mail);
            }
        }
        values.insert("author".to_string(), author);

        let defaults = &self.settings.default_group;
        if let Some(re) = &defaults.for_repository {
            capture_into(re, &self.meta.repos_path, &mut values);
        }
        if let Some(re) = &defaults.for_paths {
            capture_into(re, path, &mut values);
        }
        values
    }
}

/// 匹配成功时把命名捕获写入 `values`
///
/// 未参与匹配的命名组写入空字符串。
fn capture_into(re: &Regex, text: &str, values: &mut BTreeMap<String, String>) -> bool {
    let Some(caps) = re.captures(text) else {
        return false;
    };
    for name in re.capture_names().flatten() {
        let value = caps.name(name).map(|m| m.as_str()).unwrap_or("");
        values.insert(name.to_string(), value.to_string());
    }
    true
}

/// 从 x509 主题字符串提取 (CN, 邮箱)
///
/// 必须带 `emailAddress`，CN 可缺省。
pub fn extract_x509_user(author: &str) -> Option<(Option<String>, String)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    let (cn_re, email_re) = PATTERNS
        .get_or_init(|| {
            let cn = RegexBuilder::new(r"/CN=([^/]+)")
                .case_insensitive(true)
                .build()
                .ok()?;
            let email = RegexBuilder::new(r"/emailAddress=([^/]+)")
                .case_insensitive(true)
                .build()
                .ok()?;
            Some((cn, email))
        })
        .as_ref()?;

    let mail = email_re.captures(author)?.get(1)?.as_str().to_string();
    let realname = cn_re
        .captures(author)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some((realname, mail))
}
