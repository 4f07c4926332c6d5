//! 变更分组 - 把一次事件的变更分配给配置的分组
//!
//! 流程：
//! 1. [`GroupMatcher`] 对每个变更挑出适用的分组，并计算替换表
//! 2. [`GroupSetBuilder`] 汇总所有变更，把输出相同的分组合并成 [`GroupSet`]
//!
//! 替换表不挂在配置上，而是存放在按 (分组, 键) 索引的 [`Substitutions`] 旁路表中。

pub mod groupset;
pub mod matcher;

pub use groupset::{classify, GroupRef, GroupSet, GroupSetBuilder};
pub use matcher::{extract_x509_user, EventMeta, GroupMatcher, MatchOutcome};

use std::collections::{BTreeMap, HashMap};

use crate::config::GroupId;

/// 每个分组的替换表
///
/// 同一分组被多个变更匹配时，后面的变更覆盖前面写入的值。
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    table: HashMap<GroupId, BTreeMap<String, String>>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并写入，同名键覆盖
    pub fn update(&mut self, group: GroupId, values: BTreeMap<String, String>) {
        self.table.entry(group).or_default().extend(values);
    }

    pub fn get(&self, group: GroupId, key: &str) -> Option<&str> {
        self.table
            .get(&group)
            .and_then(|m| m.get(key))
            .map(|s| s.as_str())
    }

    pub fn values(&self, group: GroupId) -> Option<&BTreeMap<String, String>> {
        self.table.get(&group)
    }

    /// 用分组的替换表填充模板
    pub fn render(&self, group: GroupId, template: &str) -> String {
        match self.table.get(&group) {
            Some(values) => substitute(template, values),
            None => substitute(template, &BTreeMap::new()),
        }
    }
}

/// 替换 `%(key)s` 占位符
///
/// 未知键和空值都替换为空字符串，`%%` 输出一个 `%`，
/// 其他 `%` 原样保留。
pub fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("%%") {
            out.push('%');
            rest = &tail[2..];
            continue;
        }
        if let Some(body) = tail.strip_prefix("%(") {
            if let Some(end) = body.find(")s") {
                let key = &body[..end];
                if let Some(value) = values.get(key) {
                    out.push_str(value);
                }
                rest = &body[end + 2..];
                continue;
            }
        }
        out.push('%');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}
