//! 分组集合 - 合并输出相同的分组
//!
//! # 合并规则
//! 两个分组只有在匹配到完全相同的变更列表（同样的变更、同样的顺序），
//! 且配置在输出上等价时才会合并。输出比较使用各分组替换表填充后的值。
//! 比较只针对集合中的第一个分组：集合里的分组两两等价，
//! 所以与第一个比较就足够了。

use std::collections::HashMap;
use tracing::{debug, info};

use super::{EventMeta, GroupMatcher, Substitutions};
use crate::config::{GroupConfig, GroupId, NonMatchingPaths, OutputKey, Settings};
use crate::event::Change;

/// 分组引用：身份 + 配置
#[derive(Debug, Clone, Copy)]
pub struct GroupRef<'a> {
    pub id: GroupId,
    pub config: &'a GroupConfig,
}

/// 一组输出等价的分组及其共同匹配的变更
#[derive(Debug, Clone)]
pub struct GroupSet<'a> {
    /// 至少一个，第一个是代表
    pub groups: Vec<GroupRef<'a>>,
    /// 非空
    pub changes: Vec<&'a Change>,
    /// 其他区域的变更；`None` 表示不提及，空列表表示只提示不列出
    pub xchanges: Option<Vec<&'a Change>>,
}

impl<'a> GroupSet<'a> {
    pub fn representative(&self) -> GroupRef<'a> {
        self.groups[0]
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.config.name.clone()).collect()
    }
}

/// 汇总器：逐个推入变更的匹配结果，最后生成分组集合
pub struct GroupSetBuilder<'a> {
    settings: &'a Settings,
    changes: &'a [Change],
    /// 分组首次出现的顺序
    order: Vec<GroupId>,
    /// 每个分组匹配到的变更下标
    accumulated: HashMap<GroupId, Vec<usize>>,
}

impl<'a> GroupSetBuilder<'a> {
    pub fn new(settings: &'a Settings, changes: &'a [Change]) -> Self {
        Self {
            settings,
            changes,
            order: Vec::new(),
            accumulated: HashMap::new(),
        }
    }

    /// 记录第 `change_index` 个变更适用的分组
    pub fn push(&mut self, change_index: usize, groups: &[GroupId]) {
        for &id in groups {
            if !self.accumulated.contains_key(&id) {
                self.order.push(id);
            }
            self.accumulated.entry(id).or_default().push(change_index);
        }
    }

    /// 是否有分组匹配到了变更
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 生成分组集合
    ///
    /// 没有任何分组匹配时，用默认分组和全部变更生成一个集合；
    /// 事件没有变更时返回空列表。
    pub fn build(mut self, subst: &Substitutions) -> Vec<GroupSet<'a>> {
        if self.changes.is_empty() {
            debug!("Event has no changes, nothing to notify");
            return Vec::new();
        }
        if self.order.is_empty() {
            let id = self.settings.default_group_id();
            info!(group = %self.settings.default_group.name, "No group matched, using default group");
            self.order.push(id);
            self.accumulated.insert(id, (0..self.changes.len()).collect());
        }

        // (代表的比较键, 分组, 变更下标)
        let mut merged: Vec<(OutputKey<'a>, Vec<GroupRef<'a>>, Vec<usize>)> = Vec::new();
        for id in &self.order {
            let indices = self.accumulated.remove(id).unwrap_or_default();
            let candidate = GroupRef {
                id: *id,
                config: self.settings.group(*id),
            };
            let key = candidate
                .config
                .output_key(&|template: &str| subst.render(candidate.id, template));

            let existing = merged
                .iter_mut()
                .find(|entry| entry.2 == indices && entry.0 == key);
            match existing {
                Some(entry) => {
                    debug!(
                        group = %candidate.config.name,
                        into = %entry.1[0].config.name,
                        "Group merged"
                    );
                    entry.1.push(candidate);
                }
                None => merged.push((key, vec![candidate], indices)),
            }
        }

        merged
            .into_iter()
            .map(|(_, groups, indices)| self.finish(groups, indices))
            .collect()
    }

    fn finish(&self, groups: Vec<GroupRef<'a>>, indices: Vec<usize>) -> GroupSet<'a> {
        let changes: Vec<&'a Change> = indices.iter().map(|&i| &self.changes[i]).collect();
        let others: Vec<&'a Change> = self
            .changes
            .iter()
            .enumerate()
            .filter(|(i, _)| !indices.contains(i))
            .map(|(_, c)| c)
            .collect();

        let xchanges = match groups[0].config.show_nonmatching_paths {
            NonMatchingPaths::Ignore => None,
            NonMatchingPaths::Yes => Some(others),
            NonMatchingPaths::No => Some(Vec::new()),
        };

        GroupSet {
            groups,
            changes,
            xchanges,
        }
    }
}

/// 对一次事件的全部变更执行匹配和合并
pub fn classify<'a>(
    settings: &'a Settings,
    changes: &'a [Change],
    meta: &EventMeta,
    subst: &mut Substitutions,
) -> Vec<GroupSet<'a>> {
    let matcher = GroupMatcher::new(settings, meta);
    let mut builder = GroupSetBuilder::new(settings, changes);

    for (idx, change) in changes.iter().enumerate() {
        let outcome = matcher.match_change(change, subst);
        builder.push(idx, outcome.applicable());
    }
    if builder.is_empty() {
        if let Some(last) = changes.last() {
            matcher.fill_default(last, subst);
        }
    }

    let sets = builder.build(subst);
    info!(
        changes = changes.len(),
        group_sets = sets.len(),
        "Changes classified"
    );
    sets
}
