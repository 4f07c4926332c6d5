//! 正文生成 - 把一个分组集渲染成通知正文
//!
//! 提交事件的固定顺序：元数据、路径列表（含其他区域的变更）、差异列表。
//! 生成器只面向 [`PartWriter`] 写文本，并在自然分界点调用钩子，
//! 超长策略对这里不可见。

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

use super::links::BrowserLinks;
use super::writer::{DiffLink, PartWriter};
use crate::classify::{extract_x509_user, GroupSet, Substitutions};
use crate::config::{DiffSelection, DiffToken, NonMatchingPaths};
use crate::differ::{differ_for, DiffLabels, Differ};
use crate::event::{Change, EventContext, EventKind, PropAction};
use crate::repository::{change_is_binary, PropertyChange, Repository};

const SEPARATOR: &str =
    "==============================================================================\n";
const SEPARATOR_LIGHT: &str =
    "------------------------------------------------------------------------------\n";

/// 单行属性的最大长度（名称 + 值）
const ONE_LINE_PROPERTY_LENGTH: usize = 75;

/// 通知中的日期格式（与 `ctime` 一致）
pub fn format_date(time: &DateTime<Utc>) -> String {
    time.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// 属性值是否像二进制：含控制字符，或很长却没有换行
fn is_binary_property(values: &[Option<&str>]) -> bool {
    values.iter().flatten().any(|value| {
        let has_ctrl = value
            .chars()
            .any(|c| (c as u32) < 32 && !matches!(c, '\r' | '\n' | '\t' | '\x0c'));
        let head: String = value.chars().take(255).collect();
        has_ctrl || (value.chars().count() > 255 && !head.contains('\n'))
    })
}

fn is_one_line_property(name: &str, value: &str) -> bool {
    name.len() + value.len() <= ONE_LINE_PROPERTY_LENGTH && !value.contains('\n')
}

/// `svn:` 属性总是文本
fn is_text_property(name: &str) -> bool {
    name.starts_with("svn:")
}

fn property_action(values: &PropertyChange) -> DiffToken {
    match (&values.old, &values.new) {
        (None, _) => DiffToken::Add,
        (_, None) => DiffToken::Delete,
        _ => DiffToken::Modify,
    }
}

fn content_action(change: &Change) -> Option<DiffToken> {
    if change.was_deleted() {
        Some(DiffToken::Delete)
    } else if change.was_copied() {
        Some(DiffToken::Copy)
    } else if change.was_added() {
        Some(DiffToken::Add)
    } else if change.has_content_changes {
        Some(DiffToken::Modify)
    } else {
        None
    }
}

fn ensure_newline(value: &str) -> String {
    if value.is_empty() || value.ends_with('\n') {
        value.to_string()
    } else {
        format!("{}\n", value)
    }
}

/// 正文生成器
pub struct MessageComposer<'a> {
    repos: &'a dyn Repository,
    event: &'a EventContext,
    set: &'a GroupSet<'a>,
    differ: Box<dyn Differ>,
    links: Option<BrowserLinks>,
    diffs: DiffSelection,
}

impl<'a> MessageComposer<'a> {
    pub fn new(
        repos: &'a dyn Repository,
        event: &'a EventContext,
        set: &'a GroupSet<'a>,
        subst: &Substitutions,
        tempdir: Option<PathBuf>,
    ) -> Self {
        let group = set.representative();
        let links = group
            .config
            .browser_base_url
            .as_deref()
            .map(|url| subst.render(group.id, url))
            .filter(|url| !url.trim().is_empty())
            .map(|url| BrowserLinks::new(&url));
        Self {
            repos,
            event,
            set,
            differ: differ_for(group.config.diff_command.as_deref(), tempdir),
            links,
            diffs: group.config.diff_selection(),
        }
    }

    pub fn with_differ(mut self, differ: Box<dyn Differ>) -> Self {
        self.differ = differ;
        self
    }

    /// 是否配置了浏览地址
    pub fn has_links(&self) -> bool {
        self.links.is_some()
    }

    pub fn compose(&self, writer: &mut dyn PartWriter) -> Result<()> {
        debug!(
            event = %self.event.kind,
            writer = writer.name(),
            changes = self.set.changes.len(),
            "Composing notification"
        );
        match &self.event.kind {
            EventKind::Commit => self.write_commit(writer),
            EventKind::PropChange { name, action } => self.write_revprop(writer, name, *action),
            EventKind::Lock | EventKind::Unlock => self.write_lock(writer),
        }
    }

    fn revision(&self) -> Result<u64> {
        self.event
            .revision
            .ok_or_else(|| anyhow!("{} event without revision", self.event.kind))
    }

    fn author(&self) -> &str {
        self.event.author.as_deref().unwrap_or("(unknown)")
    }

    fn all_changes(&self) -> impl Iterator<Item = &'a Change> + '_ {
        self.set
            .changes
            .iter()
            .chain(self.set.xchanges.iter().flatten())
            .copied()
    }

    // ========================================================================
    // 提交
    // ========================================================================

    fn write_commit(&self, w: &mut dyn PartWriter) -> Result<()> {
        let revision = self.revision()?;
        let date = format_date(&self.repos.revision_time(revision)?);

        self.write_metadata(w, revision, &date)?;
        self.write_path_list(w)?;
        w.end_summary()?;
        self.write_diff_list(w, revision, &date)
    }

    fn write_metadata(&self, w: &mut dyn PartWriter, revision: u64, date: &str) -> Result<()> {
        let mut author = self.author().to_string();
        if self.set.representative().config.extract_x509_author {
            if let Some((Some(cn), _)) = extract_x509_user(&author) {
                author = cn;
            }
        }

        w.write(&format!("Author: {}\n", author))?;
        w.write(&format!("Date: {}\n", date))?;
        w.write(&format!("New Revision: {}\n", revision))?;
        w.write("\n")?;

        if let Some(links) = &self.links {
            w.write(&format!("URL: {}\n", links.revision_url(revision)))?;
        }

        let log = self.repos.revision_log(revision)?.unwrap_or_default();
        if log.is_empty() {
            w.write("Log: (empty)")?;
        } else {
            w.write(&format!("Log:\n{}", log))?;
        }
        if !log.ends_with('\n') {
            w.write("\n")?;
        }
        w.write("\n")
    }

    fn write_path_list(&self, w: &mut dyn PartWriter) -> Result<()> {
        write_paths(w, &self.set.changes)?;

        match &self.set.xchanges {
            Some(xchanges) if !xchanges.is_empty() => {
                w.write("\nChanges in other areas also in this revision:\n")?;
                write_paths(w, xchanges)?;
            }
            Some(_)
                if self.set.representative().config.show_nonmatching_paths
                    == NonMatchingPaths::No =>
            {
                w.write(
                    "\n(There are changes in other areas, but they are not listed here.)\n",
                )?;
            }
            _ => {}
        }
        Ok(())
    }

    fn write_diff_list(&self, w: &mut dyn PartWriter, revision: u64, date: &str) -> Result<()> {
        w.write("\n")?;
        for change in self.all_changes() {
            if self.diffs.first_match(change).is_none() {
                continue;
            }
            if change.has_content_changes || (change.was_deleted() && !change.is_directory) {
                self.write_content_diff(w, change, revision, date)?;
            }
            if change.has_property_changes && self.diffs.contains(DiffToken::PropChange) {
                self.write_property_diffs(w, change, revision, date)?;
            }
        }
        Ok(())
    }

    fn write_content_diff(
        &self,
        w: &mut dyn PartWriter,
        change: &Change,
        revision: u64,
        date: &str,
    ) -> Result<()> {
        if change.is_directory {
            return Ok(());
        }
        let Some(token) = content_action(change) else {
            return Ok(());
        };

        let action = match token {
            DiffToken::Delete => format!("Removed: {}\n", change.path),
            DiffToken::Copy => format!(
                "Copied: {} (from r{}, {})\n",
                change.path,
                change.base_revision(revision),
                change.base_path()
            ),
            DiffToken::Add => format!("Added: {}\n", change.path),
            _ => format!("Modified: {}\n", change.path),
        };
        w.write(&action)?;

        let url = self
            .links
            .as_ref()
            .and_then(|links| links.content_diff_url(change, revision));
        if let Some(url) = &url {
            w.write(&format!("URL: {}\n", url))?;
        }
        w.write(SEPARATOR)?;

        if change_is_binary(self.repos, change, revision)? {
            let single = (change.was_added() && !change.was_copied()) || change.was_deleted();
            w.write(&format!(
                "Binary file{} - no diff available.\n",
                if single { "" } else { "s" }
            ))?;
        } else {
            let old = match token {
                DiffToken::Add => Vec::new(),
                _ => self
                    .repos
                    .path_content(change.base_path(), change.base_revision(revision))?,
            };
            let new = match token {
                DiffToken::Delete => Vec::new(),
                _ => self.repos.path_content(&change.path, revision)?,
            };
            let label_from = if change.was_copied() {
                change.base_path()
            } else {
                change.path.as_str()
            };
            self.write_diff(w, token, label_from, &change.path, &old, &new, date)?;
        }
        w.write("\n")?;

        let link = url.map(|url| DiffLink { action, url });
        w.end_content_diff(link.as_ref())
    }

    fn write_property_diffs(
        &self,
        w: &mut dyn PartWriter,
        change: &Change,
        revision: u64,
        date: &str,
    ) -> Result<()> {
        if change.was_deleted() {
            return Ok(());
        }

        for (name, values) in self.repos.property_changes(change, revision)? {
            let token = property_action(&values);
            w.write(&format!("Propchange: {}\n", change.display_path()))?;
            if self.diffs.contains(token) {
                self.write_property_diff(
                    w,
                    token,
                    &name,
                    values.old.as_deref(),
                    values.new.as_deref(),
                    date,
                )?;
            } else {
                let desc = match token {
                    DiffToken::Add => "added",
                    DiffToken::Delete => "removed",
                    _ => "modified",
                };
                w.write(&format!("            ('{}' {})\n", name, desc))?;
            }
            w.write("\n")?;
        }
        w.end_property_diffs()
    }

    fn write_property_diff(
        &self,
        w: &mut dyn PartWriter,
        token: DiffToken,
        name: &str,
        old: Option<&str>,
        new: Option<&str>,
        date: &str,
    ) -> Result<()> {
        w.write(SEPARATOR_LIGHT)?;

        if !is_text_property(name) && is_binary_property(&[old, new]) {
            w.write(&format!("Binary property '{}' - no diff available.\n", name))?;
            return Ok(());
        }
        let new_value = new.unwrap_or_default();
        if token == DiffToken::Add && is_one_line_property(name, new_value) {
            w.write(&format!("    {} = {}\n", name, new_value))?;
            return Ok(());
        }

        let old = ensure_newline(old.unwrap_or_default());
        let new = ensure_newline(new_value);
        self.write_diff(w, token, name, name, old.as_bytes(), new.as_bytes(), date)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_diff(
        &self,
        w: &mut dyn PartWriter,
        token: DiffToken,
        label_from: &str,
        label_to: &str,
        old: &[u8],
        new: &[u8],
        date: &str,
    ) -> Result<()> {
        let date_from = if token == DiffToken::Add {
            "(added)"
        } else {
            "(original)"
        };
        let date_to = if token == DiffToken::Delete {
            "(removed)"
        } else {
            date
        };
        let labels = DiffLabels::new(label_from, label_to).with_dates(date_from, date_to);

        let lines = self.differ.diff(old, new, &labels)?;
        if lines.is_empty() {
            return w.write("    (empty)\n");
        }
        for line in &lines {
            w.write(line)?;
            if !line.ends_with('\n') {
                w.write("\n")?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // 修订属性和锁
    // ========================================================================

    fn write_revprop(
        &self,
        w: &mut dyn PartWriter,
        name: &str,
        action: Option<PropAction>,
    ) -> Result<()> {
        let revision = self.revision()?;
        let desc = action.map(|a| a.description()).unwrap_or("Modified");
        w.write(&format!(
            "Author: {}\nRevision: {}\n{} property: {}\n\n",
            self.author(),
            revision,
            desc,
            name
        ))?;

        let current = self.repos.revision_property(revision, name)?;
        match action {
            Some(action) => {
                let old = match action {
                    PropAction::Added => "",
                    _ => self.event.stdin.as_str(),
                };
                let new = current.unwrap_or_default();
                let now = format_date(&Utc::now());
                w.write(&format!("{}: {} at {}\n", desc, name, now))?;
                let token = match action {
                    PropAction::Added => DiffToken::Add,
                    PropAction::Modified => DiffToken::Modify,
                    PropAction::Deleted => DiffToken::Delete,
                };
                self.write_property_diff(w, token, name, Some(old), Some(&new), &now)?;
            }
            None => {
                w.write("New value:")?;
                match current {
                    Some(value) => w.write(&format!("\n{}", value))?,
                    None => w.write(" (removed)\n")?,
                }
            }
        }
        w.write("\n")
    }

    fn write_lock(&self, w: &mut dyn PartWriter) -> Result<()> {
        let locked = self.event.kind == EventKind::Lock;
        w.write(&format!("Author: {}", self.author()))?;

        if locked {
            w.write("\nComment:")?;
            let comment = match self.set.changes.first() {
                Some(change) => self.repos.lock_comment(&change.path)?.unwrap_or_default(),
                None => String::new(),
            };
            let comment = comment.trim();
            if comment.is_empty() {
                w.write(" (empty)")?;
            } else {
                w.write(&format!("\n{}\n", comment))?;
            }
        }

        w.write(&format!(
            "\n{} paths:\n",
            if locked { "Locked" } else { "Unlocked" }
        ))?;
        for change in &self.set.changes {
            w.write(&format!("   {}\n", change.path))?;
        }
        w.write("\n")
    }
}

/// 按 Added / Removed / Modified 分节写路径列表
fn write_paths(w: &mut dyn PartWriter, changes: &[&Change]) -> Result<()> {
    let sections: [(&str, fn(&Change) -> bool); 3] = [
        ("Added", Change::was_added),
        ("Removed", Change::was_deleted),
        ("Modified", Change::was_modified),
    ];
    for (title, test) in sections {
        let matching: Vec<&Change> = changes.iter().copied().filter(|c| test(c)).collect();
        if matching.is_empty() {
            continue;
        }
        w.write(&format!("{}:\n", title))?;
        for change in matching {
            write_path_info(w, change)?;
        }
    }
    Ok(())
}

fn write_path_info(w: &mut dyn PartWriter, change: &Change) -> Result<()> {
    let slash = if change.is_directory { "/" } else { "" };
    w.write(&format!("    {}{}", change.path, slash))?;

    if change.has_property_changes {
        w.write("   (")?;
        if !change.was_added() || change.was_copied() {
            let contents = if change.has_content_changes {
                "contents, "
            } else {
                ""
            };
            w.write(&format!("{}props changed)", contents))?;
        } else {
            w.write("with props)")?;
        }
    }

    if let Some(source) = &change.copy_source {
        w.write("\n      - copied")?;
        if !change.is_directory {
            w.write(if change.has_content_changes {
                ", changed"
            } else {
                " unchanged"
            })?;
        }
        w.write(&format!(" from r{}, {}{}", source.revision, source.path, slash))?;
    }
    w.write("\n")
}
