//! 分组配置 - 一条通知规则（匹配条件 + 模板 + 超长策略）

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::overflow::OverflowPolicy;
use crate::event::{Change, EventKind};

/// 分组在一次运行中的身份（配置中的位置）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

/// 不匹配路径的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonMatchingPaths {
    /// 列出其他区域的变更
    Yes,
    /// 只提示有其他变更
    #[default]
    No,
    /// 什么也不写
    Ignore,
}

impl FromStr for NonMatchingPaths {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(Self::Yes),
            "no" | "false" | "off" | "0" => Ok(Self::No),
            "ignore" => Ok(Self::Ignore),
            other => anyhow::bail!("invalid non-matching paths token {:?}", other),
        }
    }
}

/// 差异生成开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffToken {
    Add,
    Delete,
    Copy,
    Modify,
    PropChange,
}

impl DiffToken {
    pub const ALL: [DiffToken; 5] = [
        DiffToken::Add,
        DiffToken::Delete,
        DiffToken::Copy,
        DiffToken::Modify,
        DiffToken::PropChange,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "add" => Some(Self::Add),
            "delete" => Some(Self::Delete),
            "copy" => Some(Self::Copy),
            "modify" => Some(Self::Modify),
            "propchange" => Some(Self::PropChange),
            _ => None,
        }
    }

    /// 该变更是否可按此开关生成差异
    pub fn matches(&self, change: &Change) -> bool {
        match self {
            Self::Add => change.was_added() && !change.was_copied() && !change.is_directory,
            Self::Delete => change.was_deleted() && !change.is_directory,
            Self::Copy => change.was_copied() && change.has_content_changes,
            Self::Modify => change.was_modified() && change.has_content_changes,
            Self::PropChange => change.has_property_changes,
        }
    }
}

/// 已解析的差异开关集合
///
/// 未配置时全部启用；显式配置为空（或 `none`）时全部关闭；
/// 只包含未知值时视为笔误，全部启用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSelection {
    tokens: Vec<DiffToken>,
}

impl DiffSelection {
    pub fn all() -> Self {
        Self {
            tokens: DiffToken::ALL.to_vec(),
        }
    }

    pub fn none() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn from_config(configured: Option<&[String]>) -> Self {
        let Some(raw) = configured else {
            return Self::all();
        };
        let words: Vec<String> = raw
            .iter()
            .flat_map(|w| w.split(|c: char| c.is_whitespace() || c == ','))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return Self::none();
        }

        let known_none = words.iter().any(|w| w == "none");
        let tokens: Vec<DiffToken> = DiffToken::ALL
            .iter()
            .copied()
            .filter(|t| words.iter().any(|w| DiffToken::from_token(w) == Some(*t)))
            .collect();

        if tokens.is_empty() && !known_none {
            Self::all()
        } else {
            Self { tokens }
        }
    }

    pub fn contains(&self, token: DiffToken) -> bool {
        self.tokens.contains(&token)
    }

    pub fn tokens(&self) -> &[DiffToken] {
        &self.tokens
    }

    /// 按配置顺序找到第一个适用的开关
    pub fn first_match(&self, change: &Change) -> Option<DiffToken> {
        self.tokens.iter().copied().find(|t| t.matches(change))
    }
}

/// 各事件类型的主题模板和前缀
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubjectSettings {
    #[serde(default)]
    pub commit_template: Option<String>,
    #[serde(default)]
    pub propchange_template: Option<String>,
    #[serde(default)]
    pub lock_template: Option<String>,
    #[serde(default)]
    pub unlock_template: Option<String>,
    #[serde(default)]
    pub commit_prefix: Option<String>,
    #[serde(default)]
    pub propchange_prefix: Option<String>,
    #[serde(default)]
    pub lock_prefix: Option<String>,
    #[serde(default)]
    pub unlock_prefix: Option<String>,
}

impl SubjectSettings {
    pub const COMMIT_TEMPLATE: &'static str = "%(prefix)s r%(revision)s %(part)s - %(files/dirs)s";
    pub const PROPCHANGE_TEMPLATE: &'static str = "%(prefix)s r%(revision)s - %(property)s";
    pub const LOCK_TEMPLATE: &'static str = "%(prefix)s %(files/dirs)s";
    pub const UNLOCK_TEMPLATE: &'static str = "%(prefix)s %(files/dirs)s";

    pub fn template_for(&self, kind: &EventKind) -> &str {
        let (configured, default) = match kind {
            EventKind::Commit => (&self.commit_template, Self::COMMIT_TEMPLATE),
            EventKind::PropChange { .. } => (&self.propchange_template, Self::PROPCHANGE_TEMPLATE),
            EventKind::Lock => (&self.lock_template, Self::LOCK_TEMPLATE),
            EventKind::Unlock => (&self.unlock_template, Self::UNLOCK_TEMPLATE),
        };
        configured.as_deref().unwrap_or(default)
    }

    pub fn prefix_for(&self, kind: &EventKind) -> Option<&str> {
        match kind {
            EventKind::Commit => self.commit_prefix.as_deref(),
            EventKind::PropChange { .. } => self.propchange_prefix.as_deref(),
            EventKind::Lock => self.lock_prefix.as_deref(),
            EventKind::Unlock => self.unlock_prefix.as_deref(),
        }
    }
}

/// 一条已解析的分组配置
///
/// 启动时加载一次，运行期间不修改。按变更计算的替换表
/// 存在旁路表 [`crate::classify::Substitutions`] 里，不挂在配置上。
#[derive(Debug, Clone, Default)]
pub struct GroupConfig {
    pub name: String,
    pub for_repository: Option<Regex>,
    pub for_paths: Option<Regex>,
    pub exclude_paths: Option<Regex>,
    pub ignore_if_other_matches: bool,
    pub show_nonmatching_paths: NonMatchingPaths,
    pub overflow: Option<OverflowPolicy>,
    pub diffs: Option<DiffSelectionConfig>,
    pub max_subject_length: usize,
    pub subjects: SubjectSettings,
    pub from_addr: Vec<String>,
    pub to_addr: Vec<String>,
    pub reply_to_addr: Option<String>,
    pub custom_header: Option<String>,
    pub browser_base_url: Option<String>,
    pub diff_command: Option<Vec<String>>,
    pub extract_x509_author: bool,
}

/// 原始 `generate_diffs` 配置，保留以便比较
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffSelectionConfig(pub Vec<String>);

/// 参与“输出是否相同”比较的字段
///
/// 不包含：名称、三个匹配正则、`ignore_if_other_matches`，
/// 以及不可比较字段（收件人、发件人、自定义头）。这些字段的差异
/// 不会影响渲染出的正文，合并后的地址会被汇总到同一封通知里。
///
/// 模板类字段按填充后的值比较；主题模板还含有替换表之外的占位符
/// （`%(files/dirs)s`、`%(part)s`），所以同时比较原文和填充值。
#[derive(Debug, PartialEq, Eq)]
pub struct OutputKey<'a> {
    show_nonmatching_paths: NonMatchingPaths,
    overflow: &'a Option<OverflowPolicy>,
    diffs: &'a Option<DiffSelectionConfig>,
    max_subject_length: usize,
    subject_templates: Vec<Option<(&'a str, String)>>,
    subject_prefixes: Vec<Option<String>>,
    reply_to_addr: Option<String>,
    browser_base_url: Option<String>,
    diff_command: &'a Option<Vec<String>>,
    extract_x509_author: bool,
}

impl GroupConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 输出比较键；`fill` 用本分组的替换表填充模板
    pub fn output_key(&self, fill: &dyn Fn(&str) -> String) -> OutputKey<'_> {
        let subjects = &self.subjects;
        let templates = [
            &subjects.commit_template,
            &subjects.propchange_template,
            &subjects.lock_template,
            &subjects.unlock_template,
        ];
        let prefixes = [
            &subjects.commit_prefix,
            &subjects.propchange_prefix,
            &subjects.lock_prefix,
            &subjects.unlock_prefix,
        ];

        OutputKey {
            show_nonmatching_paths: self.show_nonmatching_paths,
            overflow: &self.overflow,
            diffs: &self.diffs,
            max_subject_length: self.max_subject_length,
            subject_templates: templates
                .iter()
                .map(|t| t.as_deref().map(|t| (t, fill(t))))
                .collect(),
            subject_prefixes: prefixes.iter().map(|p| p.as_deref().map(fill)).collect(),
            reply_to_addr: self.reply_to_addr.as_deref().map(fill),
            browser_base_url: self.browser_base_url.as_deref().map(fill),
            diff_command: &self.diff_command,
            extract_x509_author: self.extract_x509_author,
        }
    }

    /// 解析后的差异开关
    pub fn diff_selection(&self) -> DiffSelection {
        DiffSelection::from_config(self.diffs.as_ref().map(|d| d.0.as_slice()))
    }
}
