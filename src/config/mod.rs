//! 配置加载 - JSON 配置文件解析为已校验的 [`Settings`]
//!
//! # 结构
//! ```json
//! {
//!   "general":  { "sendmail_command": ["/usr/sbin/sendmail"], "tempdir": "/tmp" },
//!   "defaults": { "to_addr": "commits@example.org", "long_mail_action": "100000 split/5" },
//!   "groups": [
//!     { "name": "core", "for_paths": "trunk/core/", "to_addr": ["core@example.org"] }
//!   ]
//! }
//! ```
//!
//! `defaults` 中的字段会被每个分组继承（分组自己的设置优先），
//! 同时 `defaults` 本身就是“无分组匹配”时使用的默认分组。

pub mod group;
pub mod overflow;

pub use group::{
    DiffSelection, DiffSelectionConfig, DiffToken, GroupConfig, GroupId, NonMatchingPaths,
    OutputKey, SubjectSettings,
};
pub use overflow::{OverflowMode, OverflowPolicy, OverflowScope};

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::NotifyError;

/// 默认的溢出到磁盘阈值（字节）
pub const DEFAULT_SPILL_THRESHOLD: usize = 256 * 1024;

/// 全局设置
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    /// sendmail 兼容命令
    pub sendmail_command: Option<Vec<String>>,
    /// Webhook 地址
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
    /// 调试用：所有邮件都发给这些地址
    pub debug_all_mails_to: Vec<String>,
    /// 临时文件目录
    pub tempdir: Option<PathBuf>,
    /// 单个分片超过该大小时写入临时文件
    pub spill_threshold: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            sendmail_command: None,
            webhook_url: None,
            webhook_timeout_secs: 30,
            debug_all_mails_to: Vec::new(),
            tempdir: None,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
        }
    }
}

/// 已校验的完整配置
#[derive(Debug, Clone)]
pub struct Settings {
    pub general: GeneralConfig,
    pub groups: Vec<GroupConfig>,
    /// 没有任何分组匹配时使用
    pub default_group: GroupConfig,
}

impl Settings {
    pub fn new(groups: Vec<GroupConfig>, default_group: GroupConfig) -> Self {
        Self {
            general: GeneralConfig::default(),
            groups,
            default_group,
        }
    }

    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("commit-notifier")
            .join("config.json")
    }

    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self, NotifyError> {
        let content = fs::read_to_string(path).map_err(|e| {
            NotifyError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            groups = settings.groups.len(),
            "Configuration loaded"
        );
        Ok(settings)
    }

    /// 从 JSON 字符串解析
    pub fn from_json_str(content: &str) -> Result<Self, NotifyError> {
        let raw: RawSettings = serde_json::from_str(content)
            .map_err(|e| NotifyError::config(format!("invalid configuration: {}", e)))?;
        raw.resolve()
    }

    /// 默认分组的身份，排在所有配置分组之后
    pub fn default_group_id(&self) -> GroupId {
        GroupId(self.groups.len())
    }

    pub fn group(&self, id: GroupId) -> &GroupConfig {
        self.groups.get(id.0).unwrap_or(&self.default_group)
    }
}

// ============================================================================
// 原始 JSON 结构
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    general: RawGeneral,
    #[serde(default)]
    defaults: RawGroup,
    #[serde(default)]
    groups: Vec<RawGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGeneral {
    #[serde(default, alias = "mail_command")]
    sendmail_command: Option<StringList>,
    #[serde(default)]
    webhook_url: Option<String>,
    #[serde(default)]
    webhook_timeout_secs: Option<u64>,
    #[serde(default)]
    debug_all_mails_to: Option<StringList>,
    #[serde(default)]
    tempdir: Option<PathBuf>,
    #[serde(default)]
    spill_threshold: Option<usize>,
}

/// 字符串或字符串列表；单个字符串按空白拆分
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => s.split_whitespace().map(|s| s.to_string()).collect(),
            Self::Many(v) => v,
        }
    }
}

/// 超长策略：紧凑字符串或结构化对象
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawOverflow {
    Action(String),
    Detailed(OverflowPolicy),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawGroup {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "for_repos")]
    for_repository: Option<String>,
    #[serde(default)]
    for_paths: Option<String>,
    #[serde(default)]
    exclude_paths: Option<String>,
    #[serde(default, alias = "suppress_if_match", alias = "fallback")]
    ignore_if_other_matches: Option<bool>,
    #[serde(default, alias = "nonmatching_paths", alias = "show_nongroup_paths")]
    show_nonmatching_paths: Option<String>,
    #[serde(default, alias = "long_mail_action")]
    overflow: Option<RawOverflow>,
    #[serde(default)]
    generate_diffs: Option<StringList>,
    #[serde(default, alias = "truncate_subject", alias = "subject_length")]
    max_subject_length: Option<usize>,
    #[serde(default)]
    commit_subject_template: Option<String>,
    #[serde(default)]
    propchange_subject_template: Option<String>,
    #[serde(default)]
    lock_subject_template: Option<String>,
    #[serde(default)]
    unlock_subject_template: Option<String>,
    #[serde(default)]
    commit_subject_prefix: Option<String>,
    #[serde(default)]
    propchange_subject_prefix: Option<String>,
    #[serde(default)]
    lock_subject_prefix: Option<String>,
    #[serde(default)]
    unlock_subject_prefix: Option<String>,
    #[serde(default)]
    from_addr: Option<StringList>,
    #[serde(default)]
    to_addr: Option<StringList>,
    #[serde(default, alias = "reply_to")]
    reply_to_addr: Option<String>,
    #[serde(default)]
    custom_header: Option<String>,
    #[serde(default)]
    browser_base_url: Option<String>,
    #[serde(default, alias = "diff")]
    diff_command: Option<StringList>,
    #[serde(default, alias = "x509_author")]
    extract_x509_author: Option<bool>,
}

impl RawGroup {
    /// 未设置的字段从 defaults 继承（匹配条件除外）
    fn inherit(self, defaults: &RawGroup) -> RawGroup {
        macro_rules! pick {
            ($field:ident) => {
                self.$field.or_else(|| defaults.$field.clone())
            };
        }
        RawGroup {
            name: self.name,
            for_repository: self.for_repository,
            for_paths: self.for_paths,
            exclude_paths: self.exclude_paths,
            ignore_if_other_matches: self.ignore_if_other_matches,
            show_nonmatching_paths: pick!(show_nonmatching_paths),
            overflow: pick!(overflow),
            generate_diffs: pick!(generate_diffs),
            max_subject_length: pick!(max_subject_length),
            commit_subject_template: pick!(commit_subject_template),
            propchange_subject_template: pick!(propchange_subject_template),
            lock_subject_template: pick!(lock_subject_template),
            unlock_subject_template: pick!(unlock_subject_template),
            commit_subject_prefix: pick!(commit_subject_prefix),
            propchange_subject_prefix: pick!(propchange_subject_prefix),
            lock_subject_prefix: pick!(lock_subject_prefix),
            unlock_subject_prefix: pick!(unlock_subject_prefix),
            from_addr: pick!(from_addr),
            to_addr: pick!(to_addr),
            reply_to_addr: pick!(reply_to_addr),
            custom_header: pick!(custom_header),
            browser_base_url: pick!(browser_base_url),
            diff_command: pick!(diff_command),
            extract_x509_author: pick!(extract_x509_author),
        }
    }

    fn resolve(self, fallback_name: &str) -> Result<GroupConfig, NotifyError> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let regex = |field: &str, pattern: Option<String>| -> Result<Option<Regex>, NotifyError> {
            pattern
                .map(|p| compile_prefix_regex(&p))
                .transpose()
                .map_err(|e| {
                    NotifyError::config(format!("group [{}]: invalid {} regex: {}", name, field, e))
                })
        };

        let for_repository = regex("for_repository", self.for_repository)?;
        let for_paths = regex("for_paths", self.for_paths)?;
        let exclude_paths = regex("exclude_paths", self.exclude_paths)?;

        let show_nonmatching_paths = self
            .show_nonmatching_paths
            .map(|s| s.parse::<NonMatchingPaths>())
            .transpose()
            .map_err(|e| NotifyError::config(format!("group [{}]: {}", name, e)))?
            .unwrap_or_default();

        let overflow = match self.overflow {
            None => None,
            Some(RawOverflow::Action(action)) if action.trim().is_empty() => None,
            Some(RawOverflow::Action(action)) => Some(
                action
                    .parse::<OverflowPolicy>()
                    .map_err(|e| NotifyError::config(format!("group [{}]: {}", name, e)))?,
            ),
            Some(RawOverflow::Detailed(policy)) => {
                policy
                    .validate()
                    .map_err(|e| NotifyError::config(format!("group [{}]: {}", name, e)))?;
                Some(policy)
            }
        };

        Ok(GroupConfig {
            for_repository,
            for_paths,
            exclude_paths,
            ignore_if_other_matches: self.ignore_if_other_matches.unwrap_or(false),
            show_nonmatching_paths,
            overflow,
            diffs: self
                .generate_diffs
                .map(|d| DiffSelectionConfig(d.into_vec())),
            max_subject_length: self.max_subject_length.unwrap_or(0),
            subjects: SubjectSettings {
                commit_template: self.commit_subject_template,
                propchange_template: self.propchange_subject_template,
                lock_template: self.lock_subject_template,
                unlock_template: self.unlock_subject_template,
                commit_prefix: self.commit_subject_prefix,
                propchange_prefix: self.propchange_subject_prefix,
                lock_prefix: self.lock_subject_prefix,
                unlock_prefix: self.unlock_subject_prefix,
            },
            from_addr: self.from_addr.map(StringList::into_vec).unwrap_or_default(),
            to_addr: self.to_addr.map(StringList::into_vec).unwrap_or_default(),
            reply_to_addr: self.reply_to_addr,
            custom_header: self.custom_header,
            browser_base_url: self.browser_base_url,
            diff_command: self.diff_command.map(StringList::into_vec),
            extract_x509_author: self.extract_x509_author.unwrap_or(false),
            name,
        })
    }
}

impl RawSettings {
    fn resolve(self) -> Result<Settings, NotifyError> {
        let general = GeneralConfig {
            sendmail_command: self.general.sendmail_command.map(StringList::into_vec),
            webhook_url: self.general.webhook_url,
            webhook_timeout_secs: self.general.webhook_timeout_secs.unwrap_or(30),
            debug_all_mails_to: self
                .general
                .debug_all_mails_to
                .map(StringList::into_vec)
                .unwrap_or_default(),
            tempdir: self.general.tempdir,
            spill_threshold: self
                .general
                .spill_threshold
                .unwrap_or(DEFAULT_SPILL_THRESHOLD),
        };

        let mut groups = Vec::with_capacity(self.groups.len());
        for (idx, raw) in self.groups.into_iter().enumerate() {
            let fallback = format!("group{}", idx + 1);
            if matches!(raw.name.as_deref(), Some(n) if n.trim().is_empty()) {
                return Err(NotifyError::config(format!("{}: empty group name", fallback)));
            }
            let group = raw.inherit(&self.defaults).resolve(&fallback)?;
            debug!(group = %group.name, "Group configured");
            groups.push(group);
        }

        let default_group = self.defaults.resolve("defaults")?;

        Ok(Settings {
            general,
            groups,
            default_group,
        })
    }
}

/// 编译只从开头匹配的正则
pub fn compile_prefix_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "general": { "sendmail_command": "/usr/sbin/sendmail -oi", "tempdir": "/var/tmp" },
        "defaults": {
            "to_addr": "commits@example.org",
            "long_mail_action": "1000 split/3",
            "commit_subject_prefix": "[svn]"
        },
        "groups": [
            { "name": "core", "for_paths": "trunk/core/", "to_addr": ["core@example.org"] },
            { "name": "docs", "for_paths": "trunk/docs/", "fallback": true,
              "long_mail_action": { "max_bytes": 500, "mode": "show_links_only" } }
        ]
    }"#;

    #[test]
    fn test_load_sample() {
        let settings = Settings::from_json_str(SAMPLE).unwrap();
        assert_eq!(settings.groups.len(), 2);
        assert_eq!(
            settings.general.sendmail_command,
            Some(vec!["/usr/sbin/sendmail".to_string(), "-oi".to_string()])
        );
        assert_eq!(settings.general.tempdir, Some(PathBuf::from("/var/tmp")));

        let core = &settings.groups[0];
        assert_eq!(core.name, "core");
        assert_eq!(core.to_addr, vec!["core@example.org"]);
        assert_eq!(core.subjects.commit_prefix.as_deref(), Some("[svn]"));
        assert_eq!(core.overflow.as_ref().unwrap().drop_threshold, Some(3));

        let docs = &settings.groups[1];
        assert!(docs.ignore_if_other_matches);
        assert_eq!(docs.to_addr, vec!["commits@example.org"]);
        assert_eq!(docs.overflow.as_ref().unwrap().mode, OverflowMode::ShowLinksOnly);
    }

    #[test]
    fn test_default_group_is_defaults_section() {
        let settings = Settings::from_json_str(SAMPLE).unwrap();
        assert_eq!(settings.default_group.name, "defaults");
        assert_eq!(settings.default_group_id(), GroupId(2));
        assert_eq!(settings.group(GroupId(2)).name, "defaults");
        assert_eq!(settings.group(GroupId(0)).name, "core");
    }

    #[test]
    fn test_regex_is_anchored_at_start() {
        let settings = Settings::from_json_str(SAMPLE).unwrap();
        let for_paths = settings.groups[0].for_paths.as_ref().unwrap();
        assert!(for_paths.is_match("trunk/core/main.c"));
        assert!(!for_paths.is_match("branches/trunk/core/main.c"));
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let err = Settings::from_json_str(r#"{"groups": [{"name": "x", "for_paths": "(["}]}"#)
            .unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
        assert!(err.to_string().contains("group [x]"));
    }

    #[test]
    fn test_invalid_overflow_is_config_error() {
        let err = Settings::from_json_str(
            r#"{"groups": [{"name": "x", "long_mail_action": "100 truncate/5"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn test_missing_name_gets_positional_name() {
        let settings = Settings::from_json_str(r#"{"groups": [{"for_paths": "a/"}]}"#).unwrap();
        assert_eq!(settings.groups[0].name, "group1");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, SAMPLE).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.groups.len(), 2);

        let missing = Settings::load(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(missing.exit_code(), 2);
    }
}
