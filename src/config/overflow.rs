//! 超长通知处理策略
//!
//! 紧凑写法：`<maxbytes> <mode>[/truncate][/<drop>] [revprop-changes] [locks]`
//! - mode: `truncate` | `showurls` | `split`
//! - `/truncate` 只能与 `showurls` 或 `split` 组合
//! - `/<drop>` 只能与 `split` 组合

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::event::EventKind;

/// 超长时的基本处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    /// 超过上限后截断
    Truncate,
    /// 只保留动作行和差异链接
    #[serde(alias = "showurls")]
    ShowLinksOnly,
    /// 拆分成多封
    Split,
}

impl OverflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Truncate => "truncate",
            Self::ShowLinksOnly => "showurls",
            Self::Split => "split",
        }
    }
}

/// 提交之外还适用的事件范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowScope {
    #[serde(rename = "revprop-changes", alias = "revprop")]
    RevProp,
    Locks,
}

impl OverflowScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RevProp => "revprop-changes",
            Self::Locks => "locks",
        }
    }
}

/// 超长通知处理策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowPolicy {
    /// 0 表示不限制
    pub max_bytes: usize,
    pub mode: OverflowMode,
    /// 仅在 ShowLinksOnly / Split 下生效
    #[serde(default)]
    pub truncate_submode: bool,
    /// 仅在 Split 下生效
    #[serde(default)]
    pub drop_threshold: Option<usize>,
    #[serde(default)]
    pub scope: BTreeSet<OverflowScope>,
}

impl OverflowPolicy {
    pub fn new(max_bytes: usize, mode: OverflowMode) -> Self {
        Self {
            max_bytes,
            mode,
            truncate_submode: false,
            drop_threshold: None,
            scope: BTreeSet::new(),
        }
    }

    pub fn with_truncate(mut self) -> Self {
        self.truncate_submode = true;
        self
    }

    pub fn with_drop_threshold(mut self, threshold: usize) -> Self {
        self.drop_threshold = Some(threshold);
        self
    }

    pub fn with_scope(mut self, scope: OverflowScope) -> Self {
        self.scope.insert(scope);
        self
    }

    /// 校验子模式组合是否合法
    pub fn validate(&self) -> Result<()> {
        if self.truncate_submode && self.mode == OverflowMode::Truncate {
            bail!("'/truncate' can only be combined with showurls or split");
        }
        if self.drop_threshold.is_some() && self.mode != OverflowMode::Split {
            bail!("a drop threshold can only be combined with split");
        }
        if self.drop_threshold == Some(0) {
            bail!("the drop threshold must be greater than zero");
        }
        Ok(())
    }

    /// 该事件是否需要限制大小
    pub fn applies_to(&self, kind: &EventKind) -> bool {
        if self.max_bytes == 0 {
            return false;
        }
        match kind {
            EventKind::Commit => true,
            EventKind::PropChange { .. } => self.scope.contains(&OverflowScope::RevProp),
            EventKind::Lock | EventKind::Unlock => self.scope.contains(&OverflowScope::Locks),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = anyhow::Error;

    fn from_str(action: &str) -> Result<Self> {
        let invalid = || anyhow!("Can't parse overflow action {:?}", action);

        let words: Vec<&str> = action.split_whitespace().collect();
        if words.len() < 2 {
            return Err(invalid());
        }

        let max_bytes: usize = words[0].parse().map_err(|_| invalid())?;
        let lowered = words[1].to_lowercase();
        let mut tokens = lowered.split('/');

        let mode = match tokens.next() {
            Some("truncate") => OverflowMode::Truncate,
            Some("showurls") | Some("showlinks") => OverflowMode::ShowLinksOnly,
            Some("split") => OverflowMode::Split,
            _ => return Err(invalid()),
        };
        let mut policy = OverflowPolicy::new(max_bytes, mode);

        let mut rest: Vec<&str> = tokens.collect();
        if rest.first() == Some(&"truncate") {
            policy.truncate_submode = true;
            rest.remove(0);
        }
        if let Some(drop) = rest.first() {
            policy.drop_threshold = Some(drop.parse().map_err(|_| invalid())?);
            rest.remove(0);
        }
        if !rest.is_empty() {
            return Err(invalid());
        }

        for word in &words[2..] {
            let scope = match word.to_lowercase().as_str() {
                "revprop-changes" => OverflowScope::RevProp,
                "locks" => OverflowScope::Locks,
                _ => return Err(invalid()),
            };
            policy.scope.insert(scope);
        }

        policy.validate().map_err(|e| anyhow!("{}: {}", invalid(), e))?;
        Ok(policy)
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.max_bytes, self.mode.as_str())?;
        if self.truncate_submode {
            write!(f, "/truncate")?;
        }
        if let Some(drop) = self.drop_threshold {
            write!(f, "/{}", drop)?;
        }
        for scope in &self.scope {
            write!(f, " {}", scope.as_str())?;
        }
        Ok(())
    }
}
