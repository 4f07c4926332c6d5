//! 邮件头 - 地址汇总、调试重定向和自定义头

use chrono::Utc;

use super::channel::Envelope;
use crate::classify::{GroupSet, Substitutions};
use crate::config::GeneralConfig;

/// 一个分组集汇总后的地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addresses {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub reply_to: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: String) {
    let value = value.trim().to_string();
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

impl Addresses {
    /// 按分组顺序汇总并去重；没有发件人时用提交者
    pub fn collect(set: &GroupSet<'_>, subst: &Substitutions, author: Option<&str>) -> Self {
        let mut from = Vec::new();
        let mut to = Vec::new();
        let mut reply_to = Vec::new();

        for group in &set.groups {
            for addr in &group.config.from_addr {
                push_unique(&mut from, subst.render(group.id, addr));
            }
            for addr in &group.config.to_addr {
                push_unique(&mut to, subst.render(group.id, addr));
            }
            if let Some(addr) = &group.config.reply_to_addr {
                push_unique(&mut reply_to, subst.render(group.id, addr));
            }
        }
        if from.is_empty() {
            from.push(author.filter(|a| !a.is_empty()).unwrap_or("no_author").to_string());
        }

        Self { from, to, reply_to }
    }
}

/// 自定义头：`custom_header` 形如 "Name value"
///
/// 头名只保留 RFC 2822 允许的可打印字符（不含冒号），
/// 同名的值用 ", " 合并。
pub fn custom_headers(set: &GroupSet<'_>, subst: &Substitutions) -> Vec<(String, String)> {
    let mut headers: Vec<(String, Vec<String>)> = Vec::new();

    for group in &set.groups {
        let Some(raw) = &group.config.custom_header else {
            continue;
        };
        let rendered = subst.render(group.id, raw);
        let mut words = rendered.trim().splitn(2, char::is_whitespace);
        let Some(name) = words.next().filter(|n| !n.is_empty()) else {
            continue;
        };
        let name: String = name
            .chars()
            .filter(|c| (33..=126).contains(&(*c as u32)) && *c != ':')
            .collect();
        let name = format!("X-{}", name);
        let value = words.next().map(|v| v.trim().to_string());

        match headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.extend(value),
            None => headers.push((name, value.into_iter().collect())),
        }
    }

    headers
        .into_iter()
        .map(|(name, values)| (name, values.join(", ")))
        .collect()
}

/// 组装信封和头部
///
/// 没有收件人时信封的收件人列表为空，也不写 `To`，由调用方决定是否跳过。
pub fn compose_headers(
    set: &GroupSet<'_>,
    subst: &Substitutions,
    author: Option<&str>,
    general: &GeneralConfig,
    debug: bool,
) -> (Envelope, Vec<(String, String)>) {
    let addrs = Addresses::collect(set, subst, author);

    let mut headers = vec![
        (
            "X-Mailer".to_string(),
            format!("commit-notifier-{}", env!("CARGO_PKG_VERSION")),
        ),
        ("Date".to_string(), Utc::now().to_rfc2822()),
        ("From".to_string(), addrs.from.join(", ")),
    ];

    let recipients = if addrs.to.is_empty() || general.debug_all_mails_to.is_empty() {
        addrs.to.clone()
    } else {
        headers.push(("X-Supposed-Recipients".to_string(), addrs.to.join(", ")));
        general.debug_all_mails_to.clone()
    };
    if !recipients.is_empty() {
        headers.push(("To".to_string(), recipients.join(", ")));
    }

    if !addrs.reply_to.is_empty() {
        headers.push(("Reply-To".to_string(), addrs.reply_to.join(", ")));
    }
    if addrs.from.len() > 1 {
        headers.push(("Sender".to_string(), addrs.from[0].clone()));
    }
    headers.extend(custom_headers(set, subst));
    if debug {
        let groups: Vec<String> = set.group_names().iter().map(|g| format!("[{}]", g)).collect();
        headers.push(("X-Config-Groups".to_string(), groups.join(", ")));
    }

    let envelope = Envelope {
        sender: addrs.from[0].clone(),
        recipients,
    };
    (envelope, headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::GroupRef;
    use crate::config::{GroupConfig, GroupId};

    fn set<'a>(groups: &'a [GroupConfig]) -> GroupSet<'a> {
        GroupSet {
            groups: groups
                .iter()
                .enumerate()
                .map(|(i, config)| GroupRef {
                    id: GroupId(i),
                    config,
                })
                .collect(),
            changes: Vec::new(),
            xchanges: None,
        }
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_addresses_are_merged_and_deduplicated() {
        let mut a = GroupConfig::new("a");
        a.to_addr = vec!["commits@example.org".to_string()];
        a.from_addr = vec!["svn@example.org".to_string()];
        let mut b = GroupConfig::new("b");
        b.to_addr = vec!["commits@example.org".to_string(), "core@example.org".to_string()];
        b.from_addr = vec!["svn@example.org".to_string(), "noreply@example.org".to_string()];
        b.reply_to_addr = Some("dev@example.org".to_string());
        let groups = [a, b];

        let (envelope, headers) = compose_headers(
            &set(&groups),
            &Substitutions::new(),
            Some("alice"),
            &GeneralConfig::default(),
            false,
        );

        assert_eq!(envelope.sender, "svn@example.org");
        assert_eq!(envelope.recipients, vec!["commits@example.org", "core@example.org"]);
        assert_eq!(header(&headers, "From"), Some("svn@example.org, noreply@example.org"));
        assert_eq!(header(&headers, "Sender"), Some("svn@example.org"));
        assert_eq!(header(&headers, "Reply-To"), Some("dev@example.org"));
        assert_eq!(header(&headers, "X-Config-Groups"), None);
    }

    #[test]
    fn test_author_is_fallback_sender() {
        let mut a = GroupConfig::new("a");
        a.to_addr = vec!["commits@example.org".to_string()];
        let groups = [a];
        let (envelope, headers) = compose_headers(
            &set(&groups),
            &Substitutions::new(),
            None,
            &GeneralConfig::default(),
            true,
        );
        assert_eq!(envelope.sender, "no_author");
        assert_eq!(header(&headers, "Sender"), None);
        assert_eq!(header(&headers, "X-Config-Groups"), Some("[a]"));
    }

    #[test]
    fn test_no_recipients() {
        let groups = [GroupConfig::new("a")];
        let (envelope, headers) = compose_headers(
            &set(&groups),
            &Substitutions::new(),
            Some("alice"),
            &GeneralConfig::default(),
            false,
        );
        assert!(envelope.recipients.is_empty());
        assert_eq!(envelope.sender, "alice");
        assert_eq!(header(&headers, "To"), None);
    }

    #[test]
    fn test_debug_redirect_keeps_supposed_recipients() {
        let mut a = GroupConfig::new("a");
        a.to_addr = vec!["commits@example.org".to_string()];
        let groups = [a];
        let general = GeneralConfig {
            debug_all_mails_to: vec!["me@example.org".to_string()],
            ..Default::default()
        };
        let (envelope, headers) =
            compose_headers(&set(&groups), &Substitutions::new(), Some("alice"), &general, false);
        assert_eq!(envelope.recipients, vec!["me@example.org"]);
        assert_eq!(header(&headers, "To"), Some("me@example.org"));
        assert_eq!(header(&headers, "X-Supposed-Recipients"), Some("commits@example.org"));
    }

    #[test]
    fn test_custom_headers_are_sanitized_and_merged() {
        let mut a = GroupConfig::new("a");
        a.custom_header = Some("Team: core".to_string());
        let mut b = GroupConfig::new("b");
        b.custom_header = Some("Team docs".to_string());
        let mut c = GroupConfig::new("c");
        c.custom_header = Some("Flag".to_string());
        let groups = [a, b, c];
        let headers = custom_headers(&set(&groups), &Substitutions::new());
        assert_eq!(
            headers,
            vec![
                ("X-Team".to_string(), "core, docs".to_string()),
                ("X-Flag".to_string(), String::new()),
            ]
        );
    }
}
