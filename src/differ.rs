//! 差异引擎 - 生成统一格式差异
//!
//! - [`InternalDiffer`]: 进程内 LCS 差异，3 行上下文
//! - [`ExternalDiffer`]: 调用配置的外部命令（例如 `diff -u`）

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

use crate::classify::substitute;

/// 上下文行数
const CONTEXT_LINES: usize = 3;

/// 超过该规模的中间段不再做 LCS，整体视为替换
const LCS_CELL_LIMIT: usize = 4_000_000;

/// 差异两侧的标签
#[derive(Debug, Clone, Default)]
pub struct DiffLabels {
    pub label_from: String,
    pub label_to: String,
    pub date_from: String,
    pub date_to: String,
}

impl DiffLabels {
    pub fn new(label_from: impl Into<String>, label_to: impl Into<String>) -> Self {
        Self {
            label_from: label_from.into(),
            label_to: label_to.into(),
            ..Default::default()
        }
    }

    pub fn with_dates(mut self, date_from: impl Into<String>, date_to: impl Into<String>) -> Self {
        self.date_from = date_from.into();
        self.date_to = date_to.into();
        self
    }
}

/// 差异引擎接口
///
/// 返回渲染好的差异行，行尾可能没有换行符。两侧都为空时返回空列表。
pub trait Differ {
    fn diff(&self, old: &[u8], new: &[u8], labels: &DiffLabels) -> Result<Vec<String>>;
}

/// 根据组配置选择差异引擎
pub fn differ_for(command: Option<&[String]>, tempdir: Option<PathBuf>) -> Box<dyn Differ> {
    match command {
        Some(cmd) if !cmd.is_empty() => Box::new(ExternalDiffer::new(cmd.to_vec(), tempdir)),
        _ => Box::new(InternalDiffer),
    }
}

// ============================================================================
// 进程内差异
// ============================================================================

/// 进程内统一差异
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalDiffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

impl Differ for InternalDiffer {
    fn diff(&self, old: &[u8], new: &[u8], labels: &DiffLabels) -> Result<Vec<String>> {
        let old = String::from_utf8_lossy(old);
        let new = String::from_utf8_lossy(new);
        let a: Vec<&str> = old.split_inclusive('\n').collect();
        let b: Vec<&str> = new.split_inclusive('\n').collect();
        Ok(unified_diff(&a, &b, labels))
    }
}

/// 生成统一格式差异行
fn unified_diff(a: &[&str], b: &[&str], labels: &DiffLabels) -> Vec<String> {
    let mut out = Vec::new();
    for group in grouped_opcodes(&opcodes(a, b), CONTEXT_LINES) {
        if out.is_empty() {
            out.push(header_line("---", &labels.label_from, &labels.date_from));
            out.push(header_line("+++", &labels.label_to, &labels.date_to));
        }
        let first = group[0];
        let last = group[group.len() - 1];
        out.push(format!(
            "@@ -{} +{} @@\n",
            format_range(first.i1, last.i2),
            format_range(first.j1, last.j2)
        ));
        for op in &group {
            if op.tag == Tag::Equal {
                out.extend(a[op.i1..op.i2].iter().map(|l| format!(" {}", l)));
                continue;
            }
            if matches!(op.tag, Tag::Replace | Tag::Delete) {
                out.extend(a[op.i1..op.i2].iter().map(|l| format!("-{}", l)));
            }
            if matches!(op.tag, Tag::Replace | Tag::Insert) {
                out.extend(b[op.j1..op.j2].iter().map(|l| format!("+{}", l)));
            }
        }
    }
    out
}

fn header_line(marker: &str, label: &str, date: &str) -> String {
    if date.is_empty() {
        format!("{} {}\n", marker, label)
    } else {
        format!("{} {}\t{}\n", marker, label, date)
    }
}

fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

/// 计算编辑操作序列
fn opcodes(a: &[&str], b: &[&str]) -> Vec<Opcode> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    // 去掉公共前后缀，只对中间段求 LCS
    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];
    let pairs = lcs_pairs(mid_a, mid_b);

    let mut ops = Vec::new();
    let mut push = |tag: Tag, i1: usize, i2: usize, j1: usize, j2: usize| {
        if i1 == i2 && j1 == j2 {
            return;
        }
        ops.push(Opcode { tag, i1, i2, j1, j2 });
    };

    push(Tag::Equal, 0, prefix, 0, prefix);
    let (mut i, mut j) = (0, 0);
    let mut k = 0;
    while k < pairs.len() {
        let (pi, pj) = pairs[k];
        push(change_tag(pi - i, pj - j), prefix + i, prefix + pi, prefix + j, prefix + pj);
        // 连续相同的行合并成一个 Equal
        let mut run = 1;
        while k + run < pairs.len() && pairs[k + run] == (pi + run, pj + run) {
            run += 1;
        }
        push(Tag::Equal, prefix + pi, prefix + pi + run, prefix + pj, prefix + pj + run);
        i = pi + run;
        j = pj + run;
        k += run;
    }
    push(
        change_tag(mid_a.len() - i, mid_b.len() - j),
        prefix + i,
        prefix + mid_a.len(),
        prefix + j,
        prefix + mid_b.len(),
    );
    push(Tag::Equal, a.len() - suffix, a.len(), b.len() - suffix, b.len());
    ops
}

fn change_tag(deleted: usize, inserted: usize) -> Tag {
    match (deleted > 0, inserted > 0) {
        (true, true) => Tag::Replace,
        (true, false) => Tag::Delete,
        _ => Tag::Insert,
    }
}

/// 最长公共子序列的行号对
fn lcs_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 || n.saturating_mul(m) > LCS_CELL_LIMIT {
        return Vec::new();
    }

    // table[i][j] = a[i..] 与 b[j..] 的 LCS 长度
    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// 按上下文把操作分成若干 hunk
fn grouped_opcodes(codes: &[Opcode], n: usize) -> Vec<Vec<Opcode>> {
    let mut codes: Vec<Opcode> = codes.to_vec();
    if codes.is_empty() || codes.iter().all(|c| c.tag == Tag::Equal) {
        return Vec::new();
    }

    if let Some(first) = codes.first_mut() {
        if first.tag == Tag::Equal {
            first.i1 = first.i1.max(first.i2.saturating_sub(n));
            first.j1 = first.j1.max(first.j2.saturating_sub(n));
        }
    }
    if let Some(last) = codes.last_mut() {
        if last.tag == Tag::Equal {
            last.i2 = last.i2.min(last.i1 + n);
            last.j2 = last.j2.min(last.j1 + n);
        }
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for mut code in codes {
        if code.tag == Tag::Equal && code.i2 - code.i1 > 2 * n {
            group.push(Opcode {
                i2: code.i2.min(code.i1 + n),
                j2: code.j2.min(code.j1 + n),
                ..code
            });
            groups.push(std::mem::take(&mut group));
            code.i1 = code.i1.max(code.i2.saturating_sub(n));
            code.j1 = code.j1.max(code.j2.saturating_sub(n));
        }
        group.push(code);
    }
    if !(group.is_empty() || (group.len() == 1 && group[0].tag == Tag::Equal)) {
        groups.push(group);
    }
    groups
}

// ============================================================================
// 外部差异命令
// ============================================================================

/// 调用外部差异程序
///
/// 参数中的 `%(label_from)s` / `%(label_to)s` / `%(from)s` / `%(to)s`
/// 会被替换；内容通过临时文件传入。
#[derive(Debug, Clone)]
pub struct ExternalDiffer {
    command: Vec<String>,
    tempdir: Option<PathBuf>,
}

impl ExternalDiffer {
    pub fn new(command: Vec<String>, tempdir: Option<PathBuf>) -> Self {
        Self { command, tempdir }
    }

    fn temp_file(&self, content: &[u8]) -> Result<tempfile::NamedTempFile> {
        let mut file = match &self.tempdir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new(),
        }
        .context("Failed to create temporary diff file")?;
        file.write_all(content)?;
        file.flush()?;
        Ok(file)
    }
}

impl Differ for ExternalDiffer {
    fn diff(&self, old: &[u8], new: &[u8], labels: &DiffLabels) -> Result<Vec<String>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("Empty diff command"))?;

        let file_from = self.temp_file(old)?;
        let file_to = self.temp_file(new)?;

        let mut params = BTreeMap::new();
        params.insert(
            "label_from".to_string(),
            format!("{} {}", labels.label_from, labels.date_from),
        );
        params.insert(
            "label_to".to_string(),
            format!("{} {}", labels.label_to, labels.date_to),
        );
        params.insert("from".to_string(), file_from.path().display().to_string());
        params.insert("to".to_string(), file_to.path().display().to_string());

        let args: Vec<String> = args.iter().map(|a| substitute(a, &params)).collect();
        debug!(program = %program, "Running external diff");

        let output = Command::new(program)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run diff command {}", program))?;

        // diff 约定：0 相同，1 有差异，其他为错误
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                return Err(anyhow!(
                    "Diff command {} failed ({}): {}",
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ))
            }
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.split_inclusive('\n').map(|l| l.to_string()).collect())
    }
}
