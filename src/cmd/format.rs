/*!
format.rs

Terminal formatting for the human output paths of `ai`.

  - StyleOptions::detect() decides color/emoji/width once per command
    (NO_COLOR, NO_EMOJI, COLUMNS; color is also off when stdout is piped).
  - color(role, text, &style) wraps text in an ANSI role color.
  - table(headers, rows, TableOpts, &style) renders aligned columns.
  - section_rule(title, elapsed, &style) is the `━━━ alias (1.2s) ━━━`
    header used between fan-out answers.

Helpers return strings; they never print. JSON-mode answers bypass this
module entirely.
*/

use std::borrow::Cow;
use std::io::IsTerminal;
use std::time::Duration;

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::detect()
    }
}

impl StyleOptions {
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some();
        let no_emoji = std::env::var_os("NO_EMOJI").is_some();

        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);

        StyleOptions {
            use_color: !no_color && std::io::stdout().is_terminal(),
            use_emoji: !no_emoji && std::io::stdout().is_terminal(),
            term_width: width,
        }
    }

    /// No color, no emoji, default width.
    #[cfg(test)]
    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width: 100,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Color / Emoji                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Accent,
    Success,
    Warning,
    Error,
    Dim,
    Bold,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "1;36",       // bold cyan
        Role::Secondary => "38;5;245", // gray
        Role::Accent => "38;5;213",    // magenta/pink
        Role::Success => "38;5;82",    // green
        Role::Warning => "38;5;214",   // orange
        Role::Error => "38;5;196",     // red
        Role::Dim => "2",
        Role::Bold => "1",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "success" => "✔ ",
        "warn" => "⚠ ",
        _ => "",
    }
}

/* -------------------------------------------------------------------------- */
/* Section rule                                                               */
/* -------------------------------------------------------------------------- */

/// `1.2s` style elapsed time.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

/// Header printed above each answer of a multi-model run.
pub fn section_rule(title: &str, elapsed: Duration, style: &StyleOptions) -> String {
    let rule = "━━━";
    let time = color(
        Role::Secondary,
        format!("({})", format_elapsed(elapsed)),
        style,
    );
    format!(
        "{} {time} {}",
        color(Role::Primary, format!("{rule} {title}"), style),
        color(Role::Primary, rule, style)
    )
}

/* -------------------------------------------------------------------------- */
/* Table Rendering                                                            */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct TableOpts {
    pub max_width: usize,
    pub truncate: bool,
    pub header_sep: bool,
    pub min_col_width: usize,
}

impl Default for TableOpts {
    fn default() -> Self {
        Self {
            max_width: 0, // 0 -> style.term_width
            truncate: true,
            header_sep: true,
            min_col_width: 2,
        }
    }
}

pub fn table(
    headers: &[&str],
    rows: &[Vec<String>],
    opts: TableOpts,
    style: &StyleOptions,
) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let col_count = headers.len();
    let width_limit = if opts.max_width == 0 {
        style.term_width
    } else {
        opts.max_width.min(style.term_width)
    };

    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    // shrink the widest columns first
    let total_raw: usize = widths.iter().sum::<usize>() + (col_count - 1) * 2;
    if total_raw > width_limit {
        let mut overflow = total_raw - width_limit;
        let mut ordered: Vec<(usize, usize)> = widths.iter().copied().enumerate().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));
        for (idx, _) in ordered {
            if overflow == 0 {
                break;
            }
            if widths[idx] > opts.min_col_width {
                let shrink = (widths[idx] - opts.min_col_width).min(overflow);
                widths[idx] -= shrink;
                overflow -= shrink;
            }
        }
    }

    let mut lines: Vec<String> = Vec::with_capacity(rows.len() + 2);

    let header: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| color(Role::Accent, pad_or_truncate(h, widths[i], opts.truncate), style))
        .collect();
    lines.push(header.join("  ").trim_end().to_string());

    if opts.header_sep {
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        lines.push(color(Role::Dim, sep.join("  "), style));
    }

    for row in rows {
        let cells: Vec<String> = (0..col_count)
            .map(|c| {
                let raw = row.get(c).map(String::as_str).unwrap_or("");
                pad_or_truncate(raw, widths[c], opts.truncate)
            })
            .collect();
        lines.push(cells.join("  ").trim_end().to_string());
    }

    lines.join("\n")
}

fn pad_or_truncate(s: &str, width: usize, truncate: bool) -> String {
    let len = display_width(s);
    if len == width {
        return s.to_string();
    }
    if len < width {
        return format!("{s}{}", " ".repeat(width - len));
    }
    if !truncate {
        return s.to_string();
    }
    truncate_ellipsis(&strip_ansi(s), width)
}

/* -------------------------------------------------------------------------- */
/* Text Helpers                                                               */
/* -------------------------------------------------------------------------- */

pub fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 1 {
        return "…".into();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// Remove CSI escape sequences (ESC '[' ... letter).
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut buf = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        buf.push(ch);
    }
    Cow::Owned(buf)
}

pub fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_columns() {
        let style = StyleOptions::plain();
        let t = table(
            &["ID", "Model"],
            &[
                vec!["A1B".into(), "sonnet".into()],
                vec!["Z9Q".into(), "flash-2.5".into()],
            ],
            TableOpts::default(),
            &style,
        );
        let lines: Vec<&str> = t.lines().collect();
        assert_eq!(lines[0], "ID   Model");
        assert_eq!(lines[1], "---  ---------");
        assert_eq!(lines[3], "Z9Q  flash-2.5");
    }

    #[test]
    fn table_shrinks_to_width() {
        let style = StyleOptions {
            term_width: 20,
            ..StyleOptions::plain()
        };
        let t = table(
            &["A", "B"],
            &[vec!["x".into(), "a very long description text".into()]],
            TableOpts::default(),
            &style,
        );
        assert!(t.lines().all(|l| display_width(l) <= 20));
        assert!(t.contains('…'));
    }

    #[test]
    fn truncate() {
        assert_eq!(truncate_ellipsis("abcdef", 4), "abc…");
        assert_eq!(truncate_ellipsis("abc", 4), "abc");
    }

    #[test]
    fn strip_ansi_removes_color() {
        assert_eq!(strip_ansi("\x1b[31mRED\x1b[0m"), "RED");
        let style = StyleOptions {
            use_color: true,
            ..StyleOptions::plain()
        };
        assert_eq!(display_width(&color(Role::Error, "ok", &style)), 2);
    }

    #[test]
    fn section_rule_plain() {
        let rule = section_rule("sonnet", Duration::from_millis(1234), &StyleOptions::plain());
        assert_eq!(rule, "━━━ sonnet (1.2s) ━━━");
    }
}
