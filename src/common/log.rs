//! Generation log: an append-only list of timestamped lines with section
//! headers, key-value tables, and tagged entries. Built for human review
//! and for surfacing in host UIs; always preserved, even when the
//! generation fails.

use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Section,
    Info,
    Warn,
    Error,
    Ok,
    Detail,
    Kv,
}

impl LineTag {
    fn label(self) -> &'static str {
        match self {
            LineTag::Section => "==",
            LineTag::Info => "info",
            LineTag::Warn => "warn",
            LineTag::Error => "error",
            LineTag::Ok => "ok",
            LineTag::Detail => "detail",
            LineTag::Kv => "kv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub ts_ms: i64,
    pub tag: LineTag,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct GenLog {
    lines: Vec<LogLine>,
}

impl GenLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, tag: LineTag, text: String) {
        self.lines.push(LogLine { ts_ms: Utc::now().timestamp_millis(), tag, text });
    }

    pub fn section(&mut self, title: &str) {
        self.push(LineTag::Section, title.to_string());
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(LineTag::Info, text.into());
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.push(LineTag::Warn, text.into());
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LineTag::Error, text.into());
    }

    pub fn ok(&mut self, text: impl Into<String>) {
        self.push(LineTag::Ok, text.into());
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.push(LineTag::Detail, text.into());
    }

    /// One key-value line; consecutive kv lines render as an aligned table.
    pub fn kv(&mut self, key: &str, value: impl ToString) {
        self.push(LineTag::Kv, format!("{key}\t{}", value.to_string()));
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn warn_count(&self) -> usize {
        self.lines.iter().filter(|l| l.tag == LineTag::Warn).count()
    }

    pub fn error_count(&self) -> usize {
        self.lines.iter().filter(|l| l.tag == LineTag::Error).count()
    }

    /// Render to plain text, one line per entry.
    pub fn render(&self) -> String {
        let key_width = self
            .lines
            .iter()
            .filter(|l| l.tag == LineTag::Kv)
            .filter_map(|l| l.text.split('\t').next().map(str::len))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for line in &self.lines {
            let ts = chrono::DateTime::from_timestamp_millis(line.ts_ms)
                .map(|t| t.format("%H:%M:%S%.3f").to_string())
                .unwrap_or_default();
            match line.tag {
                LineTag::Section => {
                    out.push_str(&format!("{ts} == {} ==\n", line.text));
                }
                LineTag::Kv => {
                    let (key, value) = line.text.split_once('\t').unwrap_or((line.text.as_str(), ""));
                    out.push_str(&format!("{ts}    {key:<key_width$}  {value}\n"));
                }
                tag => {
                    out.push_str(&format!("{ts} [{}] {}\n", tag.label(), line.text));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_sections_and_tags() {
        let mut log = GenLog::new();
        log.section("elevation");
        log.kv("points", 400);
        log.kv("coverage", "0.98");
        log.warn("secondary provider used");
        log.ok("done");
        let text = log.render();
        assert!(text.contains("== elevation =="));
        assert!(text.contains("[warn] secondary provider used"));
        assert!(text.contains("points"));
        assert_eq!(log.warn_count(), 1);
        assert_eq!(log.error_count(), 0);
    }
}
