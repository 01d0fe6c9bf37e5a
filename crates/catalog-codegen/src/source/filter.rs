//! Allow-list / deny-list table filtering.

use crate::config::TableFilterConfig;

/// Compiled table filter. Patterns support `*` and `?`.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl TableFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Admit every table.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether `table` passes. Deny wins over allow.
    pub fn matches(&self, table: &str) -> bool {
        if self.exclude.iter().any(|p| glob_match(p, table)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| glob_match(p, table))
    }

    /// Keep matching names in their original order.
    pub fn apply<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter(|n| self.matches(n))
            .cloned()
            .collect()
    }
}

impl From<&TableFilterConfig> for TableFilter {
    fn from(cfg: &TableFilterConfig) -> Self {
        Self::new(cfg.include.clone(), cfg.exclude.clone())
    }
}

/// Case-sensitive glob match with `*` (any run) and `?` (one char).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            // backtrack: let the last star absorb one more char
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
