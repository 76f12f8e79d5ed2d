//! Tool whitelist matching
//!
//! Pattern forms:
//! - `read` exact name
//! - `browser_*` prefix wildcard
//! - `!spawn_agent` / `!browser_*` negation, always wins over includes
//! - `*` everything
//!
//! A plain include that matches nothing exactly can optionally fall back to
//! substring containment (`memory` matches `memory_search`).

use super::registry::ToolDefinition;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Any,
    Exact(String),
    Prefix(String),
}

impl Pattern {
    fn parse(raw: &str) -> Self {
        if raw == "*" {
            Pattern::Any
        } else if let Some(prefix) = raw.strip_suffix('*') {
            Pattern::Prefix(prefix.to_string())
        } else {
            Pattern::Exact(raw.to_string())
        }
    }

    fn matches_strict(&self, name: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(exact) => name == exact,
            Pattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// Strict match of one unnegated pattern against a tool name
pub(crate) fn pattern_matches(pattern: &str, name: &str) -> bool {
    Pattern::parse(pattern.trim()).matches_strict(name)
}

/// Compiled whitelist for one agent
#[derive(Debug, Clone)]
pub struct ToolMatcher {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    substring_fallback: bool,
}

impl ToolMatcher {
    pub fn new<I, S>(patterns: I, substring_fallback: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();

        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match raw.strip_prefix('!') {
                Some(negated) if !negated.is_empty() => excludes.push(Pattern::parse(negated)),
                Some(_) => {}
                None => includes.push(Pattern::parse(raw)),
            }
        }

        Self {
            includes,
            excludes,
            substring_fallback,
        }
    }

    /// No includes, or only `*`: every tool passes the include stage.
    pub fn is_unrestricted(&self) -> bool {
        self.includes.iter().all(|p| *p == Pattern::Any)
    }

    pub fn allows(&self, name: &str) -> bool {
        if self.excludes.iter().any(|p| p.matches_strict(name)) {
            return false;
        }
        if self.is_unrestricted() {
            return true;
        }
        if self.includes.iter().any(|p| p.matches_strict(name)) {
            return true;
        }
        self.substring_fallback
            && self.includes.iter().any(|p| match p {
                Pattern::Exact(fragment) => name.contains(fragment.as_str()),
                _ => false,
            })
    }

    /// Keep the catalog entries this matcher allows, preserving order.
    pub fn filter(&self, tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        tools.into_iter().filter(|t| self.allows(&t.name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> ToolMatcher {
        ToolMatcher::new(patterns.iter().copied(), true)
    }

    #[test]
    fn test_exact_and_prefix() {
        let m = ToolMatcher::new(["read", "browser_*"], false);
        assert!(m.allows("read"));
        assert!(m.allows("browser_click"));
        assert!(!m.allows("reader"));
        assert!(!m.allows("write"));
    }

    #[test]
    fn test_negation_beats_include() {
        let m = matcher(&["browser_*", "!browser_execute_script"]);
        assert!(m.allows("browser_navigate"));
        assert!(!m.allows("browser_execute_script"));
    }

    #[test]
    fn test_star_with_exclusions() {
        let m = matcher(&["*", "!spawn_agent", "!delegate_*"]);
        assert!(m.is_unrestricted());
        assert!(m.allows("bash"));
        assert!(!m.allows("spawn_agent"));
        assert!(!m.allows("delegate_to_specialist"));
    }

    #[test]
    fn test_empty_whitelist_is_unrestricted() {
        let m = matcher(&[]);
        assert!(m.is_unrestricted());
        assert!(m.allows("anything"));
    }

    #[test]
    fn test_substring_fallback_switch() {
        assert!(matcher(&["memory"]).allows("memory_search"));
        assert!(!ToolMatcher::new(["memory"], false).allows("memory_search"));
    }

    #[test]
    fn test_exclusions_never_use_substring() {
        let m = matcher(&["*", "!spawn"]);
        assert!(m.allows("spawn_agent"));
        assert!(!m.allows("spawn"));
    }
}
