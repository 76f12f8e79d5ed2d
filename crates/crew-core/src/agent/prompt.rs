//! System prompt assembly

use crate::tools::ToolDefinition;

/// Sections joined by blank lines; empty sections are skipped.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    sections: Vec<String>,
}

impl PromptBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        let mut builder = Self::default();
        builder.push(base.into());
        builder
    }

    fn push(&mut self, section: String) {
        let trimmed = section.trim();
        if !trimmed.is_empty() {
            self.sections.push(trimmed.to_string());
        }
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.push(section.into());
        self
    }

    pub fn section_opt(mut self, section: Option<impl Into<String>>) -> Self {
        if let Some(section) = section {
            self.push(section.into());
        }
        self
    }

    pub fn titled(self, title: &str, body: Option<&str>) -> Self {
        match body.map(str::trim).filter(|b| !b.is_empty()) {
            Some(body) => self.section(format!("## {}\n{}", title, body)),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

/// One line per tool: `- name: description`
pub fn tool_summary(tools: &[ToolDefinition]) -> Option<String> {
    if tools.is_empty() {
        return None;
    }
    let lines: Vec<_> = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect();
    Some(format!("## Available Tools\n{}", lines.join("\n")))
}
