use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Only first-party sources are policed. Anything else under the package root
// (vendored data, reference material, build output) is left alone.
const SOURCE_DIRS: [&str; 4] = ["analysis", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

/// The source rules enforced at build time.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenCommentWord,
    ShoutingComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> String {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Rule::ForbiddenCommentWord => {
                format!(r"//.*\b(?:{})\b", FORBIDDEN_WORDS.join("|"))
            }
            Rule::ShoutingComment => r"//.*".to_string(),
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn description(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => "underscore-prefixed identifiers",
            Rule::ForbiddenCommentWord => "comments narrating edits (FIX, NEW, CHANGE, UPDATE, ...)",
            Rule::ShoutingComment => "comments written entirely in uppercase",
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    /// Second-stage filter on a line the regex already matched.
    fn applies_to(self, line: &str) -> bool {
        match self {
            Rule::UnderscorePrefix => !is_comment(line) && !underscore_only_in_strings(line),
            Rule::ForbiddenCommentWord | Rule::AllowDeadCode => true,
            Rule::ShoutingComment => comment_text(line).is_some_and(|text| {
                let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
            }),
        }
    }
}

// Collects every offending line of one file for a single rule.
struct RuleCollector {
    rule: Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl RuleCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.description(),
            self.file_path.display()
        );
        for violation in &self.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str("\n⚠️ These patterns are not allowed in this project. Remove them before committing.\n");
        Some(message)
    }
}

impl Sink for RuleCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.applies_to(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let body = trimmed
        .strip_prefix("///")
        .or_else(|| trimmed.strip_prefix("//!"))
        .or_else(|| trimmed.strip_prefix("//"))?;
    Some(body.trim())
}

// Odd-numbered segments between double quotes are string contents.
fn underscore_only_in_strings(line: &str) -> bool {
    line.contains('"')
        && line
            .split('"')
            .enumerate()
            .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn enforce(rule: Rule) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
    let mut searcher = Searcher::new();
    for path in rust_sources() {
        let mut collector = RuleCollector::new(rule, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(message) = collector.error_message() {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    for rule in [
        Rule::UnderscorePrefix,
        Rule::ForbiddenCommentWord,
        Rule::ShoutingComment,
        Rule::AllowDeadCode,
    ] {
        if let Err(e) = enforce(rule) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
