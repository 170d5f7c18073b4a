//! File selection rules (`{ glob, rename?, keep_path? }`).
//!
//! A glob containing `/` is matched against the whole relative path;
//! otherwise it is matched against the file name alone. The first matching
//! rule decides the output name: `rename` if set, the relative path when
//! `keep_path` is true, else the bare file name.

use std::fs;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use thiserror::Error;
use vcdn_schema::FileRule;
use walkdir::WalkDir;

use crate::archive::{ArchiveEntry, to_slash};
use crate::artifact::{ArtifactSet, DuplicateName};

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid glob '{glob}': {reason}")]
    Pattern { glob: String, reason: String },

    #[error(transparent)]
    Duplicate(#[from] DuplicateName),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pattern: Pattern,
    whole_path: bool,
    rename: Option<String>,
    keep_path: bool,
}

impl CompiledRule {
    /// Output name for `relative` if this rule selects it.
    pub fn output_name(&self, relative: &str) -> Option<String> {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        let subject = if self.whole_path { relative } else { file_name };
        if !self.pattern.matches_with(subject, MATCH) {
            return None;
        }
        Some(match &self.rename {
            Some(rename) => rename.clone(),
            None if self.keep_path => relative.to_string(),
            None => file_name.to_string(),
        })
    }
}

pub fn compile(rules: &[FileRule]) -> Result<Vec<CompiledRule>, RuleError> {
    rules
        .iter()
        .map(|rule| {
            let pattern = Pattern::new(&rule.glob).map_err(|e| RuleError::Pattern {
                glob: rule.glob.clone(),
                reason: e.msg.to_string(),
            })?;
            Ok(CompiledRule {
                pattern,
                whole_path: rule.glob.contains('/'),
                rename: rule.rename.clone(),
                keep_path: rule.keep_path,
            })
        })
        .collect()
}

fn first_match(rules: &[CompiledRule], relative: &str) -> Option<String> {
    rules.iter().find_map(|r| r.output_name(relative))
}

/// Select archive entries by `rules`, in archive order.
pub fn select_entries(
    rules: &[CompiledRule],
    entries: Vec<ArchiveEntry>,
) -> Result<ArtifactSet, RuleError> {
    let mut set = ArtifactSet::new();
    for entry in entries {
        if let Some(name) = first_match(rules, &entry.name) {
            set.push(name, entry.bytes)?;
        }
    }
    Ok(set)
}

/// Select files under `root` by `rules`. Walk order is sorted by name and
/// `.git` is never entered.
pub fn collect_tree(rules: &[CompiledRule], root: &Path) -> Result<ArtifactSet, RuleError> {
    let mut set = ArtifactSet::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = to_slash(relative);
        if let Some(name) = first_match(rules, &relative) {
            set.push(name, fs::read(entry.path())?)?;
        }
    }
    Ok(set)
}
