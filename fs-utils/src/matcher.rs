//! Glob compilation and path matching.
//!
//! A glob list such as `["*.js", "!test.js"]` compiles into a [`FileMatch`]:
//! one regex OR-ing every include pattern and one OR-ing every `!`-prefixed
//! exclude pattern. Supported syntax:
//!
//! - `*` matches one or more characters within a single path segment
//! - `**` matches one or more characters across segments
//! - everything else, `.` and `/` included, matches literally
//!
//! Each pattern is anchored at the start of the candidate or right after a
//! `/`, and at the end of the candidate, so `*.js` matches `lib/a.js` but
//! `foo/*.js` does not match `foo/bar/baz.js`.

use std::path::Path;

use regex::Regex;

use crate::error::{FsError, Result};

const SEPARATOR: char = '/';
const NEGATION: char = '!';

/// A compiled include/exclude matcher.
#[derive(Debug, Clone)]
pub struct FileMatch {
    /// `None` when no include glob was given: every candidate is included.
    include: Option<Regex>,
    exclude: Option<Regex>,
    patterns: Vec<String>,
}

impl FileMatch {
    /// A matcher that accepts every path.
    pub fn any() -> Self {
        Self {
            include: None,
            exclude: None,
            patterns: Vec::new(),
        }
    }

    /// Compile a list of globs. `!`-prefixed globs go to the exclude set.
    pub fn from_globs<I, S>(globs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        let mut patterns = Vec::new();

        for glob in globs {
            let glob = glob.as_ref();
            patterns.push(glob.to_string());

            let (negated, body) = split_negation(glob);
            let fragment = anchor(&translate(body));
            if negated {
                excludes.push(fragment);
            } else {
                includes.push(fragment);
            }
        }

        let include = combine(&includes)
            .map(|source| build(&source, &patterns))
            .transpose()?;
        let exclude = combine(&excludes)
            .map(|source| build(&source, &patterns))
            .transpose()?;

        Ok(Self {
            include,
            exclude,
            patterns,
        })
    }

    /// Test a `/`-separated candidate.
    pub fn test(&self, candidate: &str) -> bool {
        self.include
            .as_ref()
            .is_none_or(|include| include.is_match(candidate))
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(candidate))
    }

    /// Test a filesystem path, normalizing platform separators first.
    pub fn test_path(&self, path: &Path) -> bool {
        self.test(&normalize(path))
    }

    /// Keep only the candidates that match.
    pub fn filter<I, S>(&self, candidates: I) -> Vec<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        candidates
            .into_iter()
            .filter(|candidate| self.test(candidate.as_ref()))
            .collect()
    }

    /// The include regex source, if any include glob was given.
    pub fn include_source(&self) -> Option<&str> {
        self.include.as_ref().map(Regex::as_str)
    }

    /// The exclude regex source, if any exclude glob was given.
    pub fn exclude_source(&self) -> Option<&str> {
        self.exclude.as_ref().map(Regex::as_str)
    }

    /// The globs this matcher was compiled from.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for FileMatch {
    fn default() -> Self {
        Self::any()
    }
}

/// Anything that can become a [`FileMatch`]: a glob, a list of globs, or an
/// already compiled matcher (returned unchanged).
pub trait IntoFileMatch {
    /// Compile into a matcher.
    fn into_file_match(self) -> Result<FileMatch>;
}

impl IntoFileMatch for FileMatch {
    fn into_file_match(self) -> Result<FileMatch> {
        Ok(self)
    }
}

impl IntoFileMatch for &FileMatch {
    fn into_file_match(self) -> Result<FileMatch> {
        Ok(self.clone())
    }
}

impl IntoFileMatch for &str {
    fn into_file_match(self) -> Result<FileMatch> {
        FileMatch::from_globs([self])
    }
}

impl IntoFileMatch for String {
    fn into_file_match(self) -> Result<FileMatch> {
        FileMatch::from_globs([self])
    }
}

impl IntoFileMatch for &String {
    fn into_file_match(self) -> Result<FileMatch> {
        FileMatch::from_globs([self])
    }
}

impl<S: AsRef<str>> IntoFileMatch for &[S] {
    fn into_file_match(self) -> Result<FileMatch> {
        FileMatch::from_globs(self)
    }
}

impl<S: AsRef<str>> IntoFileMatch for Vec<S> {
    fn into_file_match(self) -> Result<FileMatch> {
        FileMatch::from_globs(self)
    }
}

impl<S: AsRef<str>, const N: usize> IntoFileMatch for [S; N] {
    fn into_file_match(self) -> Result<FileMatch> {
        FileMatch::from_globs(self)
    }
}

/// Compile a glob, a glob list, or pass a compiled matcher through.
pub fn compile(pattern: impl IntoFileMatch) -> Result<FileMatch> {
    pattern.into_file_match()
}

/// Strip a leading `!`, reporting whether it was present.
fn split_negation(glob: &str) -> (bool, &str) {
    match glob.strip_prefix(NEGATION) {
        Some(rest) => (true, rest),
        None => (false, glob),
    }
}

fn escape_separator() -> &'static str {
    "/"
}

fn escape_dot() -> &'static str {
    r"\."
}

/// `**`: one or more of anything, separators included.
fn cross_segment_wildcard() -> &'static str {
    ".+"
}

/// `*`: one or more characters inside a single segment.
fn segment_wildcard() -> &'static str {
    "[^/]+"
}

fn escape_literal(ch: char) -> String {
    let mut buf = [0u8; 4];
    regex::escape(ch.encode_utf8(&mut buf))
}

/// Translate one glob body into an unanchored regex fragment.
fn translate(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(cross_segment_wildcard());
            }
            '*' => out.push_str(segment_wildcard()),
            '.' => out.push_str(escape_dot()),
            SEPARATOR => out.push_str(escape_separator()),
            other => out.push_str(&escape_literal(other)),
        }
    }

    out
}

/// Anchor a fragment to a segment boundary and the end of the candidate.
fn anchor(fragment: &str) -> String {
    format!("(?:^|/){fragment}$")
}

fn combine(fragments: &[String]) -> Option<String> {
    if fragments.is_empty() {
        return None;
    }
    Some(
        fragments
            .iter()
            .map(|fragment| format!("(?:{fragment})"))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

fn build(source: &str, patterns: &[String]) -> Result<Regex> {
    Regex::new(source).map_err(|e| FsError::invalid_pattern(patterns.join(", "), e))
}

fn normalize(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == SEPARATOR {
        lossy.into_owned()
    } else {
        lossy.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
