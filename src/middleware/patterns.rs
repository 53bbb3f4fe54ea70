//! Glob-style matching shared by the stateful-domain and CSRF-exemption checks.
//!
//! `*` matches any run of characters; everything else is literal. Patterns are
//! compiled once, anchored on both ends and matched Unicode-aware.

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

#[derive(Debug, Clone)]
struct Pattern {
    literal: String,
    glob: Option<Regex>,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .map(|literal| {
                let glob = literal.contains('*').then(|| compile(&literal)).flatten();
                Pattern { literal, glob }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.patterns.iter().any(|p| {
            p.literal == value || p.glob.as_ref().is_some_and(|re| re.is_match(value))
        })
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    let source = format!(r"^{}\z", regex::escape(pattern).replace(r"\*", ".*"));
    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, error = %err, "ignoring glob that does not compile");
            None
        }
    }
}
