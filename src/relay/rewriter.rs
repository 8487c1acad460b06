use regex::{NoExpand, Regex, RegexBuilder};
use tracing::warn;

use crate::relay::{Destination, RewriteRule, RuleAction};

/// Appended once to text for a destination whose links were replaced.
pub const LINKS_UPDATED_NOTICE: &str = "\n\n🔗 Links have been updated";

/// Result of rewriting one message for one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub text: String,
    /// Whether any `Replace` rule fired (and the notice was appended)
    pub replaced: bool,
}

/// Upper bound on the compiled size of a single literal matcher.
const MATCHER_SIZE_LIMIT: usize = 1 << 20;

/// Compile a literal as a case-insensitive matcher. Regex metacharacters in
/// the literal are escaped, so `?`, `.` and friends in URLs match themselves.
fn literal_matcher(literal: &str, trailing_whitespace: bool) -> Result<Regex, regex::Error> {
    let mut pattern = regex::escape(literal);
    if trailing_whitespace {
        pattern.push_str(r"\s*");
    }
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .size_limit(MATCHER_SIZE_LIMIT)
        .build()
}

/// Check that every literal of `rule` compiles into a matcher.
pub fn check_rule(rule: &RewriteRule) -> Result<(), regex::Error> {
    let trailing_whitespace = matches!(rule.action, RuleAction::Remove);
    for literal in rule.pattern.literals() {
        literal_matcher(literal, trailing_whitespace)?;
    }
    Ok(())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rewrite `text` for `destination`, applying the matching rules in order.
///
/// Rules tagged for other destinations are ignored. Each rule sees the output
/// of the previous one, so overlapping literals resolve in declaration order.
pub fn rewrite(text: &str, destination: Destination, rules: &[RewriteRule]) -> RewriteOutcome {
    let mut current = text.to_string();
    let mut replaced = false;
    let mut removed = false;

    for rule in rules.iter().filter(|r| r.destination == destination) {
        for literal in rule.pattern.literals() {
            if literal.is_empty() {
                continue;
            }
            match &rule.action {
                RuleAction::Replace(with) => {
                    let Ok(re) = literal_matcher(literal, false) else {
                        warn!("Skipping rewrite literal that failed to compile");
                        continue;
                    };
                    if re.is_match(&current) {
                        current = re.replace_all(&current, NoExpand(with)).into_owned();
                        replaced = true;
                    }
                }
                RuleAction::Remove => {
                    let Ok(re) = literal_matcher(literal, true) else {
                        warn!("Skipping rewrite literal that failed to compile");
                        continue;
                    };
                    if re.is_match(&current) {
                        current = re.replace_all(&current, "").into_owned();
                        removed = true;
                    }
                }
            }
        }
    }

    if removed {
        current = collapse_whitespace(&current);
    }
    if replaced {
        current.push_str(LINKS_UPDATED_NOTICE);
    }

    RewriteOutcome {
        text: current,
        replaced,
    }
}

/// Convenience wrapper returning only the rewritten text.
pub fn rewrite_text(text: &str, destination: Destination, rules: &[RewriteRule]) -> String {
    rewrite(text, destination, rules).text
}
