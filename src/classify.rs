//! Pure scanners over run output lines.
//!
//! Run output is scanned line by line for durable attributes (issue number,
//! plan path, pull-request URL) and for stage announcements feeding the
//! progress widgets. All scanners are total functions with no side effects.

use std::sync::LazyLock;

use regex::Regex;

static STAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"Stage\s+\d+(?:-\d+)?/5:\s+Running\s+.+?\s*\([^)]+\)"));

static ISSUE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"Created placeholder issue #(\d+)"));

static ISSUE_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"https://github\.com/[^/]+/[^/]+/issues/(\d+)"));

static PLAN_PATH_ANNOUNCED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"See the full plan locally at:\s+(.+)$"));

static PLAN_PATH_CONSENSUS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"consensus dumped to\s+(.+)$"));

static PR_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"https://github\.com/[^/]+/[^/]+/pull/\d+"));

static ITEM_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^https://github\.com/[^/]+/[^/]+/(?:issues|pull)/\d+$"));

#[allow(clippy::expect_used)] // fixed patterns, exercised by tests
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("fixed pattern compiles")
}

fn capture(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|group| group.as_str().trim().to_owned())
}

/// Whether a stderr line is a recognized stage announcement.
///
/// Matches lines of the shape `Stage 2/5: Running <name> (<detail>)`,
/// including sub-stages such as `Stage 2-1/5`.
#[must_use]
pub fn is_stage_line(line: &str) -> bool {
    STAGE_LINE.is_match(line)
}

/// Extract a tracking-issue number from a run output line.
///
/// Placeholder announcements take precedence over issue URLs when both
/// appear on one line.
pub fn scan_issue_number(line: &str) -> Option<String> {
    capture(&ISSUE_PLACEHOLDER, line).or_else(|| capture(&ISSUE_URL, line))
}

/// Extract a plan document path from a run output line, trimmed.
pub fn scan_plan_path(line: &str) -> Option<String> {
    capture(&PLAN_PATH_ANNOUNCED, line).or_else(|| capture(&PLAN_PATH_CONSENSUS, line))
}

/// Extract a pull-request URL from an implementation output line.
pub fn scan_pr_url(line: &str) -> Option<String> {
    PR_URL
        .find(line)
        .map(|matched| matched.as_str().to_owned())
}

/// Whether a URL is exactly a GitHub issue or pull-request link.
///
/// Gate applied before asking the host to open an external URL; anything
/// else is refused.
#[must_use]
pub fn is_github_item_url(url: &str) -> bool {
    ITEM_URL.is_match(url)
}

/// Whether a value is a bare issue number (digits only, nonempty).
#[must_use]
pub fn is_issue_reference(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}
