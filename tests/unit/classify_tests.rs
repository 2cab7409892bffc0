//! Output-line classification tests: stage markers, issue/plan/PR capture,
//! and the URL and issue-reference gates.

use agent_workbench::classify::{
    is_github_item_url, is_issue_reference, is_stage_line, scan_issue_number, scan_plan_path,
    scan_pr_url,
};

// ── Stage markers ────────────────────────────────────

#[test]
fn recognizes_stage_announcements() {
    assert!(is_stage_line("Stage 1/5: Running plan (claude)"));
    assert!(is_stage_line(
        "Stage 2-1/5: Running consensus review (gemini)"
    ));
    assert!(is_stage_line(
        "2024-05-01 Stage 4/5: Running implementation (claude) done"
    ));
}

#[test]
fn rejects_near_miss_stage_lines() {
    assert!(!is_stage_line("stage 1/5: running plan (claude)"));
    assert!(!is_stage_line("Stage 1/4: Running plan (claude)"));
    assert!(!is_stage_line("Stage 1/5: Running plan"));
    assert!(!is_stage_line("Running plan (claude)"));
}

// ── Issue number capture ─────────────────────────────

#[test]
fn captures_placeholder_issue_numbers() {
    assert_eq!(
        scan_issue_number("Created placeholder issue #123 for tracking"),
        Some("123".to_owned())
    );
}

#[test]
fn captures_issue_numbers_from_urls() {
    assert_eq!(
        scan_issue_number("Opened https://github.com/acme/widgets/issues/77 just now"),
        Some("77".to_owned())
    );
}

#[test]
fn placeholder_wins_over_url_on_the_same_line() {
    let line =
        "Created placeholder issue #5 (see https://github.com/acme/widgets/issues/99)";
    assert_eq!(scan_issue_number(line), Some("5".to_owned()));
}

#[test]
fn ignores_lines_without_issue_references() {
    assert_eq!(scan_issue_number("no issues here"), None);
    assert_eq!(
        scan_issue_number("https://github.com/acme/widgets/pull/4"),
        None
    );
}

// ── Plan path capture ────────────────────────────────

#[test]
fn captures_announced_plan_paths() {
    assert_eq!(
        scan_plan_path("See the full plan locally at: docs/plans/retry.md"),
        Some("docs/plans/retry.md".to_owned())
    );
}

#[test]
fn captures_consensus_dump_paths_and_trims() {
    assert_eq!(
        scan_plan_path("consensus dumped to   ~/plans/retry.md  "),
        Some("~/plans/retry.md".to_owned())
    );
}

#[test]
fn plan_path_requires_a_known_announcement() {
    assert_eq!(scan_plan_path("plan saved to docs/plan.md"), None);
}

// ── PR URLs and link gates ───────────────────────────

#[test]
fn finds_pull_request_urls_inside_lines() {
    assert_eq!(
        scan_pr_url("Opened https://github.com/acme/widgets/pull/42 for review"),
        Some("https://github.com/acme/widgets/pull/42".to_owned())
    );
    assert_eq!(
        scan_pr_url("Opened https://github.com/acme/widgets/issues/42"),
        None
    );
}

#[test]
fn item_url_gate_requires_an_exact_match() {
    assert!(is_github_item_url("https://github.com/acme/widgets/issues/3"));
    assert!(is_github_item_url("https://github.com/acme/widgets/pull/42"));
    assert!(!is_github_item_url(
        "https://github.com/acme/widgets/pull/42 extra"
    ));
    assert!(!is_github_item_url("https://example.com/acme/widgets/pull/42"));
    assert!(!is_github_item_url(
        "https://github.com/acme/widgets/discussions/9"
    ));
}

#[test]
fn issue_references_are_nonempty_digit_strings() {
    assert!(is_issue_reference("123"));
    assert!(is_issue_reference("007"));
    assert!(!is_issue_reference(""));
    assert!(!is_issue_reference("12a"));
    assert!(!is_issue_reference(" 12"));
    assert!(!is_issue_reference("#12"));
}
