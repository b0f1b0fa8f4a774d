//! Ranking, availability and result classification over realistic pages.

mod common;

use clubwatch::browser::SnapshotPage;
use clubwatch::matcher::ClubMatcher;
use clubwatch::signup::{classify_result, SignupOutcome};
use common::{activity_row, favorites, signup_page};

fn matcher(names: &[&str], max_entries: usize) -> ClubMatcher {
    ClubMatcher::new(favorites(names), &["club".to_string()], max_entries)
}

#[tokio::test]
async fn test_matches_ranked_by_favorite_order_not_page_order() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/1",
        &signup_page(&[
            activity_row("Debate Society Meeting", "3/20", Some("/go/debate")),
            activity_row("Robotics Club Workshop", "5/20", Some("/go/robotics")),
        ]),
    );
    let matcher = matcher(&["Robotics Club", "Debate Society"], 20);

    let matches = matcher.find_matches(&page).await;
    let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Robotics Club Workshop", "Debate Society Meeting"]);

    for m in &matches {
        assert_eq!(Some(m.priority), matcher.favorites().index_of(&m.favorite));
    }
}

#[tokio::test]
async fn test_full_waitlisted_and_empty_entries_are_dropped() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/1",
        &signup_page(&[
            activity_row("Robotics Club Workshop", "20/20", Some("/go/a")),
            activity_row("Robotics Club Build Night", "Waitlist: 5", Some("/go/b")),
            activity_row("Robotics Club Lab", "0/20", Some("/go/c")),
            activity_row("Robotics Club Seminar", "2/20", Some("/go/d")),
        ]),
    );

    let matches = matcher(&["Robotics Club"], 20).find_matches(&page).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name, "Robotics Club Seminar");
}

#[tokio::test]
async fn test_entries_without_signup_control_are_dropped() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/1",
        &signup_page(&[activity_row("Robotics Club Workshop", "3/20", None)]),
    );

    assert!(matcher(&["Robotics Club"], 20).find_matches(&page).await.is_empty());
}

#[tokio::test]
async fn test_entry_cap_limits_examined_rows() {
    let rows: Vec<String> = (1..=5)
        .map(|i| activity_row(&format!("Robotics Club Session {i}"), "1/20", Some("/go/x")))
        .collect();
    let page = SnapshotPage::single("https://ion.example.test/eighth/signup/1", &signup_page(&rows));

    let matches = matcher(&["Robotics Club"], 2).find_matches(&page).await;
    let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Robotics Club Session 1", "Robotics Club Session 2"]);
}

#[tokio::test]
async fn test_keyword_scan_when_page_has_no_activity_rows() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/1",
        r#"<html><body><ul>
             <li>Investment Club - 3/10 <a href="/go/invest">Sign up</a></li>
           </ul></body></html>"#,
    );

    let matches = matcher(&["Investment Club"], 20).find_matches(&page).await;
    assert!(!matches.is_empty());
    assert!(matches.iter().all(|m| m.favorite == "Investment Club"));
}

#[tokio::test]
async fn test_classification_is_stable_across_reads() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/4",
        "<html><body><p>Registration failed: this activity is full.</p></body></html>",
    );

    let first = classify_result(&page).await.unwrap();
    let second = classify_result(&page).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        SignupOutcome::Failure {
            message: "activity is full".to_string()
        }
    );
}

#[tokio::test]
async fn test_banner_outranks_phrases() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/4",
        r#"<html><body>
             <div class="alert-error">You are already signed up for another activity.</div>
             <p>Successfully signed up!</p>
           </body></html>"#,
    );

    let outcome = classify_result(&page).await.unwrap();
    assert_eq!(
        outcome,
        SignupOutcome::Failure {
            message: "You are already signed up for another activity.".to_string()
        }
    );
}

#[tokio::test]
async fn test_success_url_without_banner() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signed-up?aid=12",
        "<html><body><p>Thanks</p></body></html>",
    );

    let outcome = classify_result(&page).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.message(), "URL changed");
}

#[tokio::test]
async fn test_unreadable_result_is_ambiguous() {
    let page = SnapshotPage::single(
        "https://ion.example.test/eighth/signup/4",
        "<html><body><p>Please wait</p></body></html>",
    );

    let outcome = classify_result(&page).await.unwrap();
    assert!(!outcome.is_success());
    assert!(matches!(outcome, SignupOutcome::Ambiguous { .. }));
}
