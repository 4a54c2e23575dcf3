mod common;

use common::events_from_str;
use pretty_assertions::assert_eq;
use taskdeck_core::classify::OutputTarget;
use taskdeck_core::{LogClassifier, LogEventKind};

fn classifier() -> LogClassifier {
    LogClassifier::new([("web", "web"), ("api", "api"), ("@acme/docs", "docs")])
}

#[test]
fn recorded_build_log_yields_task_events_in_order() {
    let input = include_str!("fixtures/turbo_build.log");
    let mut c = classifier();
    let events: Vec<(String, LogEventKind)> = events_from_str(&mut c, input)
        .into_iter()
        .map(|e| (e.task_id, e.kind))
        .collect();

    assert_eq!(
        events,
        vec![
            ("docs".to_string(), LogEventKind::CacheHit),
            ("web".to_string(), LogEventKind::Start),
            ("api".to_string(), LogEventKind::Start),
            ("api".to_string(), LogEventKind::Error),
            ("api".to_string(), LogEventKind::Error),
            ("api".to_string(), LogEventKind::Error),
            ("web".to_string(), LogEventKind::Complete),
        ]
    );
}

#[test]
fn unprefixed_output_follows_the_last_started_task() {
    let input = include_str!("fixtures/turbo_build.log");
    let mut c = classifier();
    let mut next_build_target = None;
    let mut banner_target = None;

    for line in input.lines() {
        let out = c.classify(line);
        if line.contains("Next.js") {
            next_build_target = Some(out.target.clone());
        }
        if line.starts_with("• Packages in scope") {
            banner_target = Some(out.target.clone());
        }
    }

    assert_eq!(banner_target, Some(OutputTarget::System));
    assert_eq!(next_build_target, Some(OutputTarget::Task("web".into())));
}

#[test]
fn interleaved_workers_keep_their_own_lines() {
    let mut c = classifier();
    c.classify("web:build: cache miss, executing 1");
    c.classify("api:build: cache miss, executing 2");

    let web = c.classify("web:build: compiled client");
    let api = c.classify("api:build: emitted 12 files");
    let loose = c.classify("warning: something");

    assert_eq!(web.target, OutputTarget::Task("web".into()));
    assert_eq!(api.target, OutputTarget::Task("api".into()));
    assert_eq!(loose.target, OutputTarget::Task("api".into()));
    assert!(web.event.is_none() && api.event.is_none() && loose.event.is_none());
}
