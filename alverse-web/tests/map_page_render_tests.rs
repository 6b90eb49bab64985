use alverse_core::{
    AlverseConfig, AttemptRecord, LevelCatalog, LevelMapModel, MapViewState, ProgressSnapshot,
    aggregate,
};
use alverse_web::pages::map::{MapPage, MapPageProps};
use chrono::{DateTime, Utc};
use futures::executor::block_on;
use std::rc::Rc;
use yew::{Callback, LocalServerRenderer};

const READY: MapViewState = MapViewState {
    signed_in: true,
    loading: false,
    busy: false,
};

fn snapshot(levels: impl IntoIterator<Item = u32>, total: u32) -> ProgressSnapshot {
    let rows: Vec<_> = levels
        .into_iter()
        .map(|n| AttemptRecord::new("u", &n.to_string(), n * 10, DateTime::<Utc>::UNIX_EPOCH))
        .collect();
    aggregate("u", &rows, total)
}

fn props(snapshot: &ProgressSnapshot, view: MapViewState) -> MapPageProps {
    MapPageProps {
        model: Rc::new(LevelMapModel::from_snapshot(
            snapshot,
            LevelCatalog::default_catalog(),
            view,
        )),
        config: Rc::new(AlverseConfig::default()),
        username: "ada".into(),
        email: "ada@example.com".into(),
        error: None,
        resetting: false,
        on_open: Callback::noop(),
        on_next: Callback::noop(),
        on_reset: Callback::noop(),
        on_logout: Callback::noop(),
    }
}

fn render(props: MapPageProps) -> String {
    block_on(LocalServerRenderer::<MapPage>::with_props(props).render())
}

/// Opening tag of the node button for `level`.
fn node_tag(html: &str, level: u32) -> &str {
    let marker = format!("data-level=\"{level}\"");
    let at = html.find(&marker).expect("node rendered");
    let start = html[..at].rfind("<button").expect("node is a button");
    let end = at + html[at..].find('>').expect("tag closes");
    &html[start..=end]
}

#[test]
fn map_shows_progress_and_player() {
    let html = render(props(&snapshot([1_u32, 2], 14), READY));
    assert!(html.contains("ada@example.com"));
    assert!(html.contains("Level 3 of 14 · 2 completed"));
    assert_eq!(html.matches("level-node completed").count(), 2);
    assert_eq!(html.matches("level-node current").count(), 1);
    assert!(html.contains("Best: 20"));
    assert!(html.contains("Next Level"));
    assert!(!html.contains("Congratulations!"));
}

#[test]
fn only_the_current_level_is_clickable_mid_run() {
    let html = render(props(&snapshot([1_u32, 2], 14), READY));
    assert!(!node_tag(&html, 3).contains("disabled"));
    assert!(node_tag(&html, 1).contains("disabled"));
    assert!(node_tag(&html, 4).contains("disabled"));
}

#[test]
fn nodes_stop_at_the_configured_level_count() {
    let html = render(props(&snapshot(Vec::<u32>::new(), 5), READY));
    assert_eq!(html.matches("data-level=").count(), 5);
    assert!(!html.contains("data-level=\"6\""));
    assert!(html.contains("Level 1 of 5 · 0 completed"));
}

#[test]
fn finished_run_congratulates_and_reopens_levels() {
    let html = render(props(&snapshot(1_u32..=5, 5), READY));
    assert!(html.contains("Congratulations!"));
    assert!(!html.contains("Next Level"));
    assert!(!node_tag(&html, 2).contains("disabled"));
}

#[test]
fn loading_locks_the_map() {
    let view = MapViewState {
        loading: true,
        ..READY
    };
    let html = render(props(&snapshot([1_u32], 14), view));
    assert!(html.contains("Syncing your progress"));
    assert!(node_tag(&html, 2).contains("disabled"));
}

#[test]
fn errors_and_reset_state_are_visible() {
    let mut page = props(&snapshot([1_u32], 14), READY);
    page.error = Some("Failed to reset progress: offline".into());
    page.resetting = true;
    let html = render(page);
    assert!(html.contains("role=\"alert\""));
    assert!(html.contains("Failed to reset progress: offline"));
    assert!(html.contains("Resetting..."));
}
