use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use keeper_convert::{TaskManager, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Start(&'static str),
    End(&'static str),
}

type EventLog = Arc<Mutex<Vec<Event>>>;

fn recording_task(
    log: &EventLog,
    id: &'static str,
) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
    let log = Arc::clone(log);
    move || {
        log.lock().unwrap().push(Event::Start(id));
        thread::sleep(Duration::from_millis(5));
        log.lock().unwrap().push(Event::End(id));
        Ok(())
    }
}

fn position(events: &[Event], wanted: &Event) -> usize {
    events
        .iter()
        .position(|event| event == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} missing from {events:?}"))
}

#[test]
fn diamond_runs_each_task_after_its_dependencies_for_every_pool_size() {
    for threads in 1..=4 {
        let log: EventLog = Arc::default();
        let mut manager = TaskManager::new(threads);
        manager.add_task("A", [], recording_task(&log, "A"), true).unwrap();
        manager.add_task("B", ["A"], recording_task(&log, "B"), true).unwrap();
        manager.add_task("C", ["A"], recording_task(&log, "C"), true).unwrap();
        manager.add_task("D", ["B", "C"], recording_task(&log, "D"), true).unwrap();

        let report = manager.execute().unwrap();
        assert!(report.succeeded(), "pool of {threads} failed: {report:?}");

        let events = log.lock().unwrap().clone();
        assert_eq!(events.len(), 8, "each task runs exactly once");
        let expected: [(&str, &[&str]); 3] = [("B", &["A"]), ("C", &["A"]), ("D", &["B", "C"])];
        for (task, dependencies) in expected {
            let started = position(&events, &Event::Start(task));
            for &dependency in dependencies {
                assert!(
                    position(&events, &Event::End(dependency)) < started,
                    "{task} started before {dependency} finished with {threads} thread(s)"
                );
            }
        }
        assert_eq!(report.finish_order.first(), Some(&"A"));
        assert_eq!(report.finish_order.last(), Some(&"D"));
    }
}

#[test]
fn failure_blocks_transitive_dependents_only() {
    let log: EventLog = Arc::default();
    let mut manager = TaskManager::new(2);
    manager
        .add_task("fetch", [], || bail!("archive missing"), true)
        .unwrap();
    manager.add_task("decode", ["fetch"], recording_task(&log, "decode"), true).unwrap();
    manager.add_task("render", ["decode"], recording_task(&log, "render"), true).unwrap();
    manager.add_task("scores", [], recording_task(&log, "scores"), true).unwrap();

    let report = manager.execute().unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.state(&"fetch"), Some(TaskState::Failed));
    assert_eq!(report.state(&"decode"), Some(TaskState::Blocked));
    assert_eq!(report.state(&"render"), Some(TaskState::Blocked));
    assert_eq!(report.state(&"scores"), Some(TaskState::Completed));

    let failure = report.failures().next().unwrap();
    assert_eq!(failure.id, "fetch");
    assert!(failure.error.as_deref().unwrap().contains("archive missing"));

    let events = log.lock().unwrap();
    assert!(!events.contains(&Event::Start("decode")));
    assert!(!events.contains(&Event::Start("render")));
}

#[test]
fn roots_with_more_dependents_start_first_on_a_single_worker() {
    let log: EventLog = Arc::default();
    let mut manager = TaskManager::new(1);
    manager.add_task("lonely", [], recording_task(&log, "lonely"), true).unwrap();
    manager.add_task("hub", [], recording_task(&log, "hub"), true).unwrap();
    manager.add_task("left", ["hub"], recording_task(&log, "left"), true).unwrap();
    manager.add_task("right", ["hub"], recording_task(&log, "right"), true).unwrap();

    let report = manager.execute().unwrap();
    assert!(report.succeeded());
    assert_eq!(report.finish_order[0], "hub");
    assert_eq!(report.finish_order[1], "lonely");
}

#[test]
fn skipped_tasks_never_run_but_release_dependents() {
    let log: EventLog = Arc::default();
    let mut manager = TaskManager::new(3);
    manager.add_task("textures", [], recording_task(&log, "textures"), false).unwrap();
    manager.add_task("models", ["textures"], recording_task(&log, "models"), true).unwrap();

    let report = manager.execute().unwrap();
    assert!(report.succeeded());
    assert_eq!(report.state(&"textures"), Some(TaskState::Skipped));
    assert_eq!(report.state(&"models"), Some(TaskState::Completed));
    assert_eq!(
        *log.lock().unwrap(),
        vec![Event::Start("models"), Event::End("models")]
    );
}
