use pmokuwo::{task_runner, KuwoError};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

type Outcomes = Arc<Mutex<Vec<(ThreadId, String)>>>;

#[test]
fn test_concurrent_runs_complete_on_control_thread() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (runner, control) = task_runner(rt.handle().clone(), 4);
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let worker_threads = Arc::new(Mutex::new(Vec::new()));

    for (resource, delay) in [("cover-a.jpg", 40), ("cover-b.jpg", 5)] {
        let sink = Arc::clone(&outcomes);
        let workers = Arc::clone(&worker_threads);
        runner.run(
            async move {
                workers.lock().unwrap().push(thread::current().id());
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(format!("{resource}:done"))
            },
            move |result: pmokuwo::Result<String>| {
                sink.lock().unwrap().push((thread::current().id(), result.unwrap()));
            },
        );
    }

    // Rien ne s'exécute tant que le fil de contrôle ne dépile pas
    thread::sleep(Duration::from_millis(100));
    assert!(outcomes.lock().unwrap().is_empty());

    let mut dispatched = 0;
    while dispatched < 2 {
        dispatched += control.dispatch_timeout(Duration::from_secs(5));
    }

    let control_thread = thread::current().id();
    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(tid, _)| *tid == control_thread));
    assert!(worker_threads.lock().unwrap().iter().all(|tid| *tid != control_thread));

    let mut results: Vec<_> = outcomes.iter().map(|(_, r)| r.as_str()).collect();
    results.sort();
    assert_eq!(results, vec!["cover-a.jpg:done", "cover-b.jpg:done"]);
}

#[test]
fn test_errors_are_delivered_to_callback() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (runner, control) = task_runner(rt.handle().clone(), 1);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    runner.run(
        async { Err::<(), _>(KuwoError::InvalidLink("short body".into())) },
        move |result| {
            *sink.lock().unwrap() = Some(result.unwrap_err().to_string());
        },
    );

    assert_eq!(control.dispatch_timeout(Duration::from_secs(5)), 1);
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("Invalid download link: short body")
    );
}

#[test]
fn test_results_after_control_loop_dropped_are_discarded() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (runner, control) = task_runner(rt.handle().clone(), 1);
    drop(control);

    let (tx, rx) = std::sync::mpsc::channel();
    runner.run(
        async move {
            tx.send(()).unwrap();
            Ok(())
        },
        |_| panic!("callback must not run"),
    );

    // Le travail s'exécute quand même
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
}
