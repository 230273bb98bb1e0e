// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{Outcome, SIMPLE, Script, service, wait_until};
use rotel_service::service::State;

fn strings(events: &[&str]) -> Vec<String> {
    events.iter().map(|e| e.to_string()).collect()
}

#[tokio::test]
async fn startup_and_shutdown_order() {
    let script = Script::new();
    let (svc, state) = service(&script, SIMPLE);
    let mut handle = svc.handle();
    assert_eq!(State::Created, handle.state());

    let task = tokio::spawn(svc.run());
    assert_eq!(State::Running, handle.wait_for(State::Running).await);
    assert_eq!(
        strings(&["D.start", "C.start", "B.start", "A.start", "D.ready"]),
        script.lifecycle()
    );

    handle.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(State::Terminated, handle.state());

    assert_eq!(
        strings(&[
            "D.start",
            "C.start",
            "B.start",
            "A.start",
            "D.ready",
            "D.not_ready",
            "A.shutdown",
            "B.shutdown",
            "C.shutdown",
            "D.shutdown",
        ]),
        script.lifecycle()
    );
    assert_eq!(vec![Outcome::Succeeded], state.outcomes());
}

#[tokio::test]
async fn shared_exporter_built_once() {
    let yaml = r#"
receivers:
  mockrecv/A:
  mockrecv/A2:
exporters:
  mockexp/C:
service:
  pipelines:
    traces:
      receivers: [mockrecv/A]
      exporters: [mockexp/C]
    logs/other:
      receivers: [mockrecv/A, mockrecv/A2]
      exporters: [mockexp/C]
"#;
    let script = Script::new();
    let (svc, _) = service(&script, yaml);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;

    handle.shutdown();
    task.await.unwrap().unwrap();

    assert_eq!(1, script.count("C.create"));
    assert_eq!(1, script.count("C.start"));
    assert_eq!(1, script.count("C.shutdown"));
    // A receiver listed by two pipelines is still a single instance
    assert_eq!(1, script.count("A.create"));
    assert_eq!(1, script.count("A2.create"));
}

#[tokio::test]
async fn missing_extension_factory_aborts_before_pipelines() {
    let yaml = r#"
receivers:
  mockrecv/A:
exporters:
  mockexp/C:
extensions:
  zpages:
service:
  extensions: [zpages]
  pipelines:
    traces:
      receivers: [mockrecv/A]
      exporters: [mockexp/C]
"#;
    let script = Script::new();
    let (svc, state) = service(&script, yaml);
    let handle = svc.handle();

    let err = svc.run().await.unwrap_err().to_string();
    assert!(err.contains("not configured"), "{}", err);
    assert!(err.contains("zpages"), "{}", err);
    assert!(script.events().is_empty());
    assert_eq!(State::Terminated, handle.state());
    assert!(matches!(state.outcomes().as_slice(), [Outcome::Failed(_)]));
}

#[tokio::test]
async fn dangling_reference_is_named() {
    let yaml = r#"
receivers:
  mockrecv/A:
exporters:
  mockexp/C:
service:
  pipelines:
    traces:
      receivers: [mockrecv/A]
      exporters: [mockexp/C, mockexp/missing]
"#;
    let script = Script::new();
    let (svc, _) = service(&script, yaml);
    let err = svc.run().await.unwrap_err().to_string();
    assert!(err.contains("mockexp/missing"), "{}", err);
    assert!(script.events().is_empty());
}

#[tokio::test]
async fn nil_component_names_id_and_rolls_back() {
    let script = Script::new();
    script.nil("B");
    let (svc, _) = service(&script, SIMPLE);

    let err = svc.run().await.unwrap_err().to_string();
    assert!(err.contains("mockproc/B"), "{}", err);
    assert!(err.contains("nil"), "{}", err);

    // Exporters already running are stopped again, receivers are never built
    assert_eq!(
        strings(&["D.start", "C.start", "C.shutdown", "D.shutdown"]),
        script.lifecycle()
    );
    assert_eq!(0, script.count("A.create"));
}

#[tokio::test]
async fn start_failure_rolls_back() {
    let script = Script::new();
    script.fail("A.start");
    let (svc, _) = service(&script, SIMPLE);

    let err = svc.run().await.unwrap_err().to_string();
    assert!(err.contains("mockrecv/A"), "{}", err);
    assert_eq!(
        strings(&[
            "D.start",
            "C.start",
            "B.start",
            "A.start",
            "B.shutdown",
            "C.shutdown",
            "D.shutdown",
        ]),
        script.lifecycle()
    );
}

#[tokio::test]
async fn fatal_error_triggers_shutdown() {
    let script = Script::new();
    let (svc, _) = service(&script, SIMPLE);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;

    script
        .host()
        .unwrap()
        .report_fatal_error("exporter lost its connection".into());

    let err = task.await.unwrap().unwrap_err().to_string();
    assert!(err.contains("exporter lost its connection"), "{}", err);
    assert_eq!(State::Terminated, handle.state());

    let events = script.lifecycle();
    assert_eq!(
        strings(&["D.not_ready", "A.shutdown", "B.shutdown", "C.shutdown", "D.shutdown"]),
        events[5..].to_vec()
    );

    // Reports after shutdown are dropped quietly
    script.host().unwrap().report_fatal_error("late".into());
}

#[tokio::test]
async fn failing_not_ready_does_not_stop_others() {
    let yaml = r#"
receivers:
  mockrecv/A:
exporters:
  mockexp/C:
extensions:
  mockext/D:
  mockext/E:
service:
  extensions: [mockext/D, mockext/E]
  pipelines:
    metrics:
      receivers: [mockrecv/A]
      exporters: [mockexp/C]
"#;
    let script = Script::new();
    script.fail("E.not_ready");
    script.fail("A.shutdown");
    let (svc, _) = service(&script, yaml);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;
    assert!(script.position("D.ready") < script.position("E.ready"));

    handle.shutdown();
    let err = task.await.unwrap().unwrap_err().to_string();
    assert!(err.contains("mockext/E"), "{}", err);
    assert!(err.contains("mockrecv/A"), "{}", err);

    let events = script.lifecycle();
    assert_eq!(
        strings(&[
            "E.not_ready",
            "D.not_ready",
            "A.shutdown",
            "C.shutdown",
            "E.shutdown",
            "D.shutdown",
        ]),
        events[6..].to_vec()
    );
}

#[tokio::test]
async fn reload_swaps_pipelines() {
    let initial = r#"
receivers:
  mockrecv/A:
exporters:
  mockexp/C:
extensions:
  mockext/D:
service:
  extensions: [mockext/D]
  pipelines:
    traces:
      receivers: [mockrecv/A]
      exporters: [mockexp/C]
"#;
    let script = Script::new();
    let (svc, state) = service(&script, initial);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;
    script.clear();

    state.update(SIMPLE);
    wait_until("the reload to finish", || {
        state.outcomes().len() == 2
    })
    .await;

    assert_eq!(vec![Outcome::Succeeded, Outcome::Succeeded], state.outcomes());
    // The extension section did not change, so D keeps running
    assert_eq!(
        strings(&[
            "D.not_ready",
            "A.shutdown",
            "C.shutdown",
            "C.start",
            "B.start",
            "A.start",
            "D.ready",
        ]),
        script.lifecycle()
    );
    assert_eq!(State::Running, handle.state());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn reload_ignores_fatal_errors_from_replaced_components() {
    let script = Script::new();
    let (svc, state) = service(&script, SIMPLE);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;

    script.fatal_on("A.shutdown");
    state.update(&SIMPLE.replace("mockproc/B", "mockproc/B2"));
    wait_until("the reload to finish", || state.outcomes().len() == 2).await;
    assert_eq!(vec![Outcome::Succeeded, Outcome::Succeeded], state.outcomes());

    // Give the run loop a chance to act on anything left in the fatal queue
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(State::Running, handle.state());
    assert_eq!(1, script.count("B2.start"));

    // Reports during the final shutdown are dropped as well
    handle.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(State::Terminated, handle.state());
}

#[tokio::test]
async fn failed_reload_restores_previous_configuration() {
    let script = Script::new();
    let (svc, state) = service(&script, SIMPLE);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;
    script.clear();

    let broken = SIMPLE.replace("mockexp/C", "mockexp/X");
    script.fail("X.start");
    state.update(&broken);
    wait_until("the rollback to finish", || script.count("D.ready") == 1).await;

    let outcomes = state.outcomes();
    assert_eq!(2, outcomes.len());
    assert!(
        matches!(&outcomes[1], Outcome::Failed(e) if e.contains("mockexp/X")),
        "{:?}",
        outcomes
    );

    // Restoring rebuilds everything, extensions included
    assert_eq!(
        strings(&[
            "D.not_ready",
            "A.shutdown",
            "B.shutdown",
            "C.shutdown",
            "X.start",
            "D.not_ready",
            "D.shutdown",
            "D.start",
            "C.start",
            "B.start",
            "A.start",
            "D.ready",
        ]),
        script.lifecycle()
    );
    assert_eq!(State::Running, handle.state());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn unresolvable_update_keeps_running() {
    let script = Script::new();
    let (svc, state) = service(&script, SIMPLE);
    let mut handle = svc.handle();
    let task = tokio::spawn(svc.run());
    handle.wait_for(State::Running).await;
    script.clear();

    state.update("receivers: [");
    wait_until("the update to be rejected", || state.outcomes().len() == 2).await;

    assert!(matches!(state.outcomes()[1], Outcome::Failed(_)));
    assert!(script.events().is_empty());
    assert_eq!(State::Running, handle.state());

    handle.shutdown();
    task.await.unwrap().unwrap();
}
