// SPDX-License-Identifier: Apache-2.0

use rotel_service::component::ComponentId;
use rotel_service::components;
use rotel_service::service::{ConfigProvider, DefaultConfigProvider, Service, ServiceSettings, State};
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

const BASE: &str = r#"
receivers:
  http:
    endpoint: 127.0.0.1:0
exporters:
  debug:
service:
  pipelines:
    traces:
      receivers: [http]
      exporters: [debug]
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn id(s: &str) -> ComponentId {
    s.parse().unwrap()
}

fn provider(uris: &[String]) -> DefaultConfigProvider {
    DefaultConfigProvider::from_uris(uris.to_vec()).unwrap()
}

#[tokio::test]
async fn snapshots_follow_update_outcomes() {
    let file = config_file(BASE);
    let uri = file.path().display().to_string();
    let mut provider = provider(&[uri]);
    let factories = components::factories().unwrap();

    assert!(provider.last_resolved_config().is_none());
    let cfg = provider.get(&factories).await.unwrap();
    assert_eq!(1, cfg.service.pipelines.len());

    let first = provider.last_resolved_config().unwrap();
    assert!(provider.last_known_good_config().is_none());

    provider.config_update_succeeded();
    assert_eq!(Some(first.clone()), provider.last_known_good_config());

    std::fs::write(
        file.path(),
        BASE.replace("  debug:\n", "  debug:\n    verbosity: detailed\n"),
    )
    .unwrap();
    let cfg = provider.get(&factories).await.unwrap();
    assert_eq!(
        "detailed",
        cfg.exporters[&id("debug")]["verbosity"]
    );

    let second = provider.last_resolved_config().unwrap();
    assert_ne!(first, second);

    // A failed apply keeps the previous known good snapshot for rollback
    provider.config_update_failed(&std::io::Error::other("exporter refused to start"));
    assert_eq!(Some(first), provider.last_known_good_config());

    provider.config_update_succeeded();
    assert_eq!(Some(second), provider.last_known_good_config());

    provider.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_reference_is_named() {
    let file = config_file(&BASE.replace("exporters: [debug]", "exporters: [debug, debug/missing]"));
    let mut provider = provider(&[file.path().display().to_string()]);

    let err = provider
        .get(&components::factories().unwrap())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("debug/missing"), "{}", err);

    // The resolved document is still kept for diagnostics
    assert!(provider.last_resolved_config().is_some());
    assert!(provider.last_known_good_config().is_none());
}

#[tokio::test]
async fn sources_merge_in_order() {
    let file = config_file(BASE);
    let mut provider = provider(&[
        file.path().display().to_string(),
        "yaml:exporters::debug::verbosity: detailed".to_string(),
    ]);

    let cfg = provider
        .get(&components::factories().unwrap())
        .await
        .unwrap();
    let debug = &cfg.exporters[&id("debug")];
    assert_eq!("detailed", debug["verbosity"]);

    // Receiver settings are the factory defaults with the user values on top
    let http = &cfg.receivers[&id("http")];
    assert_eq!("127.0.0.1:0", http["endpoint"]);
    assert_eq!("/v1/traces", http["traces_path"]);
}

#[tokio::test]
async fn environment_is_expanded() {
    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var("ROTEL_SERVICE_TEST_TRACES_PATH", "/ingest/traces") };

    let file = config_file(&BASE.replace(
        "    endpoint: 127.0.0.1:0\n",
        "    endpoint: 127.0.0.1:0\n    traces_path: ${ROTEL_SERVICE_TEST_TRACES_PATH}\n",
    ));
    let mut provider = provider(&[file.path().display().to_string()]);
    let cfg = provider
        .get(&components::factories().unwrap())
        .await
        .unwrap();

    let http = &cfg.receivers[&id("http")];
    assert_eq!(Value::from("/ingest/traces"), http["traces_path"]);
}

#[tokio::test]
async fn invalid_component_settings_fail_get() {
    let file = config_file(&BASE.replace("  debug:\n", "  debug:\n    verbosity: loud\n"));
    let mut provider = provider(&[file.path().display().to_string()]);
    let err = provider
        .get(&components::factories().unwrap())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("debug"), "{}", err);
}

#[tokio::test]
async fn missing_file_is_a_resolve_error() {
    let mut provider = provider(&["/definitely/not/here.yaml".to_string()]);
    let err = provider
        .get(&components::factories().unwrap())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("cannot resolve the configuration"), "{}", err);
    assert!(err.contains("/definitely/not/here.yaml"), "{}", err);
}

#[tokio::test]
async fn builtin_components_run_end_to_end() {
    let yaml = r#"
receivers:
  http:
    endpoint: 127.0.0.1:0
processors:
  batch:
    timeout_millis: 50
exporters:
  blackhole:
  debug:
extensions:
  health_check:
    endpoint: 127.0.0.1:0
  config_ui:
    endpoint: 127.0.0.1:0
service:
  extensions: [health_check, config_ui]
  telemetry:
    logs:
      level: debug
  pipelines:
    traces:
      receivers: [http]
      processors: [batch]
      exporters: [blackhole, debug]
    logs:
      receivers: [http]
      exporters: [blackhole]
"#;
    let file = config_file(yaml);
    let provider = provider(&[file.path().display().to_string()]);
    let mut settings =
        ServiceSettings::new(components::factories().unwrap(), Box::new(provider));
    settings.handle_signals = false;

    let service = Service::new(settings);
    let mut handle = service.handle();
    let task = tokio::spawn(service.run());

    assert_eq!(State::Running, handle.wait_for(State::Running).await);
    handle.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(State::Terminated, handle.state());
}
