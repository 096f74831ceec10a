//! Configuration checking across every subsystem.

use std::sync::Arc;

use neon_config::Config;
use neon_core::registry::ModuleRegistry;
use neon_instance::{Instance, InstanceError, InstanceState};

fn registry() -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::new();
    neon_modules::register_builtin_modules(&registry).unwrap();
    Arc::new(registry)
}

#[test]
fn check_accumulates_every_problem_in_one_run() {
    // Four distinct problems: no storage selection, a doubled fetcher
    // provider entry, a zero worker pool, and a server with no
    // listeners or sites.
    let config = Config::parse(
        r#"
fetcher:
  providers:
    doubled:
      rest: {}
      soap: {}
loader:
  execWorkers: 0
"#,
        "yaml",
    )
    .unwrap();

    let mut instance = Instance::new(config, registry());
    let err = instance.check().unwrap_err();
    let InstanceError::Check(report) = err else {
        panic!("expected a check error");
    };

    assert!(report.iter().any(|line| line.contains("storage")));
    assert!(report.iter().any(|line| line.contains("doubled")));
    assert!(report.iter().any(|line| line.contains("execWorkers")));
    assert!(
        report
            .iter()
            .any(|line| line.contains("at least one listener"))
    );
    assert!(report.iter().any(|line| line.contains("at least one site")));
    assert_eq!(instance.state(), InstanceState::Created);
}

#[test]
fn valid_config_reaches_the_checked_state() {
    let config = Config::parse(
        r#"
store:
  storage:
    memory: {}
server:
  listeners:
    default:
      tcp:
        address: 127.0.0.1
        port: 0
  sites:
    main:
      listeners: [default]
      routes:
        /:
          handler:
            text:
              body: ok
"#,
        "yaml",
    )
    .unwrap();

    let mut instance = Instance::new(config, registry());
    instance.check().unwrap();
    assert_eq!(instance.state(), InstanceState::Checked);
}

#[test]
fn unknown_module_ids_are_reported_with_their_full_dotted_id() {
    let config = Config::parse(
        r#"
store:
  storage:
    void: {}
server:
  listeners:
    default:
      quic: {}
  sites:
    main:
      listeners: [default]
      routes: {}
"#,
        "yaml",
    )
    .unwrap();

    let mut instance = Instance::new(config, registry());
    let InstanceError::Check(report) = instance.check().unwrap_err() else {
        panic!("expected a check error");
    };
    assert!(
        report
            .iter()
            .any(|line| line.contains("app.store.storage.void"))
    );
    assert!(
        report
            .iter()
            .any(|line| line.contains("app.server.listener.quic"))
    );
}
