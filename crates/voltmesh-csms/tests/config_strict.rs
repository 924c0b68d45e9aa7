#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use voltmesh_csms::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
csms:
  listen: "0.0.0.0:9310"
node:
  id: "node-1"
  featurez: { charge_points: true } # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.error_code().as_str(), "ProtocolError");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
node:
  id: "node-1"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.node.id.as_deref(), Some("node-1"));
    assert!(cfg.node.features.charge_points);
    assert!(cfg.node.features.charger_creation.is_none());
    assert!(!cfg.forwarding.enabled);
}

#[test]
fn node_section_is_optional() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert!(cfg.node.id.is_none());
}

#[test]
fn forwarding_requires_upstream_url() {
    let bad = r#"
version: 1
forwarding:
  enabled: true
"#;
    config::load_from_str(bad).expect_err("must fail");

    let bad_scheme = r#"
version: 1
forwarding:
  enabled: true
  upstream_url: "http://not-a-websocket"
"#;
    config::load_from_str(bad_scheme).expect_err("must fail");

    let ok = r#"
version: 1
forwarding:
  enabled: true
  upstream_url: "wss://primary.example.net/ocpp"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert!(cfg.forwarding.enabled);
}

#[test]
fn timer_ranges_are_enforced() {
    let bad = r#"
version: 1
csms:
  ping_interval_ms: 1000
"#;
    config::load_from_str(bad).expect_err("ping interval below range must fail");

    let inverted = r#"
version: 1
csms:
  ping_interval_ms: 30000
  idle_timeout_ms: 20000
"#;
    config::load_from_str(inverted).expect_err("idle <= ping must fail");
}
