#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use courier_messenger::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
messenger:
  id: "node-a"
  reply_timout_ms: 100 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn deny_unknown_fields_top_level() {
    let bad = r#"
version: 1
messenger:
  id: "node-a"
listeners: {}
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
messenger:
  id: "node-a"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.messenger.id, "node-a");
    assert_eq!(cfg.messenger.reply_timeout(), Duration::from_millis(5000));
    assert_eq!(cfg.messenger.listener_name(), "node-a-listener");
    assert_eq!(cfg.messenger.commands_name(), "node-a-commands");
}

#[test]
fn custom_suffixes_and_timeout() {
    let ok = r#"
version: 1
messenger:
  id: "billing"
  reply_timeout_ms: 250
  listener_suffix: ".in"
  commands_suffix: ".out"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.messenger.reply_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.messenger.listener_name(), "billing.in");
    assert_eq!(cfg.messenger.commands_name(), "billing.out");
}

#[test]
fn unsupported_version() {
    let bad = r#"
version: 2
messenger:
  id: "node-a"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn out_of_range_values_are_rejected() {
    let cases = [
        ("id: \"\"", "empty id"),
        ("id: \"node a\"", "whitespace in id"),
        ("id: \"n\"\n  reply_timeout_ms: 5", "timeout too small"),
        ("id: \"n\"\n  reply_timeout_ms: 600001", "timeout too large"),
        ("id: \"n\"\n  listener_suffix: \"\"", "empty suffix"),
        ("id: \"n\"\n  listener_suffix: \"-x\"\n  commands_suffix: \"-x\"", "same suffix"),
    ];

    for (section, why) in cases {
        let yaml = format!("version: 1\nmessenger:\n  {section}\n");
        let err = config::load_from_str(&yaml).expect_err(why);
        assert_eq!(err.code().as_str(), "CONFIG", "{why}");
    }
}

#[test]
fn missing_file_is_a_config_error() {
    let err = config::load_from_file("/nonexistent/courier.yaml").expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}
