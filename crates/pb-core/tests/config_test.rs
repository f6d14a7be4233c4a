use std::io::Write;
use std::time::Duration;

use pb_core::config::Config;

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("[restart]"));

    let parsed = Config::from_toml(&toml_str).expect("parse toml back");
    assert_eq!(parsed.daemon.port, cfg.daemon.port);
    assert_eq!(parsed.restart.max_restarts, cfg.restart.max_restarts);
    assert_eq!(parsed.agent.submit_timeout_secs, cfg.agent.submit_timeout_secs);
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[daemon]
port = 9100

[restart]
cooldown_secs = 5
"#;
    let cfg = Config::from_toml(partial).expect("parse partial");
    assert_eq!(cfg.daemon.port, 9100);
    assert_eq!(cfg.restart.cooldown(), Duration::from_secs(5));
    // defaults fill in the rest
    assert_eq!(cfg.restart.max_restarts, 3);
    assert_eq!(cfg.queue.inter_request_pause_ms, 1000);
    assert_eq!(cfg.general.log_format, "human");
}

#[test]
fn agent_command_and_args_parse() {
    let cfg = Config::from_toml(
        r#"
[agent]
command = "python3"
args = ["agent_driver.py", "--headless"]
submit_timeout_secs = 120
"#,
    )
    .expect("parse agent section");
    assert_eq!(cfg.agent.command.as_deref(), Some("python3"));
    assert_eq!(cfg.agent.args, vec!["agent_driver.py", "--headless"]);
    assert_eq!(cfg.agent.submit_timeout(), Duration::from_secs(120));
}

#[test]
fn zero_max_restarts_fails_validation() {
    let err = Config::from_toml("[restart]\nmax_restarts = 0\n").expect_err("must fail");
    assert!(err.to_string().contains("max_restarts"));
}

#[test]
fn unknown_log_format_fails_validation() {
    let err = Config::from_toml("[general]\nlog_format = \"xml\"\n").expect_err("must fail");
    assert!(err.to_string().contains("log_format"));
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[queue]\ninter_request_pause_ms = 250").expect("write config");

    let cfg = Config::load_from(file.path()).expect("load from file");
    assert_eq!(cfg.queue.inter_request_pause(), Duration::from_millis(250));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = Config::load_from("/definitely/not/here/config.toml").expect_err("missing file");
    assert!(err.to_string().contains("io error"));
}
