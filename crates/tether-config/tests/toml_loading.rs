//! Integration tests for TOML configuration loading.
//!
//! Uses figment::Jail for sandboxed file and env var manipulation.

use figment::{
    Figment, Jail,
    providers::{Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;
use tether_config::TetherConfig;

#[test]
fn loads_poller_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[poller]
fast_interval_ms = 1000
normal_interval_ms = 4000
fast_cycles = 10
settle_delays_ms = [1000, 3000]
max_duration_ms = 7200000
"#,
        )?;

        let config: TetherConfig = Figment::from(Serialized::defaults(TetherConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.poller.fast_interval_ms, 1000);
        assert_eq!(config.poller.normal_interval_ms, 4000);
        assert_eq!(config.poller.fast_cycles, 10);
        assert_eq!(config.poller.settle_delays_ms, vec![1000, 3000]);
        assert!(config.poller.max_duration().is_some());
        // Untouched fields keep their defaults.
        assert_eq!(config.poller.backoff_interval_ms, 15_000);
        Ok(())
    });
}

#[test]
fn loads_queue_and_executor_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[queue]
max_concurrent = 4
min_spacing_ms = 100

[executor]
max_attempts = 6
timeout_ms = 5000
"#,
        )?;

        let config: TetherConfig = Figment::from(Serialized::defaults(TetherConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.queue.max_concurrent, 4);
        assert_eq!(config.queue.min_spacing_ms, 100);
        assert_eq!(config.executor.max_attempts, 6);
        assert_eq!(config.executor.timeout_ms, 5000);
        assert_eq!(config.executor.base_delay_ms, 1000);
        Ok(())
    });
}

#[test]
fn project_local_file_is_picked_up_by_load() {
    Jail::expect_with(|jail| {
        jail.create_dir(".tether")?;
        jail.create_file(
            ".tether/config.toml",
            r#"
[api]
base_url = "http://localhost:9999"
key = "key_from_project"
"#,
        )?;

        let config = TetherConfig::load().expect("config loads");
        assert_eq!(config.api.base_url, "http://localhost:9999");
        assert!(config.api.is_configured());
        Ok(())
    });
}

#[test]
fn invalid_value_in_file_fails_validation() {
    Jail::expect_with(|jail| {
        jail.create_dir(".tether")?;
        jail.create_file(
            ".tether/config.toml",
            r#"
[queue]
max_concurrent = 0
"#,
        )?;

        assert!(TetherConfig::load().is_err());
        Ok(())
    });
}
