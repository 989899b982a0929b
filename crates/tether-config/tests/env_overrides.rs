use figment::Jail;
use tether_config::TetherConfig;

#[test]
fn env_sets_api_key() {
    Jail::expect_with(|jail| {
        jail.set_env("TETHER_API__KEY", "key_from_env");

        let config = TetherConfig::load().expect("config loads");
        assert_eq!(config.api.key, "key_from_env");
        assert!(config.require_api().is_ok());
        Ok(())
    });
}

#[test]
fn env_beats_project_file() {
    Jail::expect_with(|jail| {
        jail.create_dir(".tether")?;
        jail.create_file(
            ".tether/config.toml",
            r#"
[poller]
normal_interval_ms = 8000
"#,
        )?;
        jail.set_env("TETHER_POLLER__NORMAL_INTERVAL_MS", "3000");

        let config = TetherConfig::load().expect("config loads");
        assert_eq!(config.poller.normal_interval_ms, 3000);
        Ok(())
    });
}
