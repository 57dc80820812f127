#[cfg(test)]
mod tests {
    use std::io::Write;
    use warden_config::{ConfigLoader, WardenConfig};

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:7770");
        assert_eq!(config.governance.default_budget_usd, 50.0);
        assert_eq!(config.governance.budget_cache_ttl_secs, 60);
        assert_eq!(config.governance.max_invocations, 10_000);
        assert_eq!(config.incidents.error_rate_critical, 0.15);
        assert_eq!(config.incidents.error_rate_high, 0.08);
        assert_eq!(config.incidents.consecutive_failures, 3);
        assert_eq!(config.risk.default_iterations, 10_000);
        assert_eq!(config.drift.probe_timeout_secs, 5);
        assert!(config.drift.scan_extensions.contains(&".toml".to_string()));
    }

    #[test]
    fn test_validate_default_is_clean() {
        let config = WardenConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = WardenConfig::default();
        config.incidents.error_rate_high = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_log_format() {
        let mut config = WardenConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_exposed_listener() {
        let mut config = WardenConfig::default();
        config.server.listen = "0.0.0.0:7770".into();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("api_key"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [server]
            listen = "0.0.0.0:9000"
            cors = true

            [incidents]
            error_rate_critical = 0.25
        "#;
        let config: WardenConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert!(config.server.cors);
        assert_eq!(config.incidents.error_rate_critical, 0.25);
        // untouched sections keep defaults
        assert_eq!(config.incidents.error_rate_high, 0.08);
        assert_eq!(config.governance.default_budget_usd, 50.0);
    }

    #[test]
    fn test_loader_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[risk]\ndefault_iterations = 500").unwrap();
        let loader = ConfigLoader::load(Some(f.path())).unwrap();
        assert_eq!(loader.get().risk.default_iterations, 500);
        assert_eq!(loader.path(), f.path());
    }

    #[test]
    fn test_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().server.listen, "127.0.0.1:7770");
    }

    #[test]
    fn test_loader_rejects_invalid_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[risk]\ndefault_iterations = 0").unwrap();
        assert!(ConfigLoader::load(Some(f.path())).is_err());
    }

    #[test]
    fn test_receipts_dir_fallback() {
        let config = WardenConfig::default();
        let dir = config.gates.resolve_receipts_dir();
        assert!(dir.ends_with("receipts"));
    }
}
