use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn explicit_config_dir_wins() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let resolved = resolve_config_dir(Some(temp_dir.path().to_path_buf()))
            .expect("explicit dir should resolve");
        assert_eq!(resolved, temp_dir.path());
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [database
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn load_applies_process_environment() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[index]\ntype = \"none\"\n\n[metrics]\nenabled = false\n",
        )
        .expect("should write config");

        // SAFETY: tests mutating the environment are serialized
        unsafe {
            std::env::set_var("INDEX_TYPE", "ivfflat");
            std::env::set_var("IVFFLAT_PROBES", "3");
        }

        let loaded = Config::load(temp_dir.path());

        // SAFETY: tests mutating the environment are serialized
        unsafe {
            std::env::remove_var("INDEX_TYPE");
            std::env::remove_var("IVFFLAT_PROBES");
        }

        let config = loaded.expect("config should load");
        assert_eq!(config.index.family, crate::store::IndexFamily::Ivfflat);
        assert_eq!(config.index.ivfflat_probes, 3);
        assert!(!config.metrics.enabled);
    }

    #[test]
    #[serial]
    fn load_rejects_invalid_environment() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        // SAFETY: tests mutating the environment are serialized
        unsafe {
            std::env::set_var("HNSW_M", "lots");
        }

        let loaded = Config::load(temp_dir.path());

        // SAFETY: tests mutating the environment are serialized
        unsafe {
            std::env::remove_var("HNSW_M");
        }

        assert!(loaded.is_err());
    }
}
