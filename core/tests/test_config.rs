#[cfg(test)]
mod tests {
    use graphwire_core::config::EngineConfig;
    use graphwire_core::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_DEPTH, MAX_BLOCK_SIZE, MAX_VERSION};
    use graphwire_core::types::WireError;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.version, MAX_VERSION);
        assert_eq!(cfg.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
        assert!(!cfg.skip_unresolvable);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "version": 3, "skip_unresolvable": true }"#).unwrap();
        assert_eq!(cfg.version, 3);
        assert!(cfg.skip_unresolvable);
        assert_eq!(cfg.block_size, DEFAULT_BLOCK_SIZE);

        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for json in [
            r#"{ "version": 1 }"#,
            r#"{ "version": 5 }"#,
            r#"{ "block_size": 0 }"#,
            r#"{ "max_depth": 0 }"#,
            "not json",
        ] {
            let err = EngineConfig::from_json(json).unwrap_err();
            assert!(matches!(err, WireError::InvalidConfig(_)), "{}: {}", json, err);
        }

        let too_big = EngineConfig { block_size: MAX_BLOCK_SIZE + 1, ..EngineConfig::default() };
        assert!(too_big.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let cfg = EngineConfig { version: 2, block_size: 512, max_depth: 32, skip_unresolvable: true };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), cfg);
    }
}
