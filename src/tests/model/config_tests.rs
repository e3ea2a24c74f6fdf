    use super::*;

    const FULL: &str = r#"
datetime_format: '%Y_%m_%d__%H_%M_%S'
keep_tenminutely: 12
keep_hourly: 48
keep_daily: 14
keep_weekly: 20
keep_monthly: 12

btrfs:
  uuid: '2f6a1c4e-0000-4000-8000-1234567890ab'
  mount: '/mnt/pool/'
  source: '@home'
  prefix: 'snapshots/home_'
  pre: [['systemctl', 'stop', 'postgresql']]
  post: [['systemctl', 'start', 'postgresql']]

borg:
  prefix: 'home-'
  env:
    BORG_PASSPHRASE: 'correct horse'
  extra: ['--compression', 'zstd']
  paths: ['home', 'var/lib/postgresql']
  repositories: ['/srv/borg/home', 'ssh://backup@nas/./home']
"#;

    #[test]
    fn full_yaml_config_parses() -> Result<()> {
        let cfg = BackupConfig::from_yaml(FULL)?;
        cfg.validate()?;
        assert_eq!(
            cfg.retention,
            RetentionConfig {
                keep_tenminutely: 12,
                keep_hourly: 48,
                keep_daily: 14,
                keep_weekly: 20,
                keep_monthly: 12,
            }
        );
        assert_eq!(cfg.btrfs.mount, PathBuf::from("/mnt/pool/"));
        assert_eq!(cfg.btrfs.pre, vec![vec![
            "systemctl".to_string(),
            "stop".to_string(),
            "postgresql".to_string()
        ]]);
        assert_eq!(
            cfg.borg.env.get("BORG_PASSPHRASE").map(String::as_str),
            Some("correct horse")
        );
        assert_eq!(cfg.borg.repositories.len(), 2);
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<()> {
        let cfg = BackupConfig::from_yaml(
            "btrfs:\n  mount: /mnt/pool\n  prefix: snapshots/root_\n",
        )?;
        cfg.validate()?;
        assert_eq!(cfg.datetime_format, DEFAULT_DATETIME_FORMAT);
        assert_eq!(cfg.retention, RetentionConfig::default());
        assert!(cfg.btrfs.source.is_empty());
        assert!(cfg.borg.repositories.is_empty());
        Ok(())
    }

    #[test]
    fn validation_rejects_broken_configs() -> Result<()> {
        let base = BackupConfig::from_yaml(FULL)?;

        let mut cfg = base.clone();
        cfg.btrfs.prefix.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("btrfs.prefix"), "{}", err);

        let mut cfg = base.clone();
        cfg.btrfs.mount = PathBuf::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("btrfs.mount"), "{}", err);

        let mut cfg = base.clone();
        cfg.btrfs.pre.push(Vec::new());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("btrfs.pre[1]"), "{}", err);

        let mut cfg = base.clone();
        cfg.btrfs.uuid.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("btrfs.uuid"), "{}", err);

        let mut cfg = base.clone();
        cfg.btrfs.post.push(Vec::new());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("btrfs.post[1]"), "{}", err);

        let mut cfg = base;
        cfg.datetime_format = "%H%M".to_string();
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn load_picks_the_parser_from_the_extension() -> Result<()> {
        let tmp = tempfile::tempdir().context("create tempdir")?;

        let yaml_path = tmp.path().join("backup.yaml");
        fs::write(&yaml_path, FULL).context("write yaml")?;
        let from_yaml = BackupConfig::load(&yaml_path)?;

        let json_path = tmp.path().join("backup.json");
        let json = serde_json::to_vec_pretty(&from_yaml).context("serialize config")?;
        fs::write(&json_path, json).context("write json")?;
        let from_json = BackupConfig::load(&json_path)?;

        assert_eq!(from_json.retention, from_yaml.retention);
        assert_eq!(from_json.borg.paths, from_yaml.borg.paths);
        assert_eq!(from_json.btrfs.prefix, from_yaml.btrfs.prefix);

        let err = BackupConfig::load(&tmp.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("read config"), "{}", err);
        Ok(())
    }
