//! Integration tests for pkgcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn pkgcache(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("pkgcache");
        cmd.env_remove("PKGCACHE_DATABASE")
            .arg("--config")
            .arg(dir.path().join("config.toml"))
            .arg("--database")
            .arg(dir.path().join("cache.json"));
        cmd
    }

    fn seed_database(path: &Path) {
        let document = serde_json::json!({
            "identifier": "6f1c2a5e-3b7d-4c1e-9a0b-2d4e6f8a0c1e",
            "lastChangeNumber": 77,
            "packagesData": {
                "100": {
                    "appIDs": [440, 570],
                    "changeNumber": 5,
                    "validUntil": "2999-01-01T00:00:00Z",
                    "accessToken": 0
                },
                "200": {
                    "appIDs": [730],
                    "changeNumber": 5,
                    "validUntil": "2999-01-01T00:00:00Z",
                    "accessToken": 0
                },
                "300": {
                    "appIDs": [440],
                    "changeNumber": 6,
                    "validUntil": "2000-01-01T00:00:00Z",
                    "accessToken": 0
                }
            }
        });
        std::fs::write(path, serde_json::to_string(&document).unwrap()).unwrap();
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        pkgcache(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Persisted package metadata cache"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        pkgcache(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pkgcache"));
    }

    #[test]
    fn show_creates_database() {
        let dir = TempDir::new().unwrap();
        pkgcache(&dir)
            .args(["show", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"identifier\""));

        let content = std::fs::read_to_string(dir.path().join("cache.json")).unwrap();
        let document: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(document["identifier"].is_string());
        assert!(document.get("packagesData").is_none());
    }

    #[test]
    fn show_reports_seeded_database() {
        let dir = TempDir::new().unwrap();
        seed_database(&dir.path().join("cache.json"));

        pkgcache(&dir)
            .args(["show", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("6f1c2a5e-3b7d-4c1e-9a0b-2d4e6f8a0c1e"))
            .stdout(predicate::str::contains("\"last_change_number\": 77"))
            .stdout(predicate::str::contains("\"expired_packages\": 1"));
    }

    #[test]
    fn lookup_finds_matching_packages() {
        let dir = TempDir::new().unwrap();
        seed_database(&dir.path().join("cache.json"));

        pkgcache(&dir)
            .args(["lookup", "440", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[100,300]"));
    }

    #[test]
    fn lookup_limits_candidates() {
        let dir = TempDir::new().unwrap();
        seed_database(&dir.path().join("cache.json"));

        pkgcache(&dir)
            .args(["lookup", "440", "0", "200", "300", "999"])
            .assert()
            .success()
            .stdout(predicate::eq("300\n"));
    }

    #[test]
    fn lookup_rejects_zero_group() {
        let dir = TempDir::new().unwrap();
        pkgcache(&dir)
            .args(["lookup", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid argument"));
    }

    #[test]
    fn empty_database_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cache.json"), b"").unwrap();

        pkgcache(&dir)
            .arg("show")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Database file is empty"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        pkgcache(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        pkgcache(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[database]"));
    }
}

mod cache_tests {
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use pkgcache::{PackageFetcher, PackageRecord, PersistenceController, RefreshOutcome};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PackageFetcher for CountingFetcher {
        async fn fetch_package_data(
            &self,
            ids: &BTreeSet<u32>,
        ) -> Option<HashMap<u32, PackageRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(
                ids.iter()
                    .map(|&id| {
                        let record =
                            PackageRecord::new([id + 1], 5, Utc::now() + ChronoDuration::days(7));
                        (id, record)
                    })
                    .collect(),
            )
        }
    }

    #[tokio::test]
    async fn refreshed_packages_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let controller = PersistenceController::create_or_load(&path).await.unwrap();
        controller.save().await.unwrap();
        let saver = controller.spawn_saver(Duration::from_millis(20));

        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        let outcome = controller
            .state()
            .coordinator()
            .refresh(Some(&fetcher), &HashMap::from([(100, 5)]))
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Refreshed { count: 1 });

        // Second pass finds everything fresh
        let outcome = controller
            .state()
            .coordinator()
            .refresh(Some(&fetcher), &HashMap::from([(100, 5)]))
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::UpToDate);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        saver.shutdown().await;

        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();
        let record = reloaded.state().packages().get(100).unwrap();
        assert_eq!(record.change_number, 5);
        assert_eq!(
            reloaded.state().identifier(),
            controller.state().identifier()
        );
    }

    #[tokio::test]
    async fn change_feed_drives_refresh_and_watermark() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let controller = PersistenceController::create_or_load(&path).await.unwrap();
        let state = controller.state();

        state
            .packages()
            .upsert_records(HashMap::from([(
                100,
                PackageRecord::new([1], 3, Utc::now() + ChronoDuration::days(1)),
            )]))
            .unwrap();

        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        let first = state
            .on_change_number_update(5, Some(&fetcher))
            .await
            .unwrap();
        let duplicate = state
            .on_change_number_update(5, Some(&fetcher))
            .await
            .unwrap();

        assert_eq!(first, Some(RefreshOutcome::Refreshed { count: 1 }));
        assert!(duplicate.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.last_change_number(), 5);

        controller.save().await.unwrap();
        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();
        assert_eq!(reloaded.state().last_change_number(), 5);
        assert_eq!(reloaded.state().packages().get(100).unwrap().change_number, 5);
    }
}
