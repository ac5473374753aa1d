//! Integration tests for the buildpack store

mod store_tests {
    use async_trait::async_trait;
    use buildpack_store::cache::file::LOCK_FILE;
    use buildpack_store::cache::{CacheStore, FileCacheStore};
    use buildpack_store::engine::{ContainerEngine, ExportedImage};
    use buildpack_store::extract::{parse_buildpack_config, ImageExtractor};
    use buildpack_store::fetch::{
        CachingLocalFetcher, Packager, RemoteBuildpack, RemoteFetcher,
    };
    use buildpack_store::{AcquisitionRequest, BuildpackStore, StoreError, StoreResult};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    const BUILDPACK_TOML: &str = r#"
api = "0.8"

[buildpack]
id = "some-org/registry-buildpack"
name = "Registry Buildpack"
version = "3.1.4"

[metadata]
include-files = ["bin/build", "buildpack.toml"]
pre-package = "./scripts/build.sh"
"#;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    /// A `docker save`-style archive with a single buildpack layer
    fn saved_image(path: &Path) {
        let layer = tar_bytes(&[
            ("buildpack.toml", BUILDPACK_TOML.as_bytes()),
            ("bin/build", b"#!/bin/sh"),
            ("bin/detect", b"#!/bin/sh"),
            ("bin/run", b"#!/bin/sh"),
        ]);
        let manifest = serde_json::json!([{ "Layers": ["abc123/layer.tar"] }]).to_string();
        std::fs::write(
            path,
            tar_bytes(&[
                ("manifest.json", manifest.as_bytes()),
                ("abc123/layer.tar", layer.as_slice()),
            ]),
        )
        .unwrap();
    }

    struct ArchiveEngine {
        archive: PathBuf,
    }

    #[async_trait]
    impl ContainerEngine for ArchiveEngine {
        async fn pull(&self, _reference: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn export_image(&self, reference: &str) -> StoreResult<ExportedImage> {
            ExportedImage::open(reference, &self.archive)
        }

        fn engine_name(&self) -> &str {
            "archive"
        }
    }

    /// Copies the descriptor into the artifact so tests can inspect what was packaged
    ///
    /// Packaging yields to the runtime first so concurrent resolves overlap.
    #[derive(Default)]
    struct CopyingPackager {
        sources: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Packager for CopyingPackager {
        async fn package(
            &self,
            source_dir: &Path,
            output: &Path,
            _version: &str,
            _offline: bool,
        ) -> StoreResult<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::copy(source_dir.join("buildpack.toml"), output).unwrap();
            self.sources.lock().unwrap().push(source_dir.to_path_buf());
            Ok(())
        }
    }

    struct UnusedRemote;

    #[async_trait]
    impl RemoteFetcher for UnusedRemote {
        async fn get(&self, buildpack: &RemoteBuildpack) -> StoreResult<PathBuf> {
            Err(StoreError::Internal(format!("unexpected remote fetch of {}", buildpack.slug())))
        }

        fn with_packager(&self, _packager: Arc<dyn Packager>) -> Arc<dyn RemoteFetcher> {
            Arc::new(UnusedRemote)
        }
    }

    struct Harness {
        store: BuildpackStore,
        cache: Arc<FileCacheStore>,
        packager: Arc<CopyingPackager>,
        temp: TempDir,
    }

    fn harness() -> Harness {
        harness_with_lock_timeout(Duration::from_secs(5))
    }

    fn harness_with_lock_timeout(lock_timeout: Duration) -> Harness {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("image.tar");
        saved_image(&archive);

        let cache = Arc::new(
            FileCacheStore::new(temp.path().join("cache")).with_lock_timeout(lock_timeout),
        );
        let packager = Arc::new(CopyingPackager::default());
        let local = Arc::new(CachingLocalFetcher::new(cache.clone(), packager.clone()));
        let extractor = Arc::new(ImageExtractor::new(Arc::new(ArchiveEngine { archive })));

        let scratch = temp.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let store = BuildpackStore::new(cache.clone(), local, Arc::new(UnusedRemote), extractor)
            .with_scratch_dir(scratch);

        Harness {
            store,
            cache,
            packager,
            temp,
        }
    }

    #[tokio::test]
    async fn registry_image_to_cached_artifact() {
        let h = harness();

        let artifact = h
            .store
            .resolve(&AcquisitionRequest::new("registry.example.com/org/registry-buildpack:3.1.4"))
            .await
            .unwrap();
        assert!(artifact.starts_with(h.temp.path().join("cache")));

        // The packaged descriptor reflects the extracted layout
        let config = parse_buildpack_config(&artifact).unwrap();
        assert_eq!(config.buildpack.id, "some-org/registry-buildpack");
        assert_eq!(config.metadata.include_files, vec!["bin/build", "bin/detect", "bin/run"]);
        assert!(config.metadata.pre_package.is_none());

        // The cache was closed again and recorded the declared version
        h.cache.open().await.unwrap();
        let entry = h
            .cache
            .get("registry-buildpack:3.1.4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.version, "3.1.4");
        assert_eq!(entry.uri, artifact);
        h.cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn unchanged_local_buildpack_is_packaged_once() {
        let h = harness();
        let source = h.temp.path().join("cool-buildpack");
        std::fs::create_dir_all(source.join("bin")).unwrap();
        std::fs::write(source.join("buildpack.toml"), BUILDPACK_TOML).unwrap();
        std::fs::write(source.join("bin/build"), "#!/bin/sh").unwrap();

        let request = AcquisitionRequest::new(source.to_str().unwrap());
        let first = h.store.resolve(&request).await.unwrap();
        let second = h.store.resolve(&request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.packager.sources.lock().unwrap().len(), 1);

        let offline = h.store.resolve(&request.clone().with_offline_dependencies()).await.unwrap();
        assert_ne!(offline, first);
        assert_eq!(h.packager.sources.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn held_lock_makes_cache_unavailable() {
        let h = harness_with_lock_timeout(Duration::from_millis(100));
        let other = FileCacheStore::new(h.temp.path().join("cache"));
        other.open().await.unwrap();

        let err = h
            .store
            .resolve(&AcquisitionRequest::new("registry.example.com/org/registry-buildpack"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CacheUnavailable { .. }));
        assert_eq!(err.stage(), "cache");
        other.close().await.unwrap();
    }

    #[tokio::test]
    async fn incomplete_reference_leaves_cache_closed() {
        let h = harness();
        let err = h
            .store
            .resolve(&AcquisitionRequest::new("github.com/incomplete"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("github.com/incomplete"));

        // A fresh open succeeds only if the dispatcher released the lock
        h.cache.open().await.unwrap();
        h.cache.close().await.unwrap();
    }

    fn local_source(h: &Harness, name: &str) -> PathBuf {
        let source = h.temp.path().join(name);
        std::fs::create_dir_all(source.join("bin")).unwrap();
        std::fs::write(source.join("buildpack.toml"), BUILDPACK_TOML).unwrap();
        std::fs::write(source.join("bin/build"), name).unwrap();
        source
    }

    #[tokio::test]
    async fn concurrent_resolves_on_one_store_both_succeed() {
        let h = harness();
        let first = local_source(&h, "first-buildpack");
        let second = local_source(&h, "second-buildpack");

        let first_request = AcquisitionRequest::new(first.to_str().unwrap());
        let second_request = AcquisitionRequest::new(second.to_str().unwrap());
        let (a, b) = tokio::join!(
            h.store.resolve(&first_request),
            h.store.resolve(&second_request),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.starts_with(h.temp.path().join("cache/first-buildpack")));
        assert!(b.starts_with(h.temp.path().join("cache/second-buildpack")));
        assert_eq!(h.packager.sources.lock().unwrap().len(), 2);

        // Both entries made it into the index
        h.cache.open().await.unwrap();
        assert!(h.cache.get("first-buildpack").await.unwrap().is_some());
        assert!(h.cache.get("second-buildpack").await.unwrap().is_some());
        h.cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn resolve_waits_for_other_store_to_close() {
        let h = harness();
        let source = local_source(&h, "cool-buildpack");
        let other = Arc::new(FileCacheStore::new(h.temp.path().join("cache")));
        other.open().await.unwrap();

        let releaser = tokio::spawn({
            let other = other.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                other.close().await
            }
        });

        let artifact = h
            .store
            .resolve(&AcquisitionRequest::new(source.to_str().unwrap()))
            .await
            .unwrap();
        assert!(artifact.is_file());
        releaser.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn lock_file_left_by_dead_process_is_ignored() {
        let h = harness_with_lock_timeout(Duration::from_millis(100));
        let cache_dir = h.temp.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join(LOCK_FILE), "").unwrap();

        let source = local_source(&h, "cool-buildpack");
        h.store
            .resolve(&AcquisitionRequest::new(source.to_str().unwrap()))
            .await
            .unwrap();
    }
}
