//! Concurrency, cancellation and decoding tests for `SyncPipeline`.

use std::{
    fs,
    sync::Arc,
    time::{Duration, Instant},
};

use camino::Utf8Path;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use xside_core::{
    CatalogItem, CatalogProjection, CatalogStore, CatalogStoreError, ItemId, SnapshotHandle,
    test_support::{MemoryCatalogStore, item, square},
};
use xside_data::blob::codec;
use xside_data::sync::{SyncError, SyncOptions, SyncPipeline};
use xside_data::test_support::{StubCatalogSource, StubImageSource, catalog_record};

const IMAGE: &str = "images/1/a.png";

struct Harness {
    media: TempDir,
    store: Arc<MemoryCatalogStore>,
    snapshot: SnapshotHandle,
}

/// Store whose commits block the calling thread before delegating.
struct SlowStore {
    inner: Arc<MemoryCatalogStore>,
    delay: Duration,
}

impl CatalogStore for SlowStore {
    fn replace_snapshot(&self, items: &[CatalogItem]) -> Result<(), CatalogStoreError> {
        std::thread::sleep(self.delay);
        self.inner.replace_snapshot(items)
    }

    fn load_projection(&self) -> Result<CatalogProjection, CatalogStoreError> {
        self.inner.load_projection()
    }
}

impl Harness {
    fn pipeline(&self, images: StubImageSource, options: SyncOptions) -> SyncPipeline {
        self.pipeline_with_store(images, options, self.store.clone())
    }

    fn pipeline_with_store(
        &self,
        images: StubImageSource,
        options: SyncOptions,
        store: Arc<dyn CatalogStore>,
    ) -> SyncPipeline {
        let catalog = StubCatalogSource::with_pages(vec![vec![catalog_record(
            1,
            &square(0.0, 0.0, 1.0),
            1.0,
            &[IMAGE],
        )]]);
        SyncPipeline::new(
            Arc::new(catalog),
            Arc::new(images),
            store,
            self.snapshot.clone(),
            options,
        )
    }

    fn options(&self) -> SyncOptions {
        let root = Utf8Path::from_path(self.media.path()).expect("utf-8 media root");
        SyncOptions::new(root)
    }

    fn live_ids(&self) -> Vec<ItemId> {
        self.snapshot
            .current()
            .items()
            .iter()
            .map(|projected| projected.id)
            .collect()
    }
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(MemoryCatalogStore::default());
    store
        .replace_snapshot(&[item(9, square(10.0, 10.0, 1.0), 1.0, &["images/9/z.png"])])
        .expect("seed snapshot");
    let snapshot = SnapshotHandle::new(store.load_projection().expect("seed projection"));
    Harness {
        media: TempDir::new().expect("temporary media root"),
        store,
        snapshot,
    }
}

#[rstest]
#[tokio::test]
async fn overlapping_runs_are_rejected(harness: Harness) {
    let images = StubImageSource::with_images(&[IMAGE], b"png").with_delay(Duration::from_millis(50));
    let pipeline = harness.pipeline(images, harness.options());

    let (first, second) = tokio::join!(pipeline.run(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pipeline.run().await
    });

    assert!(first.is_ok(), "first run failed: {first:?}");
    assert!(matches!(second, Err(SyncError::AlreadyRunning)));
    assert_eq!(harness.live_ids(), vec![1]);
}

#[rstest]
#[tokio::test]
async fn cancelled_run_installs_nothing(harness: Harness) {
    let images = StubImageSource::with_images(&[IMAGE], b"png").with_delay(Duration::from_secs(5));
    let pipeline = harness.pipeline(images, harness.options());

    let outcome = tokio::time::timeout(Duration::from_millis(20), pipeline.run()).await;

    assert!(outcome.is_err(), "run should have been cancelled");
    assert_eq!(harness.live_ids(), vec![9]);
    assert_eq!(harness.store.items().len(), 1);
    assert!(!harness.media.path().join(IMAGE).exists());
    let leftovers: Vec<_> = fs::read_dir(harness.media.path())
        .expect("media root readable")
        .collect();
    assert!(leftovers.is_empty(), "staging not cleaned up: {leftovers:?}");
}

#[rstest]
#[tokio::test]
async fn readers_see_previous_snapshot_until_swap(harness: Harness) {
    let images = StubImageSource::with_images(&[IMAGE], b"png").with_delay(Duration::from_millis(50));
    let pipeline = harness.pipeline(images, harness.options());
    let reader = harness.snapshot.clone();

    let (outcome, observed) = tokio::join!(pipeline.run(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        reader
            .current()
            .items()
            .iter()
            .map(|projected| projected.id)
            .collect::<Vec<ItemId>>()
    });

    outcome.expect("sync succeeds");
    assert_eq!(observed, vec![9]);
    assert_eq!(harness.live_ids(), vec![1]);
}

#[rstest]
#[tokio::test]
async fn compressed_images_are_decoded_before_staging(harness: Harness) {
    let original = b"raw image bytes".repeat(16);
    let packed = codec::compress(&original).expect("compress fixture");
    let images = StubImageSource::with_images(&[IMAGE], &packed);
    let pipeline = harness.pipeline(images, harness.options().with_decompress_images(true));

    pipeline.run().await.expect("sync succeeds");

    let stored = fs::read(harness.media.path().join(IMAGE)).expect("image promoted");
    assert_eq!(stored, original);
}

#[rstest]
#[tokio::test]
async fn undecodable_images_abort_the_run(harness: Harness) {
    let images = StubImageSource::with_images(&[IMAGE], b"not bzip2");
    let pipeline = harness.pipeline(images, harness.options().with_decompress_images(true));

    let outcome = pipeline.run().await;

    assert!(matches!(outcome, Err(SyncError::Decompress { .. })));
    assert_eq!(harness.live_ids(), vec![9]);
}

#[rstest]
#[tokio::test]
async fn blocking_store_commit_does_not_stall_the_runtime(harness: Harness) {
    let store = Arc::new(SlowStore {
        inner: harness.store.clone(),
        delay: Duration::from_millis(300),
    });
    let images = StubImageSource::with_images(&[IMAGE], b"png");
    let pipeline = harness.pipeline_with_store(images, harness.options(), store);
    let reader = harness.snapshot.clone();

    let ((outcome, run_finished), (observed, read_at)) = tokio::join!(
        async { (pipeline.run().await, Instant::now()) },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let ids: Vec<ItemId> = reader.current().items().iter().map(|hit| hit.id).collect();
            (ids, Instant::now())
        }
    );

    outcome.expect("sync succeeds");
    assert!(read_at < run_finished, "reader waited for the store commit");
    assert_eq!(observed, vec![9]);
    assert_eq!(harness.live_ids(), vec![1]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_threaded_runtime_installs_committed_snapshot(harness: Harness) {
    let images = StubImageSource::with_images(&[IMAGE], b"png");
    let pipeline = harness.pipeline(images, harness.options());

    let report = pipeline.run().await.expect("sync succeeds");

    assert_eq!(report.items_imported, 1);
    assert_eq!(harness.live_ids(), vec![1]);
    let stored: Vec<ItemId> = harness.store.items().iter().map(|stored| stored.id).collect();
    assert_eq!(stored, vec![1]);
}

#[rstest]
#[tokio::test]
async fn failed_commit_keeps_snapshot_but_media_is_already_promoted(harness: Harness) {
    let target = harness.media.path().join(IMAGE);
    fs::create_dir_all(target.parent().expect("image has a parent")).expect("media dirs");
    fs::write(&target, b"old").expect("seed media file");
    harness.store.fail_next_replace();
    let images = StubImageSource::with_images(&[IMAGE], b"new");
    let pipeline = harness.pipeline(images, harness.options());

    let outcome = pipeline.run().await;

    assert!(matches!(outcome, Err(SyncError::Store(_))), "{outcome:?}");
    assert_eq!(harness.live_ids(), vec![9]);
    assert_eq!(fs::read(&target).expect("media file readable"), b"new");
}
