//! Integration tests for the capture → stage → finalize flow.
//!
//! Upload and OCR collaborators are in-process fakes, so these run offline.
//! Input pages are real images written to a temp directory.
//!
//! A live vision-model test is gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 OPENAI_API_KEY=… cargo test --test staging -- --nocapture

use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use journal_capture::backend::local::LocalStore;
use journal_capture::backend::vision::VisionOcr;
use journal_capture::pipeline::heic::HeicConverter;
use journal_capture::{
    Camera, CameraError, CaptureConfig, CaptureError, CaptureSession, Direction, FrameSource,
    ItemError, OcrError, OcrResults, OcrService, StagingProgressCallback, UploadError,
    UploadReceipt, Uploader,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Records uploads; fails any file whose name contains "reject".
#[derive(Default)]
struct FakeUploader {
    uploads: Mutex<Vec<(String, String, usize)>>,
    next: AtomicUsize,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadReceipt, UploadError> {
        if file_name.contains("reject") {
            return Err(UploadError::Status {
                status: 413,
                body: "too large".into(),
            });
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        self.uploads
            .lock()
            .unwrap()
            .push((file_name.to_string(), mime_type.to_string(), bytes.len()));
        Ok(UploadReceipt {
            remote_id: format!("media-{n}"),
            url: format!("https://cdn.test/media-{n}.jpg"),
        })
    }
}

/// Answers in reverse order with `text of <id>`, recording every request.
#[derive(Default)]
struct FakeOcr {
    calls: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl OcrService for FakeOcr {
    async fn extract_text(&self, remote_ids: &[String]) -> Result<OcrResults, OcrError> {
        self.calls.lock().unwrap().push(remote_ids.to_vec());
        if self.fail {
            return Err(OcrError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        let mut results = OcrResults::new();
        for id in remote_ids.iter().rev() {
            results.insert(id.clone(), format!("text of {id}"));
        }
        Ok(results)
    }
}

/// Pretends to convert HEIC by returning a fixed PNG.
struct PngConverter;

#[async_trait]
impl HeicConverter for PngConverter {
    async fn convert(&self, _heic: &[u8]) -> Result<Vec<u8>, String> {
        Ok(png_bytes(40, 30))
    }
}

struct BrokenConverter;

#[async_trait]
impl HeicConverter for BrokenConverter {
    async fn convert(&self, _heic: &[u8]) -> Result<Vec<u8>, String> {
        Err("heif-convert: not a HEIF file".into())
    }
}

/// Hands out queued frames; counts device opens and closes.
#[derive(Default)]
struct FakeFrames {
    frames: Vec<Vec<u8>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for FakeFrames {
    async fn open(&mut self) -> Result<(), CameraError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    async fn grab(&mut self) -> Result<Vec<u8>, CameraError> {
        if self.frames.is_empty() {
            return Err(CameraError::Device("no frame".into()));
        }
        Ok(self.frames.remove(0))
    }
    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingProgress {
    staged: AtomicUsize,
    failed: AtomicUsize,
    finalized: AtomicUsize,
}

impl StagingProgressCallback for CountingProgress {
    fn on_item_staged(&self, _index: usize, _total: usize, _name: &str, _bytes: usize) {
        self.staged.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_error(&self, _index: usize, _total: usize, _name: &str, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_finalize_complete(&self, _pages: usize, _text_len: usize) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test writer; `RUST_LOG=debug` shows the encode ladder.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 5 % 256) as u8, (y * 7 % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn write_page(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn session(uploader: Arc<FakeUploader>) -> CaptureSession {
    let config = CaptureConfig::builder()
        .max_dimension_px(32)
        .build()
        .unwrap();
    CaptureSession::new(&config, uploader)
}

// ── Staging ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_continues_past_bad_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write_page(dir.path(), "p1.png", &png_bytes(64, 48)),
        write_page(dir.path(), "notes.txt", b"not an image"),
        write_page(dir.path(), "p2.heic", b"ftypheic-garbage"),
        write_page(dir.path(), "p3.png", &png_bytes(20, 20)),
        dir.path().join("missing.png"),
    ];

    let uploader = Arc::new(FakeUploader::default());
    let progress = Arc::new(CountingProgress::default());
    let mut session = session(uploader.clone())
        .with_converter(Arc::new(BrokenConverter))
        .with_progress(progress.clone());

    let report = session.stage_files(&files).await;

    assert_eq!(report.staged, 2);
    assert_eq!(report.errors.len(), 3);
    assert!(matches!(report.errors[0], ItemError::UnsupportedInput { .. }));
    assert!(matches!(report.errors[1], ItemError::FormatUnsupported { .. }));
    assert!(matches!(report.errors[2], ItemError::ReadFailed { .. }));
    assert_eq!(report.errors[1].name(), "p2.heic");

    assert_eq!(progress.staged.load(Ordering::SeqCst), 2);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 3);

    let names: Vec<_> = session
        .queue()
        .items()
        .iter()
        .map(|i| i.file_name.as_str())
        .collect();
    assert_eq!(names, ["p1.jpg", "p3.jpg"]);
}

#[tokio::test]
async fn pages_are_normalised_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write_page(dir.path(), "wide.png", &png_bytes(64, 48)),
        write_page(dir.path(), "IMG_0001.HEIC", b"heic"),
    ];

    let uploader = Arc::new(FakeUploader::default());
    let mut session = session(uploader.clone()).with_converter(Arc::new(PngConverter));
    let report = session.stage_files(&files).await;
    assert_eq!(report.staged, 2, "{:?}", report.errors);

    let uploads = uploader.uploads.lock().unwrap().clone();
    assert_eq!(uploads[0].0, "wide.jpg");
    assert_eq!(uploads[1].0, "IMG_0001.jpg");
    assert!(uploads.iter().all(|(_, mime, _)| mime == "image/jpeg"));

    let items = session.queue().items();
    assert_eq!((items[0].width, items[0].height), (32, 24));
    assert_eq!((items[1].width, items[1].height), (32, 24));
    for item in items {
        let preview = std::fs::read(item.preview.path()).unwrap();
        assert_eq!(&preview[..2], &[0xFF, 0xD8], "preview is a JPEG");
        assert_eq!(preview.len(), item.byte_len);
    }
}

#[tokio::test]
async fn upload_failure_skips_only_that_page() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write_page(dir.path(), "a.png", &png_bytes(16, 16)),
        write_page(dir.path(), "reject-me.png", &png_bytes(16, 16)),
        write_page(dir.path(), "b.png", &png_bytes(16, 16)),
    ];

    let uploader = Arc::new(FakeUploader::default());
    let mut session = session(uploader.clone());
    let report = session.stage_files(&files).await;

    assert_eq!(report.staged, 2);
    match &report.errors[0] {
        ItemError::Upload { name, source } => {
            assert_eq!(name, "reject-me.png");
            assert!(matches!(source, UploadError::Status { status: 413, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.queue().remote_ids(), ["media-0", "media-1"]);
}

// ── Finalize ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn finalize_follows_rearranged_order() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = ["a.png", "b.png", "c.png"]
        .iter()
        .map(|n| write_page(dir.path(), n, &png_bytes(16, 16)))
        .collect();

    let uploader = Arc::new(FakeUploader::default());
    let progress = Arc::new(CountingProgress::default());
    let mut session = session(uploader).with_progress(progress.clone());
    session.stage_files(&files).await;

    // [a, b, c] → [c, a, b]
    assert!(session.queue_mut().move_item(2, Direction::Up));
    assert!(session.queue_mut().move_item(1, Direction::Up));
    let previews: Vec<PathBuf> = session
        .queue()
        .items()
        .iter()
        .map(|i| i.preview.path().to_path_buf())
        .collect();

    let ocr = FakeOcr::default();
    let capture = session.finalize(&ocr).await.unwrap().unwrap();

    assert_eq!(capture.remote_ids, ["media-2", "media-0", "media-1"]);
    assert_eq!(
        capture.text,
        "--- Page 1 ---\n\ntext of media-2\n\n\
         --- Page 2 ---\n\ntext of media-0\n\n\
         --- Page 3 ---\n\ntext of media-1"
    );
    assert_eq!(ocr.calls.lock().unwrap().len(), 1);
    assert!(session.queue().is_empty());
    assert!(previews.iter().all(|p| !p.exists()));
    assert_eq!(progress.finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn removed_pages_are_not_sent_to_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = ["a.png", "b.png", "c.png"]
        .iter()
        .map(|n| write_page(dir.path(), n, &png_bytes(16, 16)))
        .collect();

    let mut session = session(Arc::new(FakeUploader::default()));
    session.stage_files(&files).await;
    let dropped = session.queue().items()[1].preview.path().to_path_buf();
    assert!(session.queue_mut().remove_item(1));
    assert!(!dropped.exists());

    let ocr = FakeOcr::default();
    let capture = session.finalize(&ocr).await.unwrap().unwrap();
    assert_eq!(ocr.calls.lock().unwrap()[0], ["media-0", "media-2"]);
    assert!(capture.text.starts_with("--- Page 1 ---\n\ntext of media-0"));
}

#[tokio::test]
async fn failed_ocr_keeps_queue_for_retry() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write_page(dir.path(), "a.png", &png_bytes(16, 16)),
        write_page(dir.path(), "b.png", &png_bytes(16, 16)),
    ];

    let mut session = session(Arc::new(FakeUploader::default()));
    session.stage_files(&files).await;

    let broken = FakeOcr {
        fail: true,
        ..Default::default()
    };
    let err = session.finalize(&broken).await.unwrap_err();
    assert!(matches!(err, OcrError::Status { status: 502, .. }));
    assert_eq!(session.queue().remote_ids(), ["media-0", "media-1"]);
    assert!(session
        .queue()
        .items()
        .iter()
        .all(|i| i.preview.path().exists()));

    let ocr = FakeOcr::default();
    let capture = session.finalize(&ocr).await.unwrap().unwrap();
    assert_eq!(capture.remote_ids, ["media-0", "media-1"]);
}

#[tokio::test]
async fn finalize_with_nothing_staged_is_a_no_op() {
    let mut session = session(Arc::new(FakeUploader::default()));
    let ocr = FakeOcr::default();
    assert!(session.finalize(&ocr).await.unwrap().is_none());
    assert!(ocr.calls.lock().unwrap().is_empty());
}

// ── Camera ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn camera_frame_is_staged_and_camera_released() {
    let source = FakeFrames {
        frames: vec![png_bytes(64, 48)],
        ..Default::default()
    };
    let (opened, closed) = (source.opened.clone(), source.closed.clone());
    let mut camera = Camera::new(source);

    let uploader = Arc::new(FakeUploader::default());
    let progress = Arc::new(CountingProgress::default());
    let mut session = session(uploader.clone()).with_progress(progress.clone());

    let staged = session.capture_frame(&mut camera).await.unwrap();
    assert_eq!(staged.file_name, "capture-1.jpg");
    assert_eq!((staged.width, staged.height), (32, 24));

    assert!(!camera.is_active());
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(session.queue().len(), 1);
    assert_eq!(uploader.uploads.lock().unwrap()[0].0, "capture-1.jpg");
    assert_eq!(progress.staged.load(Ordering::SeqCst), 1);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_frame_leaves_camera_streaming() {
    init_tracing();
    let source = FakeFrames {
        frames: vec![b"not a jpeg".to_vec(), png_bytes(16, 16)],
        ..Default::default()
    };
    let (opened, closed) = (source.opened.clone(), source.closed.clone());
    let mut camera = Camera::new(source);

    let uploader = Arc::new(FakeUploader::default());
    let progress = Arc::new(CountingProgress::default());
    let mut session = session(uploader.clone()).with_progress(progress.clone());

    let err = session.capture_frame(&mut camera).await.unwrap_err();
    assert!(matches!(
        err,
        CaptureError::Item(ItemError::DecodeFailed { ref name, .. }) if name == "capture-1.jpg"
    ));
    assert!(camera.is_active());
    assert_eq!(closed.load(Ordering::SeqCst), 0);
    assert!(session.queue().is_empty());
    assert!(uploader.uploads.lock().unwrap().is_empty());
    assert_eq!(progress.failed.load(Ordering::SeqCst), 1);

    // Retry on the still-open stream: no second acquire.
    session.capture_frame(&mut camera).await.unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(!camera.is_active());
    assert_eq!(session.queue().len(), 1);
    assert_eq!(progress.staged.load(Ordering::SeqCst), 1);
}

// ── Live vision OCR (gated) ──────────────────────────────────────────────────

#[tokio::test]
async fn test_local_store_with_vision_model() {
    init_tracing();
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let page = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/page.jpg");
    if !page.exists() {
        println!("SKIP — test file not found: {}", page.display());
        return;
    }

    let store_dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig::builder()
        .store_dir(store_dir.path())
        .build()
        .unwrap();
    let store = LocalStore::new(store_dir.path());
    let ocr = match VisionOcr::from_config(store.clone(), &config) {
        Ok(ocr) => ocr,
        Err(e) => {
            println!("SKIP — no provider: {e}");
            return;
        }
    };

    let mut session = CaptureSession::new(&config, Arc::new(store));
    let report = session.stage_files(&[page]).await;
    assert_eq!(report.staged, 1, "{:?}", report.errors);

    let capture = session.finalize(&ocr).await.unwrap().unwrap();
    println!("{}", capture.text);
    assert!(capture.text.starts_with("--- Page 1 ---"));
    assert!(capture.text.len() > "--- Page 1 ---\n\n".len());
}
