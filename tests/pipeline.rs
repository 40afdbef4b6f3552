//! Integration tests for the analysis pipeline.
//!
//! The orchestrator is driven with a recording fake rasterizer and a fake
//! model client, so these run offline and without pdfium. The HTTP client is
//! exercised against a one-shot responder on 127.0.0.1. The single pdfium
//! test skips itself when no pdfium library can be bound.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use archscan::pipeline::render::{bind_pdfium, page_image_path};
use archscan::{
    analyze, analyze_sync, analyze_to_file, inspect, AnalysisConfig, AnalysisError,
    AnalysisProgressCallback, AnalysisResult, ChatCompletionsClient, EncodeError, EncodedImage,
    PageRasterizer, PdfiumRasterizer, ResponseEnvelope, VisionClient,
};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Writes `pages` small JPEGs per PDF and records which PDFs it was given.
struct RecordingRasterizer {
    pages: usize,
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingRasterizer {
    fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageRasterizer for RecordingRasterizer {
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
        self.calls.lock().unwrap().push(pdf.to_path_buf());
        (1..=self.pages)
            .map(|n| {
                let path = page_image_path(out_dir, n);
                RgbImage::from_pixel(120, 160, Rgb([240, 230, 210]))
                    .save(&path)
                    .map_err(|e| AnalysisError::Internal(e.to_string()))?;
                Ok(path)
            })
            .collect()
    }
}

/// Returns a canned envelope and remembers what it was sent.
struct FakeClient {
    response: Value,
    calls: AtomicUsize,
    images_sent: Mutex<Vec<PathBuf>>,
}

impl FakeClient {
    fn answering(text: &str) -> Arc<Self> {
        Self::with_response(json!({
            "id": "chatcmpl-test",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        }))
    }

    fn with_response(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
            images_sent: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionClient for FakeClient {
    async fn analyze(
        &self,
        images: &[EncodedImage],
        _material_types: &[String],
    ) -> Result<ResponseEnvelope, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images_sent
            .lock()
            .unwrap()
            .extend(images.iter().map(|i| i.path.clone()));
        Ok(ResponseEnvelope(self.response.clone()))
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl AnalysisProgressCallback for EventLog {
    fn on_discovery(&self, pdfs: usize, images: usize) {
        self.push(format!("discovery {pdfs} {images}"));
    }
    fn on_sampled(&self, sampled: usize, pool: usize) {
        self.push(format!("sampled {sampled} {pool}"));
    }
    fn on_image_dropped(&self, path: &Path, _error: &str) {
        self.push(format!("dropped {}", path.file_name().unwrap().to_string_lossy()));
    }
    fn on_request_sent(&self, images: usize) {
        self.push(format!("request {images}"));
    }
}

impl EventLog {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(64, 48, Rgb([90, 80, 70]))
        .save(&path)
        .unwrap();
    path
}

fn config_with(
    output: &Path,
    rasterizer: Arc<RecordingRasterizer>,
    client: Arc<FakeClient>,
) -> AnalysisConfig {
    AnalysisConfig::builder()
        .output_dir(output)
        .seed(7)
        .rasterizer(rasterizer)
        .client(client)
        .build()
        .unwrap()
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_pdf_is_rasterised_and_pooled() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let pdf = input.path().join("ledger.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 placeholder").unwrap();

    let rasterizer = RecordingRasterizer::new(3);
    let client = FakeClient::answering("Bound account ledger, c. 1900.");
    let config = config_with(output.path(), rasterizer.clone(), client.clone());

    let result = analyze(input.path(), &config).await.unwrap();

    assert_eq!(result.total_pdfs, 1);
    assert_eq!(result.total_images, 3);
    assert_eq!(rasterizer.calls(), vec![pdf]);
    let page_dir = output.path().join("ledger");
    for n in 1..=3 {
        assert!(page_dir.join(format!("page_{n}.jpg")).is_file());
    }

    assert_eq!(result.sampled_images.len(), 3);
    assert_eq!(client.calls(), 1);
    assert_eq!(client.images_sent.lock().unwrap().len(), 3);
    assert_eq!(result.analysis, "Bound account ledger, c. 1900.");
    assert_eq!(result.raw_response["id"], "chatcmpl-test");
}

#[tokio::test]
async fn test_pdfs_sharing_a_stem_keep_separate_pages() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("scan.pdf"), b"%PDF-1.4 lower").unwrap();
    std::fs::write(input.path().join("scan.PDF"), b"%PDF-1.4 upper").unwrap();

    let rasterizer = RecordingRasterizer::new(3);
    let client = FakeClient::answering("Two volumes of one inventory.");
    let config = config_with(output.path(), rasterizer.clone(), client.clone());

    let result = analyze(input.path(), &config).await.unwrap();

    assert_eq!(result.total_pdfs, 2);
    assert_eq!(result.total_images, 6);
    assert_eq!(rasterizer.calls().len(), 2);
    for dir in ["scan", "scan_2"] {
        for n in 1..=3 {
            assert!(output.path().join(dir).join(format!("page_{n}.jpg")).is_file());
        }
    }

    assert_eq!(result.sampled_images.len(), 5);
    let unique: HashSet<_> = result.sampled_images.iter().collect();
    assert_eq!(unique.len(), 5, "duplicate page in {:?}", result.sampled_images);
    let sent: HashSet<_> = client.images_sent.lock().unwrap().iter().cloned().collect();
    assert_eq!(sent.len(), 5);
}

#[test]
fn test_analyze_sync_runs_without_a_caller_runtime() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("album.pdf"), b"%PDF-1.4 placeholder").unwrap();
    write_jpeg(input.path(), "loose_print.jpg");

    let rasterizer = RecordingRasterizer::new(2);
    let client = FakeClient::answering("Historical photographs.");
    let config = config_with(output.path(), rasterizer.clone(), client.clone());

    let result = analyze_sync(input.path(), &config).unwrap();

    assert_eq!(result.total_pdfs, 1);
    assert_eq!(result.total_images, 3);
    assert_eq!(result.analysis, "Historical photographs.");
    assert_eq!(rasterizer.calls(), vec![input.path().join("album.pdf")]);
    assert_eq!(client.calls(), 1);
    assert!(result.dropped_images.is_empty());
}

#[tokio::test]
async fn test_empty_directory_makes_no_model_call() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("notes.txt"), b"not a scan").unwrap();

    let rasterizer = RecordingRasterizer::new(3);
    let client = FakeClient::answering("unused");
    let config = config_with(output.path(), rasterizer.clone(), client.clone());

    let err = analyze(input.path(), &config).await.unwrap_err();
    assert!(matches!(err, AnalysisError::NoInputFiles { .. }), "{err:?}");
    assert_eq!(client.calls(), 0);
    assert!(rasterizer.calls().is_empty());

    // No key and no client: the empty directory is still reported first.
    let bare = AnalysisConfig::builder()
        .output_dir(output.path())
        .build()
        .unwrap();
    let err = analyze(input.path(), &bare).await.unwrap_err();
    assert!(matches!(err, AnalysisError::NoInputFiles { .. }), "{err:?}");
}

#[tokio::test]
async fn test_malformed_response_writes_no_result_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_jpeg(input.path(), "card_01.jpg");

    let client = FakeClient::with_response(json!({"object": "chat.completion"}));
    let config = config_with(output.path(), RecordingRasterizer::new(0), client.clone());

    let err = analyze_to_file(input.path(), &config).await.unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedResponse { .. }), "{err:?}");
    assert_eq!(client.calls(), 1);
    assert!(!output.path().join("analysis_result.json").exists());
}

#[tokio::test]
async fn test_analyze_to_file_persists_result() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.jpg", "c.JPEG"] {
        write_jpeg(input.path(), name);
    }
    let client = FakeClient::answering("Photograph index cards.");
    let config = config_with(
        &output.path().join("nested"),
        RecordingRasterizer::new(0),
        client,
    );

    let result = analyze_to_file(input.path(), &config).await.unwrap();

    let saved = std::fs::read_to_string(output.path().join("nested/analysis_result.json")).unwrap();
    let parsed: AnalysisResult = serde_json::from_str(&saved).unwrap();
    assert_eq!(parsed, result);
    assert_eq!(parsed.total_pdfs, 0);
    assert_eq!(parsed.total_images, 3);
    assert!(parsed.sampled_images[0].ends_with("a.jpg"));
    assert!(saved.contains("\n  \"analysis\""), "pretty-printed JSON expected");
}

#[tokio::test]
async fn test_undecodable_image_is_dropped_but_still_listed() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_jpeg(input.path(), "page_a.jpg");
    std::fs::write(input.path().join("page_b.jpg"), b"\xFF\xD8\xFFtruncated").unwrap();
    write_jpeg(input.path(), "page_c.jpg");

    let log = Arc::new(EventLog::default());
    let client = FakeClient::answering("Diaries.");
    let config = AnalysisConfig::builder()
        .output_dir(output.path())
        .rasterizer(RecordingRasterizer::new(0))
        .client(client.clone())
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let result = analyze(input.path(), &config).await.unwrap();

    assert_eq!(result.sampled_images.len(), 3);
    let sent = client.images_sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|p| !p.ends_with("page_b.jpg")));
    assert_eq!(result.dropped_images.len(), 1);
    assert!(result.dropped_images[0].path().ends_with("page_b.jpg"));
    assert!(matches!(result.dropped_images[0], EncodeError::Decode { .. }));
    assert_eq!(
        log.events(),
        vec![
            "discovery 0 3",
            "sampled 3 3",
            "dropped page_b.jpg",
            "request 2",
        ]
    );
}

#[tokio::test]
async fn test_every_image_undecodable_is_fatal() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for name in ["x.jpg", "y.png"] {
        std::fs::write(input.path().join(name), b"garbage").unwrap();
    }
    let client = FakeClient::answering("unused");
    let config = config_with(output.path(), RecordingRasterizer::new(0), client.clone());

    let err = analyze(input.path(), &config).await.unwrap_err();
    assert!(
        matches!(err, AnalysisError::NoEncodableImages { sampled: 2, .. }),
        "{err:?}"
    );
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_missing_api_key_is_reported_when_there_is_work() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_jpeg(input.path(), "scan.jpg");

    let config = AnalysisConfig::builder()
        .output_dir(output.path())
        .build()
        .unwrap();
    let err = analyze(input.path(), &config).await.unwrap_err();
    assert!(matches!(err, AnalysisError::MissingApiKey), "{err:?}");
}

#[tokio::test]
async fn test_sample_is_capped_and_seeded() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..10 {
        write_jpeg(input.path(), &format!("image_{i}.jpg"));
    }

    let run = || async {
        let config = config_with(
            output.path(),
            RecordingRasterizer::new(0),
            FakeClient::answering("ok"),
        );
        analyze(input.path(), &config).await.unwrap().sampled_images
    };
    let first = run().await;
    let second = run().await;

    assert_eq!(first.len(), 5);
    assert!(first[0].ends_with("image_0.jpg"));
    assert!(first[1].ends_with("image_1.jpg"));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_inspect_lists_without_a_key() {
    let input = tempfile::tempdir().unwrap();
    write_jpeg(input.path(), "photo.jpg");
    std::fs::write(input.path().join("broken.png"), b"nope").unwrap();
    std::fs::write(input.path().join("catalog.pdf"), b"%PDF-1.4").unwrap();

    let inventory = inspect(input.path()).await.unwrap();
    assert_eq!(inventory.pdfs, vec![input.path().join("catalog.pdf")]);
    assert_eq!(inventory.images.len(), 1);
    assert_eq!(
        (inventory.images[0].width, inventory.images[0].height),
        (64, 48)
    );
    assert_eq!(inventory.unreadable.len(), 1);
    assert!(inventory.unreadable[0].0.ends_with("broken.png"));
}

#[test]
fn test_collaborators_are_send_sync() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<archscan::NoopProgressCallback>();
    assert_send_sync::<dyn AnalysisProgressCallback>();
    assert_send_sync::<dyn VisionClient>();
    assert_send_sync::<dyn PageRasterizer>();
    assert_send_sync::<AnalysisConfig>();
}

// ── HTTP transport ───────────────────────────────────────────────────────────

/// Serve one HTTP response, then hand back the raw request it received.
async fn one_shot_responder(
    status: u16,
    body: String,
) -> (SocketAddr, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    });

    (addr, handle)
}

fn request_complete(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    buf.len() >= header_end + 4 + content_length
}

fn http_config(addr: SocketAddr) -> AnalysisConfig {
    AnalysisConfig::builder()
        .api_key("sk-test-123456")
        .api_url(format!("http://{addr}/v1/chat/completions"))
        .model("vision-test")
        .max_tokens(321)
        .request_timeout_secs(10)
        .build()
        .unwrap()
}

fn tiny_image(name: &str) -> EncodedImage {
    EncodedImage {
        path: PathBuf::from(name),
        data: "QUJD".to_string(),
        width: 1,
        height: 1,
    }
}

#[tokio::test]
async fn test_client_sends_one_authenticated_post() {
    let reply = json!({"choices": [{"message": {"content": "Monograph."}}]});
    let (addr, server) = one_shot_responder(200, reply.to_string()).await;

    let client = ChatCompletionsClient::from_config(&http_config(addr)).unwrap();
    let envelope = client
        .analyze(
            &[tiny_image("a.jpg"), tiny_image("b.jpg")],
            &["Diaries".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(envelope.as_value(), &reply);

    let request = server.await.unwrap();
    let (head, body) = request.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("POST /v1/chat/completions HTTP/1.1"), "{head}");
    let head_lower = head.to_ascii_lowercase();
    assert!(head_lower.contains("authorization: bearer sk-test-123456"));
    assert!(head_lower.contains("content-type: application/json"));

    let body: Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["model"], "vision-test");
    assert_eq!(body["max_tokens"], 321);
    let content = body["messages"][0]["content"].as_array().unwrap();
    assert_eq!(content.len(), 3);
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
}

#[tokio::test]
async fn test_client_maps_http_error_status() {
    let (addr, server) =
        one_shot_responder(429, json!({"error": {"message": "slow down"}}).to_string()).await;

    let client = ChatCompletionsClient::from_config(&http_config(addr)).unwrap();
    let err = client
        .analyze(&[tiny_image("a.jpg")], &["Other".to_string()])
        .await
        .unwrap_err();
    match err {
        AnalysisError::Transport { status, reason, .. } => {
            assert_eq!(status, Some(429));
            assert!(reason.contains("slow down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_client_reports_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ChatCompletionsClient::from_config(&http_config(addr)).unwrap();
    let err = client
        .analyze(&[tiny_image("a.jpg")], &["Other".to_string()])
        .await
        .unwrap_err();
    assert!(
        matches!(err, AnalysisError::Transport { status: None, .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_full_run_over_http() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_jpeg(input.path(), "cover.jpg");

    let reply = json!({"choices": [{"message": {"content": "Exhibition catalog."}}]});
    let (addr, server) = one_shot_responder(200, reply.to_string()).await;

    let mut config = http_config(addr);
    config.output_dir = output.path().to_path_buf();
    config.rasterizer = Some(RecordingRasterizer::new(0) as Arc<dyn PageRasterizer>);

    let result = analyze_to_file(input.path(), &config).await.unwrap();
    assert_eq!(result.analysis, "Exhibition catalog.");
    assert_eq!(result.raw_response, reply);
    assert!(output.path().join("analysis_result.json").is_file());
    server.await.unwrap();
}

// ── PDFium ───────────────────────────────────────────────────────────────────

/// Build a PDF with `pages` blank 200x300 pt pages and a correct xref table.
fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {pages} >>",
            (0..pages)
                .map(|i| format!("{} 0 R", i + 3))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    ];
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 300] >>".to_string());
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{obj}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

#[test]
fn test_pdfium_rasterises_every_page() {
    if let Err(e) = bind_pdfium() {
        println!("SKIP: pdfium not available ({e})");
        return;
    }

    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("three.pdf");
    std::fs::write(&pdf, blank_pdf(3)).unwrap();
    let out_dir = tmp.path().join("three");
    std::fs::create_dir_all(&out_dir).unwrap();

    let rasterizer = PdfiumRasterizer {
        dpi: 72,
        max_rendered_pixels: 4000,
        password: None,
    };
    let pages = rasterizer.rasterize(&pdf, &out_dir).unwrap();

    assert_eq!(
        pages,
        (1..=3).map(|n| page_image_path(&out_dir, n)).collect::<Vec<_>>()
    );
    for page in &pages {
        let img = image::open(page).unwrap();
        assert_eq!((img.width(), img.height()), (200, 300));
    }
}

#[test]
fn test_pdfium_rejects_garbage() {
    if bind_pdfium().is_err() {
        println!("SKIP: pdfium not available");
        return;
    }

    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("broken.pdf");
    std::fs::write(&pdf, b"this is not a pdf").unwrap();

    let rasterizer = PdfiumRasterizer {
        dpi: 72,
        max_rendered_pixels: 4000,
        password: None,
    };
    let err = rasterizer.rasterize(&pdf, tmp.path()).unwrap_err();
    assert!(matches!(err, AnalysisError::CorruptPdf { .. }), "{err:?}");
}
