//! Batch orchestration: scan, then probe, plan and encode one file at a time.
//!
//! A single file's failure never stops the batch. Cancellation stops the
//! current file and leaves the rest unprocessed; partial outputs stay on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use crate::chapters;
use crate::config::TranscodeConfig;
use crate::error::{EncodeError, PlanError, ProbeError};
use crate::ffmpeg::Encoder;
use crate::ffprobe::Inspector;
use crate::media::MediaInfo;
use crate::plan::{build_plan, ChapterAction, TranscodePlan};
use crate::resolver;
use crate::scan;
use crate::verify;

/// Where a batch run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Scanning,
    Probing,
    Planning,
    Encoding,
    Recording,
    Summarizing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Encoded successfully
    Converted,
    /// Dry run: planned and logged only
    Planned,
    Skipped { reason: String },
    Failed { reason: String },
    /// Interrupted by the operator
    Aborted,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub plan: Option<TranscodePlan>,
    pub elapsed_seconds: f64,
    pub outcome: FileOutcome,
    pub source_bytes: Option<u64>,
    pub target_bytes: Option<u64>,
}

impl FileRecord {
    fn new(source_path: &Path) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            target_path: None,
            plan: None,
            elapsed_seconds: 0.0,
            outcome: FileOutcome::Aborted,
            source_bytes: file_size(source_path),
            target_bytes: None,
        }
    }
}

/// Result of one batch run, in processing order
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records: Vec<FileRecord>,
    pub total_elapsed_seconds: f64,
    /// Files discovered but never started because of an interrupt
    pub not_started: usize,
    pub cancelled: bool,
}

/// Counts for the end-of-run report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub converted: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: usize,
    pub not_started: usize,
    pub total_elapsed_seconds: f64,
    pub source_bytes: u64,
    pub target_bytes: u64,
}

impl BatchSummary {
    /// Files that went all the way through (converted or planned)
    pub fn processed(&self) -> usize {
        self.converted + self.planned
    }
}

impl BatchResult {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            total_elapsed_seconds: 0.0,
            not_started: 0,
            cancelled: false,
        }
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            not_started: self.not_started,
            total_elapsed_seconds: self.total_elapsed_seconds,
            ..BatchSummary::default()
        };

        for record in &self.records {
            match record.outcome {
                FileOutcome::Converted => {
                    summary.converted += 1;
                    summary.source_bytes += record.source_bytes.unwrap_or(0);
                    summary.target_bytes += record.target_bytes.unwrap_or(0);
                }
                FileOutcome::Planned => summary.planned += 1,
                FileOutcome::Skipped { .. } => summary.skipped += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
                FileOutcome::Aborted => summary.aborted += 1,
            }
        }
        summary
    }
}

/// Drives a batch run over the configured source tree
pub struct BatchRunner<'a, I, E> {
    cfg: &'a TranscodeConfig,
    inspector: I,
    encoder: E,
    cancel: CancellationToken,
    state: BatchState,
}

impl<'a, I: Inspector, E: Encoder> BatchRunner<'a, I, E> {
    pub fn new(cfg: &'a TranscodeConfig, inspector: I, encoder: E, cancel: CancellationToken) -> Self {
        Self {
            cfg,
            inspector,
            encoder,
            cancel,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Scan the source directory and process everything found.
    ///
    /// Only a defect in plan construction makes this return an error.
    pub async fn run(&mut self) -> Result<BatchResult> {
        self.state = BatchState::Scanning;
        let files = scan::discover(self.cfg)?;
        for f in &files {
            info!("    ... found: '{}'", f.display());
        }
        Ok(self.process_files(files).await?)
    }

    /// Process the given files in lexicographic path order
    pub async fn process_files(&mut self, mut files: Vec<PathBuf>) -> Result<BatchResult, PlanError> {
        files.sort();
        let mut batch = BatchResult::new();
        info!(
            "Batch {} started: {} file(s), dry run: {}",
            batch.id,
            files.len(),
            self.cfg.dry_run
        );

        for (n, source) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                batch.cancelled = true;
                batch.not_started = files.len() - n;
                warn!("Interrupted: {} file(s) not started", batch.not_started);
                break;
            }

            info!("TASK: Convert media ({}/{})", n + 1, files.len());
            info!("Source: '{}'", source.display());

            let started = Instant::now();
            let mut record = self.process_file(source).await?;

            self.state = BatchState::Recording;
            record.elapsed_seconds = started.elapsed().as_secs_f64();
            batch.total_elapsed_seconds += record.elapsed_seconds;
            info!(
                "Elapsed: {:.2} seconds [{:.2} minutes]",
                record.elapsed_seconds,
                record.elapsed_seconds / 60.0
            );

            let aborted = record.outcome == FileOutcome::Aborted;
            batch.records.push(record);
            if aborted {
                batch.cancelled = true;
                batch.not_started = files.len() - n - 1;
                warn!("Interrupted: {} file(s) not started", batch.not_started);
                break;
            }
        }

        self.state = BatchState::Summarizing;
        batch.finished_at = Some(Utc::now());
        let summary = batch.summary();
        info!(
            "Batch {} finished: {} processed, {} skipped, {} failed, {} aborted, {} not started",
            batch.id,
            summary.processed(),
            summary.skipped,
            summary.failed,
            summary.aborted,
            summary.not_started
        );
        info!(
            "Total elapsed: {:.2} seconds [{:.2} minutes]",
            batch.total_elapsed_seconds,
            batch.total_elapsed_seconds / 60.0
        );

        self.state = BatchState::Done;
        Ok(batch)
    }

    async fn process_file(&mut self, source: &Path) -> Result<FileRecord, PlanError> {
        let cfg = self.cfg;
        let mut record = FileRecord::new(source);

        let target = match resolver::resolve_target(
            source,
            &cfg.source_directory,
            &cfg.target_directory,
            &cfg.target_container,
        ) {
            Ok(t) => t,
            Err(e) => {
                error!("    ... ERROR, cannot determine target path: {}", e);
                record.outcome = FileOutcome::Failed { reason: e.to_string() };
                return Ok(record);
            }
        };
        info!("Target: '{}'", target.display());
        record.target_path = Some(target.clone());

        if !cfg.overwrite && target.exists() {
            info!("    ... skipping, target already exists");
            record.outcome = FileOutcome::Skipped { reason: "target already exists".to_string() };
            return Ok(record);
        }

        self.state = BatchState::Probing;
        info!("    ... get media information");
        let info = match self.inspector.inspect(source, &self.cancel).await {
            Ok(info) => info,
            Err(ProbeError::Cancelled(_)) => return Ok(record),
            // The interrupt may reach ffprobe before the token is observed
            Err(e) if self.cancel.is_cancelled() => {
                debug!("    ... probe ended by interrupt: {}", e);
                return Ok(record);
            }
            Err(e) => {
                error!("    ... ERROR, skipping: {}", e);
                record.outcome = FileOutcome::Skipped { reason: e.to_string() };
                return Ok(record);
            }
        };
        log_media_info(&info);

        self.state = BatchState::Planning;
        let plan = build_plan(&info, cfg);
        plan.validate()?;
        let plan = match self.resolve_scene_chapters(plan, source, &info).await {
            Some(plan) => plan,
            None => return Ok(record),
        };
        info!("    ... plan: {}", plan);
        record.plan = Some(plan.clone());

        if let Err(e) = resolver::ensure_parent(&target, cfg.dry_run) {
            error!("    ... ERROR: {}", e);
            record.outcome = FileOutcome::Failed { reason: e.to_string() };
            return Ok(record);
        }

        self.state = BatchState::Encoding;
        match self.encoder.execute(&plan, source, &target, cfg.dry_run, &self.cancel).await {
            Ok(()) if cfg.dry_run => {
                record.outcome = FileOutcome::Planned;
                return Ok(record);
            }
            Ok(()) => {}
            Err(EncodeError::Cancelled(_)) => {
                warn!("    ... aborted, partial output left at {}", target.display());
                return Ok(record);
            }
            // ffmpeg shares the terminal's process group and may exit on the
            // signal before the token is observed
            Err(e) if self.cancel.is_cancelled() => {
                debug!("    ... encode ended by interrupt: {}", e);
                warn!("    ... aborted, partial output left at {}", target.display());
                return Ok(record);
            }
            Err(e) => {
                error!("    ... ERROR, conversion failed: {}", e);
                record.outcome = FileOutcome::Failed { reason: e.to_string() };
                return Ok(record);
            }
        }

        record.target_bytes = file_size(&target);
        record.outcome = match self.check_output(&info, &target).await {
            Ok(()) => FileOutcome::Converted,
            Err(reason) => {
                error!("    ... ERROR, output check failed: {}", reason);
                FileOutcome::Failed { reason }
            }
        };
        Ok(record)
    }

    /// Run scene detection for plans that ask for it.
    ///
    /// Detection failures leave the file without chapters. Returns `None`
    /// when the operator interrupted the detection.
    async fn resolve_scene_chapters(
        &self,
        plan: TranscodePlan,
        source: &Path,
        info: &MediaInfo,
    ) -> Option<TranscodePlan> {
        let ChapterAction::DetectScenes { threshold } = plan.chapters else {
            return Some(plan);
        };

        if self.cfg.dry_run {
            info!("    ... would detect scene changes (threshold {})", threshold);
            return Some(plan);
        }

        info!("    ... detecting scene changes (threshold {})", threshold);
        match self.inspector.scene_changes(source, threshold, &self.cancel).await {
            Ok(times) => {
                let chapters = chapters::from_scene_changes(&times, info.duration_seconds);
                debug!("    ... {} scene chapter(s)", chapters.len());
                Some(plan.with_chapters(chapters))
            }
            Err(ProbeError::Cancelled(_)) => None,
            Err(_) if self.cancel.is_cancelled() => None,
            Err(e) => {
                warn!("    ... scene detection failed, writing no chapters: {}", e);
                Some(plan.with_chapters(Vec::new()))
            }
        }
    }

    async fn check_output(&self, source_info: &MediaInfo, target: &Path) -> Result<(), String> {
        if !self.cfg.validate_output {
            return Ok(());
        }

        let output_info = self
            .inspector
            .inspect(target, &self.cancel)
            .await
            .map_err(|e| format!("cannot probe output: {}", e))?;

        let result = verify::validate_output(source_info, &output_info);
        for warning in &result.warnings {
            warn!("    ... {}: {}", target.display(), warning);
        }
        if result.is_valid {
            Ok(())
        } else {
            Err(result.issues.join("; "))
        }
    }
}

fn log_media_info(info: &MediaInfo) {
    if let Some(video) = info.first_video() {
        info!("    ... video codec = {}", video.codec_name);
        info!("    ... video width = {}", video.width);
        info!("    ... video height = {}", video.height);
    } else {
        warn!("    ... no video stream");
    }
    info!("    ... audio streams found = {}", info.audio_streams.len());
    info!("    ... subtitle streams found = {}", info.subtitle_streams.len());
    info!("    ... chapters found = {}", info.chapter_count);
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use async_trait::async_trait;
    use crate::config::ChapterPolicy;
    use crate::media::{AudioStream, VideoStream};
    use crate::plan::VideoAction;

    #[derive(Default)]
    struct FakeInspector {
        broken: HashSet<PathBuf>,
        fail_scenes: bool,
        /// Simulates ffprobe dying from the terminal's SIGINT
        killed_by_signal: Option<PathBuf>,
        calls: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl Inspector for FakeInspector {
        async fn inspect(&self, path: &Path, cancel: &CancellationToken) -> Result<MediaInfo, ProbeError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            if self.killed_by_signal.as_deref() == Some(path) {
                cancel.cancel();
                return Err(ProbeError::Exit {
                    path: path.to_path_buf(),
                    code: 255,
                    stderr: "Exiting normally, received signal 2.".into(),
                });
            }
            if self.broken.contains(path) {
                return Err(ProbeError::Exit {
                    path: path.to_path_buf(),
                    code: 1,
                    stderr: "Invalid data found when processing input".into(),
                });
            }
            Ok(MediaInfo {
                container_format: "avi".into(),
                duration_seconds: 1500.0,
                video_streams: vec![VideoStream { codec_name: "h264".into(), width: 1920, height: 1080 }],
                audio_streams: vec![AudioStream { codec_name: "mp3".into(), language: None }],
                subtitle_streams: vec![],
                chapter_count: 0,
            })
        }

        async fn scene_changes(&self, path: &Path, _threshold: f64, _cancel: &CancellationToken) -> Result<Vec<f64>, ProbeError> {
            if self.fail_scenes {
                return Err(ProbeError::Malformed { path: path.to_path_buf(), reason: "lavfi unavailable".into() });
            }
            Ok(vec![300.5, 900.0])
        }
    }

    #[derive(Default)]
    struct FakeEncoder {
        fail: HashSet<PathBuf>,
        interrupt_on: Option<PathBuf>,
        /// Simulates ffmpeg exiting on SIGINT before the token is observed
        killed_by_signal: Option<PathBuf>,
        calls: Arc<Mutex<Vec<(PathBuf, TranscodePlan, bool)>>>,
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn execute(
            &self,
            plan: &TranscodePlan,
            source: &Path,
            target: &Path,
            dry_run: bool,
            cancel: &CancellationToken,
        ) -> Result<(), EncodeError> {
            self.calls.lock().unwrap().push((source.to_path_buf(), plan.clone(), dry_run));
            if self.interrupt_on.as_deref() == Some(source) {
                cancel.cancel();
                return Err(EncodeError::Cancelled(target.to_path_buf()));
            }
            if self.killed_by_signal.as_deref() == Some(source) {
                cancel.cancel();
                return Err(EncodeError::Exit {
                    path: target.to_path_buf(),
                    code: 255,
                    output: "Exiting normally, received signal 2.".into(),
                });
            }
            if self.fail.contains(source) {
                return Err(EncodeError::Exit {
                    path: target.to_path_buf(),
                    code: 1,
                    output: "Subtitle encoding currently only possible from text to text or bitmap to bitmap".into(),
                });
            }
            if !dry_run {
                std::fs::write(target, b"encoded").unwrap();
            }
            Ok(())
        }
    }

    fn setup(names: &[&str]) -> (tempfile::TempDir, TranscodeConfig, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let mut files = Vec::new();
        for name in names {
            let path = src.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"source").unwrap();
            files.push(path);
        }
        let cfg = TranscodeConfig {
            source_directory: src,
            target_directory: dir.path().join("dst"),
            recursive: true,
            dry_run: false,
            ..TranscodeConfig::default()
        };
        (dir, cfg, files)
    }

    #[tokio::test]
    async fn processes_in_sorted_order_regardless_of_input_order() {
        let (_dir, cfg, mut files) = setup(&["c.avi", "a.avi", "b/x.mkv"]);
        files.reverse();
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        let order: Vec<_> = calls.lock().unwrap().iter().map(|(p, _, _)| p.clone()).collect();
        let mut expected = order.clone();
        expected.sort();
        assert_eq!(order, expected);
        assert_eq!(batch.summary().converted, 3);
        assert_eq!(runner.state(), BatchState::Done);
    }

    #[tokio::test]
    async fn unreadable_source_skips_only_that_file() {
        let (_dir, cfg, files) = setup(&["1.avi", "2.avi", "3.avi"]);
        let inspector = FakeInspector {
            broken: [files[0].clone()].into_iter().collect(),
            ..FakeInspector::default()
        };
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, inspector, encoder, CancellationToken::new());
        let batch = runner.process_files(files.clone()).await.unwrap();

        assert!(matches!(batch.records[0].outcome, FileOutcome::Skipped { .. }));
        assert_eq!(batch.records[1].outcome, FileOutcome::Converted);
        assert_eq!(batch.records[2].outcome, FileOutcome::Converted);
        assert_eq!(calls.lock().unwrap().len(), 2);

        let summary = batch.summary();
        assert_eq!((summary.processed(), summary.skipped, summary.failed), (2, 1, 0));
    }

    #[tokio::test]
    async fn encode_failure_is_recorded_and_batch_continues() {
        let (_dir, cfg, files) = setup(&["1.avi", "2.avi"]);
        let encoder = FakeEncoder {
            fail: [files[0].clone()].into_iter().collect(),
            ..FakeEncoder::default()
        };

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        match &batch.records[0].outcome {
            FileOutcome::Failed { reason } => assert!(reason.contains("text to text")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(batch.records[1].outcome, FileOutcome::Converted);
        assert!(batch.total_elapsed_seconds >= batch.records[0].elapsed_seconds);
    }

    #[tokio::test]
    async fn interrupt_aborts_current_file_and_stops() {
        let (_dir, cfg, files) = setup(&["1.avi", "2.avi", "3.avi"]);
        let encoder = FakeEncoder {
            interrupt_on: Some(files[1].clone()),
            ..FakeEncoder::default()
        };
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[1].outcome, FileOutcome::Aborted);
        assert!(batch.cancelled);
        assert_eq!(batch.not_started, 1);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(batch.summary().aborted, 1);
    }

    #[tokio::test]
    async fn engine_killed_by_interrupt_counts_as_aborted() {
        let (_dir, cfg, files) = setup(&["1.avi", "2.avi"]);
        let encoder = FakeEncoder {
            killed_by_signal: Some(files[0].clone()),
            ..FakeEncoder::default()
        };

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].outcome, FileOutcome::Aborted);
        assert!(batch.cancelled);
        assert_eq!(batch.not_started, 1);
        let summary = batch.summary();
        assert_eq!((summary.aborted, summary.failed), (1, 0));
    }

    #[tokio::test]
    async fn inspection_killed_by_interrupt_counts_as_aborted() {
        let (_dir, cfg, files) = setup(&["1.avi", "2.avi"]);
        let inspector = FakeInspector {
            killed_by_signal: Some(files[0].clone()),
            ..FakeInspector::default()
        };
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, inspector, encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        assert_eq!(batch.records[0].outcome, FileOutcome::Aborted);
        assert_eq!(batch.summary().skipped, 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_processes_nothing() {
        let (_dir, cfg, files) = setup(&["1.avi", "2.avi"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let inspector = FakeInspector::default();
        let probes = inspector.calls.clone();

        let mut runner = BatchRunner::new(&cfg, inspector, FakeEncoder::default(), cancel);
        let batch = runner.process_files(files).await.unwrap();

        assert!(batch.records.is_empty());
        assert_eq!(batch.not_started, 2);
        assert!(probes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_plans_without_creating_directories() {
        let (dir, mut cfg, files) = setup(&["show/ep1.avi"]);
        cfg.dry_run = true;
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        assert_eq!(batch.records[0].outcome, FileOutcome::Planned);
        assert_eq!(batch.records[0].target_path, Some(dir.path().join("dst/show/ep1.mkv")));
        assert!(!dir.path().join("dst").exists());
        assert!(calls.lock().unwrap()[0].2);
    }

    #[tokio::test]
    async fn existing_target_is_skipped_without_probing() {
        let (dir, cfg, files) = setup(&["done.avi", "todo.avi"]);
        std::fs::create_dir_all(dir.path().join("dst")).unwrap();
        std::fs::write(dir.path().join("dst/done.mkv"), b"old").unwrap();
        let inspector = FakeInspector::default();
        let probes = inspector.calls.clone();

        let mut runner = BatchRunner::new(&cfg, inspector, FakeEncoder::default(), CancellationToken::new());
        let batch = runner.process_files(files.clone()).await.unwrap();

        assert_eq!(batch.records[0].outcome, FileOutcome::Skipped { reason: "target already exists".into() });
        assert_eq!(*probes.lock().unwrap(), vec![files[1].clone()]);
    }

    #[tokio::test]
    async fn scene_chapters_are_resolved_before_encoding() {
        let (_dir, mut cfg, files) = setup(&["movie.avi"]);
        cfg.chapter_policy = ChapterPolicy::SceneDetect;
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        runner.process_files(files).await.unwrap();

        let (_, plan, _) = calls.lock().unwrap()[0].clone();
        match plan.chapters {
            ChapterAction::Replace(list) => {
                let starts: Vec<_> = list.iter().map(|c| c.start_ms).collect();
                assert_eq!(starts, vec![0, 300_500, 900_000]);
                assert_eq!(list.last().unwrap().end_ms, 1_500_000);
            }
            other => panic!("expected resolved chapters, got {:?}", other),
        }
        assert_eq!(plan.video, VideoAction::Copy);
    }

    #[tokio::test]
    async fn scene_detection_failure_yields_no_chapters() {
        let (_dir, mut cfg, files) = setup(&["movie.avi"]);
        cfg.chapter_policy = ChapterPolicy::SceneDetect;
        let inspector = FakeInspector { fail_scenes: true, ..FakeInspector::default() };
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, inspector, encoder, CancellationToken::new());
        let batch = runner.process_files(files).await.unwrap();

        assert_eq!(batch.records[0].outcome, FileOutcome::Converted);
        assert_eq!(calls.lock().unwrap()[0].1.chapters, ChapterAction::Replace(vec![]));
    }

    #[tokio::test]
    async fn run_scans_the_source_tree() {
        let (_dir, cfg, _files) = setup(&["b.avi", "a.mkv", "notes.txt"]);
        let encoder = FakeEncoder::default();
        let calls = encoder.calls.clone();

        let mut runner = BatchRunner::new(&cfg, FakeInspector::default(), encoder, CancellationToken::new());
        let batch = runner.run().await.unwrap();

        assert_eq!(batch.records.len(), 2);
        let names: Vec<_> = calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _, _)| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.avi"]);
    }
}
