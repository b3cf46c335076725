//! Inspection pipeline: one detection pass over a screenshot, then bounded
//! parallel text enrichment of every detected region.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use tokio::sync::mpsc;

use crate::config::{default_worker_count, AppConfig};
use crate::errors::{VisionDomError, VisionDomResult};
use crate::executor::ExecutorContext;
use crate::ocr::{DefaultBackendFactory, EnricherPool, TextEnricher};
use crate::perception::crop::crop_region;
use crate::perception::types::{ElementRecord, RawDetection};
use crate::perception::yolo_detector::{ElementDetector, YoloDetector};
use crate::query::element_set::ElementSet;
use crate::query::predicate::Predicate;

/// Per-call knobs for [`InspectionPipeline::inspect`].
#[derive(Clone)]
pub struct InspectOptions {
    pub language: String,
    pub enable_text_enrichment: bool,
    pub target_page_index: usize,
    pub search_predicate: Option<Predicate>,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            language: "ch".into(),
            enable_text_enrichment: true,
            target_page_index: 0,
            search_predicate: None,
        }
    }
}

impl std::fmt::Debug for InspectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectOptions")
            .field("language", &self.language)
            .field("enable_text_enrichment", &self.enable_text_enrichment)
            .field("target_page_index", &self.target_page_index)
            .field("search_predicate", &self.search_predicate.is_some())
            .finish()
    }
}

impl InspectOptions {
    /// Language and enrichment switch taken from the loaded configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            language: config.ocr.language.clone(),
            enable_text_enrichment: config.pipeline.enable_text_enrichment,
            ..Self::default()
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn text_enrichment(mut self, enabled: bool) -> Self {
        self.enable_text_enrichment = enabled;
        self
    }

    pub fn page_index(mut self, index: usize) -> Self {
        self.target_page_index = index;
        self
    }

    /// Keep only records matching `predicate` once text is attached.
    pub fn search<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ElementRecord) -> bool + Send + Sync + 'static,
    {
        self.search_predicate = Some(Arc::new(predicate));
        self
    }
}

/// Observer for enrichment tasks. Called from worker threads; `index` is the
/// detection's position in detector output.
pub trait EnrichmentProbe: Send + Sync {
    fn task_started(&self, _index: usize) {}
    fn task_finished(&self, _index: usize) {}
}

pub struct InspectionPipeline {
    detector: Arc<Mutex<Box<dyn ElementDetector>>>,
    pool: Arc<EnricherPool>,
    workers: usize,
    executor: Option<Arc<ExecutorContext>>,
    probe: Option<Arc<dyn EnrichmentProbe>>,
}

impl InspectionPipeline {
    pub fn new(detector: Box<dyn ElementDetector>, pool: EnricherPool) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
            pool: Arc::new(pool),
            workers: default_worker_count(),
            executor: None,
            probe: None,
        }
    }

    /// Load the detector and text backends described by `config`.
    pub fn from_config(config: &AppConfig) -> VisionDomResult<Self> {
        config.validate()?;
        let detector = YoloDetector::from_config(&config.detector)?;
        let pool = EnricherPool::new(
            Arc::new(DefaultBackendFactory::new(config.ocr.clone())),
            config.primary_backend()?,
            config.fallback_backend()?,
            config.ocr.language.clone(),
        );
        if config.pipeline.enable_text_enrichment {
            let kind = pool.warm_up()?;
            tracing::info!(backend = %kind, "text backend ready");
        }
        Ok(Self::new(Box::new(detector), pool).with_workers(config.pipeline.resolved_workers()))
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_executor(mut self, executor: Arc<ExecutorContext>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn EnrichmentProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pool(&self) -> &EnricherPool {
        &self.pool
    }

    /// Detect, enrich, filter. Records come back in enrichment completion
    /// order, not detector order.
    pub async fn inspect(
        &self,
        image_bytes: &[u8],
        options: InspectOptions,
    ) -> VisionDomResult<ElementSet> {
        if let Some(ctx) = &self.executor {
            ctx.validate_page(options.target_page_index).await?;
        }

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| VisionDomError::Inference(format!("cannot decode screenshot: {e}")))?;
        let image = Arc::new(image);

        let detector = self.detector.clone();
        let frame = image.clone();
        let detections = tokio::task::spawn_blocking(move || {
            let mut detector = detector.lock().unwrap_or_else(|p| p.into_inner());
            detector.detect(&frame)
        })
        .await
        .map_err(|e| VisionDomError::Inference(format!("detector task: {e}")))??;

        tracing::debug!(
            count = detections.len(),
            width = image.width(),
            height = image.height(),
            "detection pass finished"
        );

        let mut records = if options.enable_text_enrichment && !detections.is_empty() {
            self.enrich(image.to_rgb8(), detections, &options.language)
                .await?
        } else {
            detections
                .into_iter()
                .map(|d| ElementRecord::from_detection(d, Vec::new()))
                .collect()
        };

        if let Some(pred) = &options.search_predicate {
            let before = records.len();
            records.retain(|r| pred(r));
            tracing::debug!(before, after = records.len(), "search predicate applied");
        }

        let set = ElementSet::new(records, options.target_page_index);
        Ok(match &self.executor {
            Some(ctx) => set.bind(ctx.clone()),
            None => set,
        })
    }

    async fn enrich(
        &self,
        frame: RgbImage,
        detections: Vec<RawDetection>,
        language: &str,
    ) -> VisionDomResult<Vec<ElementRecord>> {
        let total = detections.len();
        let workers = self.workers.min(total).max(1);
        let frame = Arc::new(frame);
        let queue: Arc<Mutex<VecDeque<(usize, RawDetection)>>> =
            Arc::new(Mutex::new(detections.into_iter().enumerate().collect()));
        let (tx, mut rx) = mpsc::unbounded_channel::<ElementRecord>();

        tracing::debug!(tasks = total, workers, "starting text enrichment");

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let job = Worker {
                id: worker,
                pool: self.pool.clone(),
                queue: queue.clone(),
                frame: frame.clone(),
                language: language.to_string(),
                probe: self.probe.clone(),
                tx: tx.clone(),
            };
            handles.push(tokio::task::spawn_blocking(move || job.run()));
        }
        drop(tx);

        let mut records = Vec::with_capacity(total);
        while let Some(record) = rx.recv().await {
            records.push(record);
        }

        // A worker only fails outright when it never obtained a backend.
        let mut started = 0usize;
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => started += 1,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "enrichment worker could not obtain a text backend");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    started += 1;
                    tracing::warn!(error = %e, "enrichment worker aborted");
                }
            }
        }

        if started == 0 {
            return Err(first_error.unwrap_or_else(|| {
                VisionDomError::EnrichmentTask(format!("none of {total} enrichment tasks ran"))
            }));
        }

        // Regions left behind by workers that lost their backend mid-batch.
        let leftovers: Vec<(usize, RawDetection)> =
            queue.lock().unwrap_or_else(|p| p.into_inner()).drain(..).collect();
        if !leftovers.is_empty() {
            tracing::warn!(
                count = leftovers.len(),
                "no text backend left for some regions; keeping them without text"
            );
            records.extend(
                leftovers
                    .into_iter()
                    .map(|(_, d)| ElementRecord::from_detection(d, Vec::new())),
            );
        }
        Ok(records)
    }
}

/// One blocking worker: owns an enricher and drains the shared queue.
struct Worker {
    id: usize,
    pool: Arc<EnricherPool>,
    queue: Arc<Mutex<VecDeque<(usize, RawDetection)>>>,
    frame: Arc<RgbImage>,
    language: String,
    probe: Option<Arc<dyn EnrichmentProbe>>,
    tx: mpsc::UnboundedSender<ElementRecord>,
}

impl Worker {
    /// `Err` only when no backend could be checked out at all.
    fn run(self) -> VisionDomResult<()> {
        let mut enricher = self.pool.checkout()?;
        loop {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .pop_front();
            let Some((index, detection)) = next else {
                break;
            };

            if let Some(probe) = &self.probe {
                probe.task_started(index);
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let region = crop_region(&self.frame, &detection.bounding_box);
                enricher.extract(&region, &self.language)
            }));
            if let Some(probe) = &self.probe {
                probe.task_finished(index);
            }

            let (text, poisoned) = match outcome {
                Ok(Ok(lines)) => (lines, false),
                Ok(Err(e)) => {
                    let e = VisionDomError::EnrichmentTask(format!("region {index}: {e}"));
                    tracing::warn!(worker = self.id, error = %e, "text extraction failed; keeping element without text");
                    (Vec::new(), false)
                }
                Err(panic) => {
                    let e = VisionDomError::EnrichmentTask(format!(
                        "region {index}: backend panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                    tracing::warn!(worker = self.id, error = %e, "text extraction failed; keeping element without text");
                    (Vec::new(), true)
                }
            };

            // The receiver only goes away if `inspect` was cancelled.
            if self
                .tx
                .send(ElementRecord::from_detection(detection, text))
                .is_err()
            {
                return Ok(());
            }

            if poisoned {
                // A backend that panicked mid-call is not reused.
                match self.replacement(enricher) {
                    Ok(fresh) => enricher = fresh,
                    Err(e) => {
                        tracing::warn!(worker = self.id, error = %e, "no replacement text backend; leaving remaining regions to other workers");
                        return Ok(());
                    }
                }
            }
        }
        self.pool.checkin(enricher);
        Ok(())
    }

    fn replacement(&self, broken: TextEnricher) -> VisionDomResult<TextEnricher> {
        tracing::debug!(worker = self.id, ?broken, "discarding enricher after panic");
        drop(broken);
        self.pool.checkout()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
