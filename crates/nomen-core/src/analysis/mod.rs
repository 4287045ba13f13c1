//! Classifier seam
//!
//! The ML subsystem is an external collaborator: the repository only sees
//! the [`Classifier`] trait and a readiness flag. Model loading happens
//! elsewhere and asynchronously; until the readiness signal is set,
//! analysis requests are refused with `MODEL_NOT_READY`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreError, CoreResult};
use crate::types::{AnalysisRecord, ClassificationHit, ANALYSIS_TOP_K};

/// Options passed through to the classifier
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Request a caption alongside the classification, when the backend
    /// has a captioner loaded
    pub with_caption: bool,
}

/// Raw classifier output before caching
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// Hits ordered best-first; the cache retains the top 50
    pub hits: Vec<ClassificationHit>,
    pub caption: Option<String>,
    pub model_version: String,
}

/// The classification/captioning backend the repository depends on.
///
/// Implementations run whatever inference they like; errors surface to the
/// caller as `ANALYSIS_FAILED`.
pub trait Classifier: Send + Sync {
    fn analyze(&self, wav_path: &Path, options: &AnalyzeOptions) -> anyhow::Result<ClassifierOutput>;
}

/// Readiness latch for the ML subsystem
#[derive(Debug, Default)]
pub struct ModelGate {
    ready: AtomicBool,
}

impl ModelGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// External readiness signal (set once models finish loading)
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Refuse analysis until the subsystem signalled ready
    pub fn check(&self) -> CoreResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CoreError::ModelNotReady)
        }
    }
}

/// Run the classifier for one file and shape the output into a cache
/// record keyed by the file's content hash.
pub fn run_analysis(
    classifier: &dyn Classifier,
    wav_path: &Path,
    file_hash: &str,
    options: &AnalyzeOptions,
    analyzed_at: i64,
) -> CoreResult<AnalysisRecord> {
    let output = classifier
        .analyze(wav_path, options)
        .map_err(|e| CoreError::AnalysisFailed(e.to_string()))?;

    let mut hits = output.hits;
    hits.truncate(ANALYSIS_TOP_K);

    Ok(AnalysisRecord {
        file_hash: file_hash.to_string(),
        hits,
        caption: output.caption,
        model_version: output.model_version,
        analyzed_at,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Canned classifier for tests
    pub struct FakeClassifier {
        pub hits: Vec<ClassificationHit>,
        pub caption: Option<String>,
        pub fail: bool,
    }

    impl Classifier for FakeClassifier {
        fn analyze(
            &self,
            _wav_path: &Path,
            _options: &AnalyzeOptions,
        ) -> anyhow::Result<ClassifierOutput> {
            if self.fail {
                anyhow::bail!("inference backend exploded");
            }
            Ok(ClassifierOutput {
                hits: self.hits.clone(),
                caption: self.caption.clone(),
                model_version: "fake-v1".to_string(),
            })
        }
    }
}
