/*!
 * Mock translation backend for testing.
 *
 * This module provides a backend that simulates different behaviors:
 * - `MockBackend::working()` - Always succeeds with tagged text
 * - `MockBackend::failing()` - Always fails with an error
 * - `MockBackend::scripted(..)` - Follows a per-call script, then works
 *
 * Every call is recorded so tests can assert on batch sizes and retries.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{ParseError, ProviderError};
use crate::translation::backend::{TranslateOptions, TranslationBackend};
use crate::translation::task::CancellationFlag;

/// Behavior of one mock call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Translate every text as `"[target] text"`
    Working,
    /// Fail with a timeout
    Timeout,
    /// Fail with a server error
    Failing,
    /// Return one entry fewer than requested
    Short,
    /// Return an unparseable reply
    Unparseable,
    /// Return `None` for every text
    Untranslated,
    /// Return `None` for every nth text (1-based)
    PartialEvery { every: usize },
    /// Sleep before translating
    Slow { delay_ms: u64 },
}

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Texts sent in the call
    pub texts: Vec<String>,
    /// Retry number reported by the caller
    pub attempt: u32,
}

/// Mock backend for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Behavior once the script is exhausted
    default_behavior: MockBehavior,
    /// Behaviors for the next calls, in order
    script: Arc<Mutex<VecDeque<MockBehavior>>>,
    /// Recorded calls, shared between clones
    calls: Arc<Mutex<Vec<MockCall>>>,
    /// Call counter for the cancellation hook
    call_count: Arc<AtomicUsize>,
    /// Cancel this flag after the given number of calls
    cancel_after: Option<(usize, CancellationFlag)>,
}

impl MockBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            default_behavior: behavior,
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            cancel_after: None,
        }
    }

    /// Create a working mock backend that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a failing mock backend that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Follow `script` for the first calls, then work normally
    pub fn scripted(script: impl IntoIterator<Item = MockBehavior>) -> Self {
        let backend = Self::working();
        backend.script.lock().extend(script);
        backend
    }

    /// Set the flag once `calls` calls have completed
    pub fn cancel_after(mut self, calls: usize, flag: CancellationFlag) -> Self {
        self.cancel_after = Some((calls, flag));
        self
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The translation the working behavior produces
    pub fn translation_of(text: &str, target_lang: &str) -> String {
        format!("[{}] {}", target_lang, text)
    }

    fn next_behavior(&self) -> MockBehavior {
        self.script.lock().pop_front().unwrap_or(self.default_behavior)
    }

    fn after_call(&self) {
        let done = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, flag)) = &self.cancel_after {
            if done >= *limit {
                flag.cancel();
            }
        }
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        self.calls.lock().push(MockCall {
            texts: texts.to_vec(),
            attempt: options.attempt,
        });
        let behavior = self.next_behavior();
        let translate_all = || {
            texts
                .iter()
                .map(|t| Some(Self::translation_of(t, &options.target_lang)))
                .collect::<Vec<_>>()
        };

        let result = match behavior {
            MockBehavior::Working => Ok(translate_all()),
            MockBehavior::Timeout => Err(ProviderError::Timeout("simulated timeout".to_string())),
            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated provider failure".to_string(),
            }),
            MockBehavior::Short => {
                let mut translated = translate_all();
                translated.pop();
                Ok(translated)
            }
            MockBehavior::Unparseable => Err(ParseError::Insufficient {
                expected: texts.len(),
                found: 0,
            }
            .into()),
            MockBehavior::Untranslated => Ok(vec![None; texts.len()]),
            MockBehavior::PartialEvery { every } => Ok(texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if every > 0 && (i + 1) % every == 0 {
                        None
                    } else {
                        Some(Self::translation_of(t, &options.target_lang))
                    }
                })
                .collect()),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(translate_all())
            }
        };

        self.after_call();
        result
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.default_behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("mock is offline".to_string())),
            _ => Ok(()),
        }
    }
}
