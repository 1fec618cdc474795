//! Reconciliation of cumulative recognition events into incremental deltas.
//!
//! Amazon Transcribe reports the whole utterance on every event, so a
//! client naively appending each event would see duplicated text. The
//! reconciler subtracts what has already been relayed and emits only the
//! new tail, so the client can append deltas as they arrive.

use serde::{Deserialize, Serialize};

use crate::core::stt::TranscriptEvent;

/// Incremental transcript update sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptDelta {
    /// New text since the previous delta (or the full utterance when final).
    pub text: String,
    /// Whether this delta closes the utterance.
    pub is_final: bool,
}

/// Converts cumulative recognition events into append-only deltas.
///
/// Tracks the text already relayed as partials since the last final result.
/// A final event re-emits the full cumulative transcript and resets the
/// baseline, so the next utterance is diffed from empty.
///
/// The suffix subtraction assumes the cumulative transcript only grows by
/// appending. When the service revises earlier words the diff comes out
/// empty or wrong for that event; see `revised_transcript_emits_nothing`
/// below for the observable behavior.
#[derive(Debug, Default)]
pub struct TranscriptReconciler {
    /// Partial text already relayed since the last final result.
    relayed: String,
}

impl TranscriptReconciler {
    /// Create a reconciler with an empty baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one recognition event into the delta stream.
    ///
    /// Returns `None` when the event adds nothing worth relaying (empty or
    /// whitespace-only tail).
    pub fn reconcile(&mut self, event: &TranscriptEvent) -> Option<TranscriptDelta> {
        if event.is_final {
            self.relayed.clear();
            return Some(TranscriptDelta {
                text: event.transcript.clone(),
                is_final: true,
            });
        }

        // `get` rather than index: a revised (shorter or diverging)
        // transcript, or a baseline ending mid code point, yields no tail
        // instead of panicking.
        let new_part = event
            .transcript
            .get(self.relayed.len()..)
            .unwrap_or_default();
        if new_part.trim().is_empty() {
            return None;
        }

        self.relayed.push_str(new_part);
        Some(TranscriptDelta {
            text: new_part.to_string(),
            is_final: false,
        })
    }

    /// Drop all reconciliation state, as on session stop.
    pub fn reset(&mut self) {
        self.relayed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(text: &str) -> TranscriptEvent {
        TranscriptEvent {
            transcript: text.to_string(),
            is_final: false,
        }
    }

    fn fin(text: &str) -> TranscriptEvent {
        TranscriptEvent {
            transcript: text.to_string(),
            is_final: true,
        }
    }

    #[test]
    fn growing_partials_emit_only_the_new_tail() {
        let mut reconciler = TranscriptReconciler::new();

        assert_eq!(
            reconciler.reconcile(&partial("hel")),
            Some(TranscriptDelta {
                text: "hel".to_string(),
                is_final: false
            })
        );
        assert_eq!(
            reconciler.reconcile(&partial("hello")),
            Some(TranscriptDelta {
                text: "lo".to_string(),
                is_final: false
            })
        );
        assert_eq!(
            reconciler.reconcile(&fin("hello world")),
            Some(TranscriptDelta {
                text: "hello world".to_string(),
                is_final: true
            })
        );
    }

    #[test]
    fn partial_deltas_concatenate_to_a_prefix_of_the_final() {
        let mut reconciler = TranscriptReconciler::new();
        let events = [
            partial("good"),
            partial("good mor"),
            partial("good morning"),
            fin("good morning everyone"),
        ];

        let mut partial_text = String::new();
        let mut final_text = String::new();
        for event in &events {
            if let Some(delta) = reconciler.reconcile(event) {
                if delta.is_final {
                    final_text = delta.text;
                } else {
                    partial_text.push_str(&delta.text);
                }
            }
        }

        assert!(final_text.starts_with(&partial_text));
    }

    #[test]
    fn duplicate_partial_emits_nothing() {
        let mut reconciler = TranscriptReconciler::new();
        assert!(reconciler.reconcile(&partial("hello")).is_some());
        assert!(reconciler.reconcile(&partial("hello")).is_none());
    }

    #[test]
    fn whitespace_only_tail_is_suppressed_but_not_lost() {
        let mut reconciler = TranscriptReconciler::new();
        assert!(reconciler.reconcile(&partial("hello")).is_some());
        assert!(reconciler.reconcile(&partial("hello ")).is_none());

        // The suppressed space reappears with the next word.
        let delta = reconciler.reconcile(&partial("hello world")).unwrap();
        assert_eq!(delta.text, " world");
    }

    #[test]
    fn final_resets_the_baseline_for_the_next_utterance() {
        let mut reconciler = TranscriptReconciler::new();
        reconciler.reconcile(&partial("first utterance"));
        reconciler.reconcile(&fin("first utterance"));

        // The next utterance starts from an empty baseline: the whole
        // partial comes through, not a diff against the finalized text.
        let delta = reconciler.reconcile(&partial("second")).unwrap();
        assert_eq!(delta.text, "second");
    }

    #[test]
    fn reset_clears_partial_state() {
        let mut reconciler = TranscriptReconciler::new();
        reconciler.reconcile(&partial("hello"));
        reconciler.reset();

        let delta = reconciler.reconcile(&partial("hello")).unwrap();
        assert_eq!(delta.text, "hello");
    }

    #[test]
    fn revised_transcript_emits_nothing() {
        // The service may retroactively rewrite earlier words. Suffix
        // subtraction cannot express that; the event is swallowed rather
        // than emitting garbled text.
        let mut reconciler = TranscriptReconciler::new();
        reconciler.reconcile(&partial("their going"));

        assert!(reconciler.reconcile(&partial("they're")).is_none());

        // Recovery happens at the next final, which replaces everything.
        let delta = reconciler.reconcile(&fin("they're going home")).unwrap();
        assert_eq!(delta.text, "they're going home");
        assert!(delta.is_final);
    }

    #[test]
    fn multibyte_boundary_does_not_panic() {
        let mut reconciler = TranscriptReconciler::new();
        reconciler.reconcile(&partial("ab"));

        // The baseline length lands inside the two-byte code point of the
        // revised transcript; the event is dropped instead of slicing it.
        assert!(reconciler.reconcile(&partial("a\u{e9}")).is_none());
    }

    #[test]
    fn final_with_empty_text_still_resets() {
        let mut reconciler = TranscriptReconciler::new();
        reconciler.reconcile(&partial("hello"));

        let delta = reconciler.reconcile(&fin("")).unwrap();
        assert!(delta.is_final);
        assert_eq!(delta.text, "");

        let next = reconciler.reconcile(&partial("hi")).unwrap();
        assert_eq!(next.text, "hi");
    }
}
