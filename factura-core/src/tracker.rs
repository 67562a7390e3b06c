//! Per-document submission state and the record store.
use crate::document::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Submission lifecycle. `Accepted` and `Rejected` are terminal; `Pending`
/// is re-entered on every inconclusive consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    Built,
    Signed,
    Packaged,
    Submitted { ticket: String },
    Accepted,
    Rejected,
    Pending,
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Built => "built",
            SubmissionState::Signed => "signed",
            SubmissionState::Packaged => "packaged",
            SubmissionState::Submitted { .. } => "submitted",
            SubmissionState::Accepted => "accepted",
            SubmissionState::Rejected => "rejected",
            SubmissionState::Pending => "pending",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Accepted | SubmissionState::Rejected)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn may_advance_to(&self, next: &SubmissionState) -> bool {
        use SubmissionState::*;
        matches!(
            (self, next),
            (Built, Signed)
                | (Signed, Packaged)
                | (Packaged, Submitted { .. })
                | (Submitted { .. }, Accepted)
                | (Submitted { .. }, Rejected)
                | (Submitted { .. }, Pending)
                | (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Pending)
        )
    }
}

/// Everything recorded about one submitted document. Created only after a
/// submission round-trip succeeds; earlier failures leave no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub document_id: DocumentId,
    pub state: SubmissionState,
    pub signed_xml: String,
    /// SHA-256 hex fingerprint of the signed XML.
    pub document_hash: String,
    /// Polling ticket. Outlives the `Submitted` state so a pending
    /// submission can still be resolved later.
    pub ticket: Option<String>,
    pub pdf_url: Option<String>,
    /// CDR archive bytes, once the authority has produced one.
    pub receipt_zip: Option<Vec<u8>>,
}

impl SubmissionRecord {
    pub fn new(
        document_id: DocumentId,
        state: SubmissionState,
        signed_xml: impl Into<String>,
        document_hash: impl Into<String>,
    ) -> Self {
        let ticket = match &state {
            SubmissionState::Submitted { ticket } => Some(ticket.clone()),
            _ => None,
        };
        Self {
            document_id,
            state,
            signed_xml: signed_xml.into(),
            document_hash: document_hash.into(),
            ticket,
            pdf_url: None,
            receipt_zip: None,
        }
    }

    pub fn advance(&mut self, next: SubmissionState) -> Result<(), TrackerError> {
        if !self.state.may_advance_to(&next) {
            return Err(TrackerError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn ticket(&self) -> Option<&str> {
        if let SubmissionState::Submitted { ticket } = &self.state {
            return Some(ticket);
        }
        self.ticket.as_deref()
    }
}

/// Injected record store: get/put by document identifier. Implementations
/// must allow many concurrent readers with exclusive writers.
pub trait DocumentStore: Send + Sync {
    fn get(&self, id: &DocumentId) -> Option<SubmissionRecord>;
    fn put(&self, record: SubmissionRecord);
}

/// Process-lifetime in-memory store. Never evicts; durability across
/// restarts is explicitly not provided.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, SubmissionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, id: &DocumentId) -> Option<SubmissionRecord> {
        self.records
            .read()
            .expect("record store lock")
            .get(&id.to_string())
            .cloned()
    }

    fn put(&self, record: SubmissionRecord) {
        self.records
            .write()
            .expect("record store lock")
            .insert(record.document_id.to_string(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(state: SubmissionState) -> SubmissionRecord {
        SubmissionRecord::new(
            DocumentId::parse("20123456789-01-F001-1").expect("id"),
            state,
            "<Invoice/>",
            "hash",
        )
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        let mut rec = record(SubmissionState::Built);
        rec.advance(SubmissionState::Signed).expect("signed");
        rec.advance(SubmissionState::Packaged).expect("packaged");
        rec.advance(SubmissionState::Submitted {
            ticket: "T-1".into(),
        })
        .expect("submitted");
        assert_eq!(rec.ticket(), Some("T-1"));
        rec.advance(SubmissionState::Pending).expect("pending");
        rec.advance(SubmissionState::Pending).expect("pending again");
        rec.advance(SubmissionState::Accepted).expect("accepted");
        assert!(rec.state.is_terminal());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut rec = record(SubmissionState::Accepted);
        let err = rec
            .advance(SubmissionState::Pending)
            .expect_err("terminal state");
        assert_eq!(
            err,
            TrackerError::InvalidTransition {
                from: "accepted",
                to: "pending"
            }
        );

        let mut rec = record(SubmissionState::Built);
        assert!(rec.advance(SubmissionState::Accepted).is_err());
    }

    #[test]
    fn store_read_after_write() {
        let store = InMemoryStore::new();
        let id = DocumentId::parse("20123456789-01-F001-1").expect("id");
        assert!(store.get(&id).is_none());

        store.put(record(SubmissionState::Submitted {
            ticket: "T-9".into(),
        }));
        let stored = store.get(&id).expect("record");
        assert_eq!(stored.ticket(), Some("T-9"));
    }

    #[test]
    fn concurrent_reads_never_observe_partial_records() {
        let store = Arc::new(InMemoryStore::new());
        let id = DocumentId::parse("20123456789-01-F001-1").expect("id");

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(rec) = store.get(&id) {
                            // A visible record is always fully formed.
                            assert_eq!(rec.document_id, id);
                            assert_eq!(rec.document_hash, "hash");
                        }
                    }
                })
            })
            .collect();

        for i in 0..500 {
            store.put(record(SubmissionState::Submitted {
                ticket: format!("T-{i}"),
            }));
        }
        for reader in readers {
            reader.join().expect("reader thread");
        }
    }
}
