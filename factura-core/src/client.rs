//! High-level SUNAT client: sign, package, submit, consult.
use crate::config::{Config, ServiceOperation};
use crate::document::xml::DocumentXmlError;
use crate::document::{CreditNote, DebitNote, DocumentError, DocumentId, Invoice, UblDocument};
use crate::package::{decode_base64, encode_base64, package, PackageError};
use crate::sign::{
    document_hash_hex, CertificateError, CertificateStore, DocumentSigner, SigningError,
};
use crate::soap::{ResponseXml, SendBill, SoapClient, SoapError, StatusQuery, TicketQuery};
use crate::tracker::{
    DocumentStore, InMemoryStore, SubmissionRecord, SubmissionState, TrackerError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Overrides every routed endpoint when set; used to point the client at
/// a stand-in service.
const BASE_URL_ENV: &str = "FACTURA_SUNAT_BASE_URL";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Xml(#[from] DocumentXmlError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Soap(#[from] SoapError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("unexpected response shape: {0}")]
    Response(String),
    #[error("no submission record for document {0}")]
    UnknownDocument(String),
}

/// A signed document ready for packaging.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub id: DocumentId,
    pub xml: String,
    /// SHA-256 hex fingerprint of the signed bytes.
    pub hash: String,
}

/// Outcome of a sendBill exchange: an asynchronous ticket or the
/// authority's immediate CDR archive.
#[derive(Debug, Clone)]
pub enum Submission {
    Ticket(String),
    Receipt { archive: Vec<u8> },
}

/// Parsed consultation outcome.
#[derive(Debug, Clone)]
pub struct DocumentStatus {
    /// Raw authority status code, e.g. "0", "98", "99".
    pub code: String,
    pub state: SubmissionState,
    /// CDR archive, present once the document has been processed.
    pub receipt: Option<Vec<u8>>,
}

/// Map the authority's status codes onto the submission lifecycle:
/// 0 = processed and accepted, 98 = still in process, 99 = processed with
/// errors. Unknown codes stay pending so callers keep polling.
fn status_state(code: &str) -> SubmissionState {
    match code {
        "0" => SubmissionState::Accepted,
        "99" => SubmissionState::Rejected,
        _ => SubmissionState::Pending,
    }
}

/// SUNAT billService client.
///
/// # Examples
/// ```rust,no_run
/// use factura_core::client::SunatClient;
/// use factura_core::config::{Config, Environment, SolCredentials};
///
/// let config = Config::new(
///     Environment::Beta,
///     SolCredentials::new("20123456789", "MODDATOS", "moddatos"),
/// );
/// let pem = std::fs::read("certificados/issuer.pem")?;
/// let client = SunatClient::new(config, pem)?;
/// # let _ = client;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SunatClient {
    config: Config,
    soap: SoapClient,
    certificates: CertificateStore,
    store: Arc<dyn DocumentStore>,
}

impl SunatClient {
    pub fn new(config: Config, certificate_pem: impl Into<Vec<u8>>) -> Result<Self, ClientError> {
        let soap = SoapClient::new(config.credentials().clone(), config.timeout())?;
        Ok(Self {
            config,
            soap,
            certificates: CertificateStore::new(certificate_pem),
            store: Arc::new(InMemoryStore::new()),
        })
    }

    /// Swap the record store for a custom backend.
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    fn endpoint(&self, operation: ServiceOperation) -> String {
        std::env::var(BASE_URL_ENV)
            .ok()
            .unwrap_or_else(|| self.config.env().endpoint_url(operation).to_string())
    }

    /// Assemble and sign: validate, serialize the unsigned tree, compute
    /// the enveloped signature over its canonical form, and wrap it into
    /// the final extension-bearing document.
    pub fn sign_document(&self, document: &dyn UblDocument) -> Result<SignedDocument, ClientError> {
        document.validate()?;
        let unsigned = document.to_xml()?;
        let key_material = self.certificates.load()?;
        let signer = DocumentSigner::new(key_material);
        let signed_xml = signer.sign_xml(&unsigned)?;
        let hash = document_hash_hex(signed_xml.as_bytes());
        debug!(document = %document.document_id(), "document signed");
        Ok(SignedDocument {
            id: document.document_id().clone(),
            xml: signed_xml,
            hash,
        })
    }

    /// Full submission pipeline: sign, package, sendBill, record. No state
    /// is recorded unless the exchange succeeds.
    pub async fn submit(&self, document: &dyn UblDocument) -> Result<Submission, ClientError> {
        let signed = self.sign_document(document)?;
        let archive = package(signed.xml.as_bytes(), &signed.id)?;
        let request = SendBill {
            file_name: signed.id.zip_file_name(),
            content_file: encode_base64(&archive),
        };

        let inner = self
            .soap
            .call(&self.endpoint(ServiceOperation::Submit), &request)
            .await?;
        let submission = parse_submission(&inner)?;

        let record = match &submission {
            Submission::Ticket(ticket) => SubmissionRecord::new(
                signed.id.clone(),
                SubmissionState::Submitted {
                    ticket: ticket.clone(),
                },
                signed.xml,
                signed.hash,
            ),
            Submission::Receipt { archive } => {
                let mut record = SubmissionRecord::new(
                    signed.id.clone(),
                    SubmissionState::Accepted,
                    signed.xml,
                    signed.hash,
                );
                record.receipt_zip = Some(archive.clone());
                record
            }
        };
        self.store.put(record);
        Ok(submission)
    }

    pub async fn submit_invoice(&self, invoice: &Invoice) -> Result<Submission, ClientError> {
        self.submit(invoice).await
    }

    pub async fn submit_credit_note(&self, note: &CreditNote) -> Result<Submission, ClientError> {
        self.submit(note).await
    }

    pub async fn submit_debit_note(&self, note: &DebitNote) -> Result<Submission, ClientError> {
        self.submit(note).await
    }

    /// getStatus by document identifier; updates the stored record when
    /// one exists.
    pub async fn consult_status(&self, id: &DocumentId) -> Result<DocumentStatus, ClientError> {
        let status = self
            .consult_by_id(id, ServiceOperation::ConsultStatus)
            .await?;
        self.apply_status(id, &status);
        Ok(status)
    }

    /// getStatus aimed at retrieving the CDR archive for a processed
    /// document; updates the stored record when one exists.
    pub async fn consult_cdr(&self, id: &DocumentId) -> Result<DocumentStatus, ClientError> {
        let status = self
            .consult_by_id(id, ServiceOperation::ConsultStatus)
            .await?;
        self.apply_status(id, &status);
        Ok(status)
    }

    /// getStatus by ticket. Does not touch the record store; use
    /// [`refresh`][SunatClient::refresh] to resolve a tracked submission.
    pub async fn consult_ticket(&self, ticket: &str) -> Result<DocumentStatus, ClientError> {
        let request = TicketQuery {
            ticket: ticket.to_string(),
        };
        let inner = self
            .soap
            .call(&self.endpoint(ServiceOperation::ConsultTicket), &request)
            .await?;
        parse_status(&inner)
    }

    /// Resolve a tracked submission: consult by stored ticket when one
    /// exists, by document identifier otherwise, and advance the record.
    pub async fn refresh(&self, id: &DocumentId) -> Result<SubmissionState, ClientError> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| ClientError::UnknownDocument(id.to_string()))?;
        if record.state.is_terminal() {
            return Ok(record.state);
        }

        let status = match record.ticket() {
            Some(ticket) => self.consult_ticket(ticket).await?,
            None => {
                self.consult_by_id(id, ServiceOperation::ConsultStatus)
                    .await?
            }
        };
        self.apply_status(id, &status);
        Ok(status.state)
    }

    async fn consult_by_id(
        &self,
        id: &DocumentId,
        operation: ServiceOperation,
    ) -> Result<DocumentStatus, ClientError> {
        let request = StatusQuery {
            ruc: id.ruc().to_string(),
            document_type: id.kind().code().to_string(),
            series: id.series().to_string(),
            number: id.number().to_string(),
        };
        let inner = self.soap.call(&self.endpoint(operation), &request).await?;
        parse_status(&inner)
    }

    fn apply_status(&self, id: &DocumentId, status: &DocumentStatus) {
        let Some(mut record) = self.store.get(id) else {
            return;
        };
        if record.state != status.state {
            if let Err(err) = record.advance(status.state.clone()) {
                warn!(document = %id, %err, "ignoring out-of-order status transition");
                return;
            }
        }
        if let Some(receipt) = &status.receipt {
            record.receipt_zip = Some(receipt.clone());
        }
        self.store.put(record);
    }
}

fn parse_submission(inner_body: &str) -> Result<Submission, ClientError> {
    let response = ResponseXml::parse(inner_body)?;
    if let Some(content) = response.element_text("applicationResponse") {
        return Ok(Submission::Receipt {
            archive: decode_base64(&content)?,
        });
    }
    if let Some(ticket) = response.element_text("ticket") {
        return Ok(Submission::Ticket(ticket));
    }
    Err(ClientError::Response(
        "sendBillResponse carried neither a ticket nor an applicationResponse".into(),
    ))
}

fn parse_status(inner_body: &str) -> Result<DocumentStatus, ClientError> {
    let response = ResponseXml::parse(inner_body)?;
    let code = response.element_text("statusCode").ok_or_else(|| {
        ClientError::Response("getStatusResponse carried no statusCode".into())
    })?;
    let receipt = match response.element_text("content") {
        Some(content) => Some(decode_base64(&content)?),
        None => None,
    };
    Ok(DocumentStatus {
        state: status_state(&code),
        code,
        receipt,
    })
}
