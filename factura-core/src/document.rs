//! UBL document model: invoices, credit notes and debit notes.
pub mod xml;

use chrono::{NaiveDate, NaiveTime};
use iso_currency::Currency;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Document-level validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("invalid RUC: {value}")]
    InvalidRuc { value: String },
    #[error("invalid series: {value}")]
    InvalidSeries { value: String },
    #[error("invalid document number: {value}")]
    InvalidNumber { value: String },
    #[error("unknown document type code: {code}")]
    UnknownTypeCode { code: String },
    #[error("malformed document identifier: {value}")]
    MalformedId { value: String },
    #[error("document has no lines")]
    EmptyLines,
    #[error("missing reference to the modified document")]
    MissingReference,
}

/// Issuer tax identifier. SUNAT RUCs are exactly eleven digits.
///
/// # Examples
/// ```rust
/// use factura_core::document::Ruc;
///
/// let ruc = Ruc::parse("20123456789")?;
/// assert_eq!(ruc.as_str(), "20123456789");
/// # Ok::<(), factura_core::document::DocumentError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ruc(String);

impl Ruc {
    pub fn parse<S: Into<String>>(s: S) -> Result<Self, DocumentError> {
        let s = s.into().trim().to_string();
        if s.len() != 11 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DocumentError::InvalidRuc { value: s });
        }
        Ok(Ruc(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Ruc {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for Ruc {
    type Err = DocumentError;
    fn from_str(s: &str) -> Result<Self, DocumentError> {
        Ruc::parse(s)
    }
}

impl TryFrom<String> for Ruc {
    type Error = DocumentError;
    fn try_from(value: String) -> Result<Self, DocumentError> {
        Ruc::parse(value)
    }
}

impl From<Ruc> for String {
    fn from(value: Ruc) -> String {
        value.0
    }
}

impl fmt::Display for Ruc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document kinds and their SUNAT type codes (catálogo 01).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
    DebitNote,
}

impl DocumentKind {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "01",
            DocumentKind::CreditNote => "07",
            DocumentKind::DebitNote => "08",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DocumentError> {
        match code {
            "01" => Ok(DocumentKind::Invoice),
            "07" => Ok(DocumentKind::CreditNote),
            "08" => Ok(DocumentKind::DebitNote),
            _ => Err(DocumentError::UnknownTypeCode {
                code: code.to_string(),
            }),
        }
    }
}

/// Wire-visible document identifier: `{RUC}-{tipo}-{serie}-{numero}`.
/// Keys the submission tracker and names the transport archive.
///
/// # Examples
/// ```rust
/// use factura_core::document::DocumentId;
///
/// let id = DocumentId::parse("20123456789-01-F001-1")?;
/// assert_eq!(id.to_string(), "20123456789-01-F001-1");
/// assert_eq!(id.zip_file_name(), "20123456789-01-F001-1.zip");
/// # Ok::<(), factura_core::document::DocumentError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId {
    ruc: Ruc,
    kind: DocumentKind,
    series: String,
    number: u32,
}

impl DocumentId {
    pub fn new(
        ruc: Ruc,
        kind: DocumentKind,
        series: impl Into<String>,
        number: u32,
    ) -> Result<Self, DocumentError> {
        let series = series.into();
        if series.is_empty()
            || series.len() > 4
            || !series.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(DocumentError::InvalidSeries { value: series });
        }
        Ok(Self {
            ruc,
            kind,
            series,
            number,
        })
    }

    pub fn parse(s: &str) -> Result<Self, DocumentError> {
        let mut parts = s.splitn(4, '-');
        let (ruc, code, series, number) = match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(ruc), Some(code), Some(series), Some(number)) => (ruc, code, series, number),
            _ => {
                return Err(DocumentError::MalformedId {
                    value: s.to_string(),
                })
            }
        };
        let number = number
            .parse::<u32>()
            .map_err(|_| DocumentError::InvalidNumber {
                value: number.to_string(),
            })?;
        DocumentId::new(Ruc::parse(ruc)?, DocumentKind::from_code(code)?, series, number)
    }

    pub fn ruc(&self) -> &Ruc {
        &self.ruc
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// `cbc:ID` body: `{serie}-{numero}`.
    pub fn short_id(&self) -> String {
        format!("{}-{}", self.series, self.number)
    }

    pub fn xml_file_name(&self) -> String {
        format!("{self}.xml")
    }

    pub fn zip_file_name(&self) -> String {
        format!("{self}.zip")
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.ruc,
            self.kind.code(),
            self.series,
            self.number
        )
    }
}

impl FromStr for DocumentId {
    type Err = DocumentError;
    fn from_str(s: &str) -> Result<Self, DocumentError> {
        DocumentId::parse(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DocumentError;
    fn try_from(value: String) -> Result<Self, DocumentError> {
        DocumentId::parse(&value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> String {
        value.to_string()
    }
}

/// Postal address for the issuing party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: String,
    pub district: String,
    pub province: String,
    pub department: String,
    /// INEI geographic code.
    pub ubigeo: String,
}

/// A party block: issuer or customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub ruc: Ruc,
    pub registration_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

impl Party {
    pub fn new(ruc: Ruc, registration_name: impl Into<String>) -> Self {
        Self {
            ruc,
            registration_name: registration_name.into(),
            trade_name: None,
            address: None,
        }
    }

    pub fn with_address(mut self, address: PostalAddress) -> Self {
        self.address = Some(address);
        self
    }
}

/// Document-level totals: taxable base, IGV, and the payable total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub taxable: f64,
    pub igv: f64,
    pub total: f64,
}

/// A single sale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    pub id: u32,
    pub description: String,
    pub quantity: f64,
    /// UN/ECE rec 20 unit, e.g. "NIU" or "ZZ".
    pub unit_code: String,
    pub unit_price: f64,
    pub igv_amount: f64,
    pub igv_rate: f64,
    /// Catálogo 07 IGV affectation code, e.g. "10" for gravado.
    #[serde(default)]
    pub affectation_code: Option<String>,
    pub line_total: f64,
}

/// Reason block carried by credit and debit notes (catálogo 09/10 codes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyResponse {
    /// Identifier of the modified document, e.g. "F001-1".
    pub reference_id: String,
    pub response_code: String,
    pub description: String,
}

/// Reference back to the modified document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingReference {
    pub id: String,
    #[serde(default)]
    pub document_type_code: Option<String>,
}

/// An invoice (factura, tipo 01), ready for serialization and signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: DocumentId,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    pub currency: Currency,
    pub supplier: Party,
    pub customer: Party,
    pub totals: SaleTotals,
    pub lines: Vec<SaleLine>,
}

/// A credit note (nota de crédito, tipo 07).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: DocumentId,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    #[serde(default)]
    pub note: Option<String>,
    pub currency: Currency,
    pub discrepancy: DiscrepancyResponse,
    pub billing_reference: BillingReference,
    pub supplier: Party,
    pub customer: Party,
    pub totals: SaleTotals,
    pub lines: Vec<SaleLine>,
}

/// A debit note (nota de débito, tipo 08).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitNote {
    pub id: DocumentId,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    #[serde(default)]
    pub note: Option<String>,
    pub currency: Currency,
    pub discrepancy: DiscrepancyResponse,
    pub billing_reference: BillingReference,
    pub supplier: Party,
    pub customer: Party,
    pub totals: SaleTotals,
    pub lines: Vec<SaleLine>,
}

/// Common surface over the three document kinds, as consumed by the
/// signing and submission pipeline.
pub trait UblDocument: xml::ToXml {
    fn document_id(&self) -> &DocumentId;
    fn validate(&self) -> Result<(), DocumentError>;
}

impl UblDocument for Invoice {
    fn document_id(&self) -> &DocumentId {
        &self.id
    }

    fn validate(&self) -> Result<(), DocumentError> {
        if self.lines.is_empty() {
            return Err(DocumentError::EmptyLines);
        }
        Ok(())
    }
}

fn validate_note(
    lines: &[SaleLine],
    discrepancy: &DiscrepancyResponse,
    billing_reference: &BillingReference,
) -> Result<(), DocumentError> {
    if lines.is_empty() {
        return Err(DocumentError::EmptyLines);
    }
    if discrepancy.reference_id.is_empty() || billing_reference.id.is_empty() {
        return Err(DocumentError::MissingReference);
    }
    Ok(())
}

impl UblDocument for CreditNote {
    fn document_id(&self) -> &DocumentId {
        &self.id
    }

    fn validate(&self) -> Result<(), DocumentError> {
        validate_note(&self.lines, &self.discrepancy, &self.billing_reference)
    }
}

impl UblDocument for DebitNote {
    fn document_id(&self) -> &DocumentId {
        &self.id
    }

    fn validate(&self) -> Result<(), DocumentError> {
        validate_note(&self.lines, &self.discrepancy, &self.billing_reference)
    }
}
