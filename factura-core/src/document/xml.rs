//! XML serialization for UBL documents.
use super::{
    BillingReference, CreditNote, DebitNote, DiscrepancyResponse, DocumentId, Invoice, Party,
    PostalAddress, SaleLine, SaleTotals,
};
use chrono::{NaiveDate, NaiveTime};
use constants::{
    CAC_NS, CBC_NS, CREDIT_NOTE_NS, DEBIT_NOTE_NS, DS_NS, EXT_NS, INVOICE_NS, SIGNATURE_ID,
};
use helpers::{currency_amount, quantity_with_unit, FixedPrecision};
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

pub(crate) mod constants;

/// XML serialization error.
#[derive(Debug, Error)]
pub enum DocumentXmlError {
    #[error("failed to serialize document to XML: {source}")]
    Serialize {
        #[from]
        source: SeError,
    },
}

/// XML formatting options.
#[derive(Debug, Clone, Copy, Default)]
pub enum XmlFormat {
    #[default]
    Compact,
    Pretty {
        indent_char: char,
        indent_size: usize,
    },
}

/// Serialize documents to namespace-qualified UBL XML.
///
/// # Examples
/// ```rust,no_run
/// use factura_core::document::xml::ToXml;
/// use factura_core::document::Invoice;
///
/// let invoice: Invoice = unimplemented!();
/// let xml = invoice.to_xml()?;
/// # let _ = xml;
/// # Ok::<(), factura_core::document::xml::DocumentXmlError>(())
/// ```
pub trait ToXml {
    fn to_xml_with_format(&self, format: XmlFormat) -> Result<String, DocumentXmlError>;

    fn to_xml(&self) -> Result<String, DocumentXmlError> {
        self.to_xml_with_format(XmlFormat::Pretty {
            indent_char: ' ',
            indent_size: 2,
        })
    }
}

impl ToXml for Invoice {
    fn to_xml_with_format(&self, format: XmlFormat) -> Result<String, DocumentXmlError> {
        render(&InvoiceXml(self), format)
    }
}

impl ToXml for CreditNote {
    fn to_xml_with_format(&self, format: XmlFormat) -> Result<String, DocumentXmlError> {
        render(&CreditNoteXml(self), format)
    }
}

impl ToXml for DebitNote {
    fn to_xml_with_format(&self, format: XmlFormat) -> Result<String, DocumentXmlError> {
        render(&DebitNoteXml(self), format)
    }
}

fn render<T: Serialize>(value: &T, format: XmlFormat) -> Result<String, DocumentXmlError> {
    let mut buffer = String::with_capacity(4096);
    buffer.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    buffer.push('\n');

    {
        let mut serializer = QuickXmlSerializer::new(&mut buffer);
        if let XmlFormat::Pretty {
            indent_char,
            indent_size,
        } = format
        {
            serializer.indent(indent_char, indent_size);
        }
        value.serialize(serializer)?;
    }

    Ok(buffer)
}

mod helpers {
    use serde::ser::{Serialize, SerializeStruct, Serializer};
    use std::fmt::{self, Display, Formatter};

    pub(super) struct FixedPrecision {
        value: f64,
        precision: usize,
    }

    impl FixedPrecision {
        pub(super) fn new(value: f64, precision: usize) -> Self {
            Self { value, precision }
        }
    }

    impl Display for FixedPrecision {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "{:.*}", self.precision, self.value)
        }
    }

    impl Serialize for FixedPrecision {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    struct CurrencyAmountSer<'a> {
        tag: &'static str,
        currency: &'a str,
        value: f64,
    }

    pub(super) fn currency_amount<'a>(
        tag: &'static str,
        currency: &'a str,
        value: f64,
    ) -> impl Serialize + 'a {
        CurrencyAmountSer {
            tag,
            currency,
            value,
        }
    }

    impl<'a> Serialize for CurrencyAmountSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@currencyID", self.currency)?;
            st.serialize_field("$text", &FixedPrecision::new(self.value, 2))?;
            st.end()
        }
    }

    struct QuantityWithUnitSer<'a> {
        tag: &'static str,
        value: f64,
        unit_code: &'a str,
    }

    pub(super) fn quantity_with_unit<'a>(
        tag: &'static str,
        value: f64,
        unit_code: &'a str,
    ) -> impl Serialize + 'a {
        QuantityWithUnitSer {
            tag,
            value,
            unit_code,
        }
    }

    impl<'a> Serialize for QuantityWithUnitSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@unitCode", self.unit_code)?;
            st.serialize_field("$text", &FixedPrecision::new(self.value, 2))?;
            st.end()
        }
    }
}

struct TaxSchemeXml;

impl Serialize for TaxSchemeXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxScheme", 0)?;
        st.serialize_field("cbc:ID", "1000")?;
        st.serialize_field("cbc:Name", "IGV")?;
        st.serialize_field("cbc:TaxTypeCode", "VAT")?;
        st.end()
    }
}

struct TaxCategoryXml<'a> {
    percent: f64,
    exemption_reason_code: Option<&'a str>,
}

impl<'a> Serialize for TaxCategoryXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxCategory", 0)?;
        st.serialize_field("cbc:ID", "S")?;
        st.serialize_field("cbc:Percent", &FixedPrecision::new(self.percent, 2))?;
        if let Some(code) = self.exemption_reason_code {
            st.serialize_field("cbc:TaxExemptionReasonCode", code)?;
        }
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

struct TaxSubtotalXml<'a> {
    currency: &'a str,
    taxable: f64,
    tax: f64,
    percent: f64,
    exemption_reason_code: Option<&'a str>,
}

impl<'a> Serialize for TaxSubtotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxSubtotal", 0)?;
        st.serialize_field(
            "cbc:TaxableAmount",
            &currency_amount("cbc:TaxableAmount", self.currency, self.taxable),
        )?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.tax),
        )?;
        st.serialize_field(
            "cac:TaxCategory",
            &TaxCategoryXml {
                percent: self.percent,
                exemption_reason_code: self.exemption_reason_code,
            },
        )?;
        st.end()
    }
}

struct TaxTotalXml<'a> {
    currency: &'a str,
    totals: &'a SaleTotals,
    percent: f64,
}

impl<'a> Serialize for TaxTotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxTotal", 0)?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.totals.igv),
        )?;
        st.serialize_field(
            "cac:TaxSubtotal",
            &TaxSubtotalXml {
                currency: self.currency,
                taxable: self.totals.taxable,
                tax: self.totals.igv,
                percent: self.percent,
                exemption_reason_code: None,
            },
        )?;
        st.end()
    }
}

struct MonetaryTotalXml<'a> {
    tag: &'static str,
    currency: &'a str,
    totals: &'a SaleTotals,
}

impl<'a> Serialize for MonetaryTotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct(self.tag, 0)?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount("cbc:LineExtensionAmount", self.currency, self.totals.taxable),
        )?;
        st.serialize_field(
            "cbc:TaxInclusiveAmount",
            &currency_amount("cbc:TaxInclusiveAmount", self.currency, self.totals.total),
        )?;
        st.serialize_field(
            "cbc:PayableAmount",
            &currency_amount("cbc:PayableAmount", self.currency, self.totals.total),
        )?;
        st.end()
    }
}

struct PostalAddressXml<'a>(&'a PostalAddress);

impl<'a> Serialize for PostalAddressXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let address = self.0;
        let mut st = s.serialize_struct("cac:PostalAddress", 0)?;
        st.serialize_field("cbc:ID", &address.ubigeo)?;
        st.serialize_field("cbc:StreetName", &address.street)?;
        st.serialize_field("cbc:CityName", &address.province)?;
        st.serialize_field("cbc:CountrySubentity", &address.department)?;
        st.serialize_field("cbc:District", &address.district)?;
        st.serialize_field("cac:Country", &CountryXml)?;
        st.end()
    }
}

struct CountryXml;

impl Serialize for CountryXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Country", 0)?;
        st.serialize_field("cbc:IdentificationCode", "PE")?;
        st.end()
    }
}

struct PartyXml<'a> {
    party: &'a Party,
    /// Suppliers carry a `cac:PartyName`; customers only the legal entity.
    with_name: bool,
}

impl<'a> Serialize for PartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let party = self.party;
        let mut st = s.serialize_struct("cac:Party", 0)?;
        if self.with_name {
            st.serialize_field("cac:PartyName", &PartyNameXml(party.display_name()))?;
        }
        if let Some(address) = &party.address {
            st.serialize_field("cac:PostalAddress", &PostalAddressXml(address))?;
        }
        st.serialize_field("cac:PartyLegalEntity", &PartyLegalEntityXml(party))?;
        st.end()
    }
}

impl Party {
    fn display_name(&self) -> &str {
        self.trade_name.as_deref().unwrap_or(&self.registration_name)
    }
}

struct PartyNameXml<'a>(&'a str);

impl<'a> Serialize for PartyNameXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyName", 0)?;
        st.serialize_field("cbc:Name", self.0)?;
        st.end()
    }
}

struct PartyLegalEntityXml<'a>(&'a Party);

impl<'a> Serialize for PartyLegalEntityXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyLegalEntity", 0)?;
        st.serialize_field("cbc:RegistrationName", &self.0.registration_name)?;
        st.serialize_field("cbc:CompanyID", self.0.ruc.as_str())?;
        st.end()
    }
}

struct AccountingPartyXml<'a> {
    tag: &'static str,
    party: &'a Party,
    with_name: bool,
}

impl<'a> Serialize for AccountingPartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct(self.tag, 0)?;
        st.serialize_field("cbc:CustomerAssignedAccountID", self.party.ruc.as_str())?;
        st.serialize_field(
            "cac:Party",
            &PartyXml {
                party: self.party,
                with_name: self.with_name,
            },
        )?;
        st.end()
    }
}

/// The `cac:Signature` signatory block. The digital signature itself lives
/// in the extension content this block points at.
struct SignatoryXml<'a>(&'a Party);

impl<'a> Serialize for SignatoryXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct SignatoryPartyXml<'a>(&'a Party);
        impl<'a> Serialize for SignatoryPartyXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                struct IdXml<'a>(&'a str);
                impl<'a> Serialize for IdXml<'a> {
                    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
                    where
                        S: Serializer,
                    {
                        let mut st = s.serialize_struct("cac:PartyIdentification", 0)?;
                        st.serialize_field("cbc:ID", self.0)?;
                        st.end()
                    }
                }
                let mut st = s.serialize_struct("cac:SignatoryParty", 0)?;
                st.serialize_field("cac:PartyIdentification", &IdXml(self.0.ruc.as_str()))?;
                st.serialize_field("cac:PartyName", &PartyNameXml(&self.0.registration_name))?;
                st.end()
            }
        }

        struct AttachmentXml;
        impl Serialize for AttachmentXml {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                struct ReferenceXml;
                impl Serialize for ReferenceXml {
                    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
                    where
                        S: Serializer,
                    {
                        let mut st = s.serialize_struct("cac:ExternalReference", 0)?;
                        st.serialize_field("cbc:URI", &format!("#{SIGNATURE_ID}"))?;
                        st.end()
                    }
                }
                let mut st = s.serialize_struct("cac:DigitalSignatureAttachment", 0)?;
                st.serialize_field("cac:ExternalReference", &ReferenceXml)?;
                st.end()
            }
        }

        let mut st = s.serialize_struct("cac:Signature", 0)?;
        st.serialize_field("cbc:ID", SIGNATURE_ID)?;
        st.serialize_field("cac:SignatoryParty", &SignatoryPartyXml(self.0))?;
        st.serialize_field("cac:DigitalSignatureAttachment", &AttachmentXml)?;
        st.end()
    }
}

struct DiscrepancyXml<'a>(&'a DiscrepancyResponse);

impl<'a> Serialize for DiscrepancyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:DiscrepancyResponse", 0)?;
        st.serialize_field("cbc:ReferenceID", &self.0.reference_id)?;
        st.serialize_field("cbc:ResponseCode", &self.0.response_code)?;
        st.serialize_field("cbc:Description", &self.0.description)?;
        st.end()
    }
}

struct BillingReferenceXml<'a>(&'a BillingReference);

impl<'a> Serialize for BillingReferenceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct DocumentReferenceXml<'a>(&'a BillingReference);
        impl<'a> Serialize for DocumentReferenceXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("cac:InvoiceDocumentReference", 0)?;
                st.serialize_field("cbc:ID", &self.0.id)?;
                if let Some(code) = &self.0.document_type_code {
                    st.serialize_field("cbc:DocumentTypeCode", code)?;
                }
                st.end()
            }
        }
        let mut st = s.serialize_struct("cac:BillingReference", 0)?;
        st.serialize_field(
            "cac:InvoiceDocumentReference",
            &DocumentReferenceXml(self.0),
        )?;
        st.end()
    }
}

struct LineXml<'a> {
    line: &'a SaleLine,
    currency: &'a str,
    line_tag: &'static str,
    quantity_tag: &'static str,
}

impl<'a> Serialize for LineXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct ItemXml<'a>(&'a str);
        impl<'a> Serialize for ItemXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("cac:Item", 0)?;
                st.serialize_field("cbc:Description", self.0)?;
                st.end()
            }
        }

        struct PriceXml<'a> {
            currency: &'a str,
            amount: f64,
        }
        impl<'a> Serialize for PriceXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("cac:Price", 0)?;
                st.serialize_field(
                    "cbc:PriceAmount",
                    &currency_amount("cbc:PriceAmount", self.currency, self.amount),
                )?;
                st.end()
            }
        }

        let line = self.line;
        let mut st = s.serialize_struct(self.line_tag, 0)?;
        st.serialize_field("cbc:ID", &line.id.to_string())?;
        st.serialize_field(
            self.quantity_tag,
            &quantity_with_unit(self.quantity_tag, line.quantity, &line.unit_code),
        )?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount("cbc:LineExtensionAmount", self.currency, line.line_total),
        )?;

        struct LineTaxTotalXml<'a> {
            currency: &'a str,
            line: &'a SaleLine,
        }
        impl<'a> Serialize for LineTaxTotalXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let line = self.line;
                let mut st = s.serialize_struct("cac:TaxTotal", 0)?;
                st.serialize_field(
                    "cbc:TaxAmount",
                    &currency_amount("cbc:TaxAmount", self.currency, line.igv_amount),
                )?;
                st.serialize_field(
                    "cac:TaxSubtotal",
                    &TaxSubtotalXml {
                        currency: self.currency,
                        taxable: line.line_total,
                        tax: line.igv_amount,
                        percent: line.igv_rate,
                        exemption_reason_code: line.affectation_code.as_deref(),
                    },
                )?;
                st.end()
            }
        }
        st.serialize_field(
            "cac:TaxTotal",
            &LineTaxTotalXml {
                currency: self.currency,
                line,
            },
        )?;
        st.serialize_field("cac:Item", &ItemXml(&line.description))?;
        st.serialize_field(
            "cac:Price",
            &PriceXml {
                currency: self.currency,
                amount: line.unit_price,
            },
        )?;
        st.end()
    }
}

fn namespace_fields<T: SerializeStruct>(st: &mut T, document_ns: &'static str) -> Result<(), T::Error> {
    st.serialize_field("@xmlns", document_ns)?;
    st.serialize_field("@xmlns:cac", CAC_NS)?;
    st.serialize_field("@xmlns:cbc", CBC_NS)?;
    st.serialize_field("@xmlns:ds", DS_NS)?;
    st.serialize_field("@xmlns:ext", EXT_NS)?;
    Ok(())
}

fn header_fields<T: SerializeStruct>(
    st: &mut T,
    id: &DocumentId,
    issue_date: NaiveDate,
    issue_time: NaiveTime,
) -> Result<(), T::Error> {
    st.serialize_field("cbc:UBLVersionID", "2.1")?;
    st.serialize_field("cbc:CustomizationID", "2.0")?;
    st.serialize_field("cbc:ID", &id.short_id())?;
    st.serialize_field("cbc:IssueDate", &issue_date.to_string())?;
    st.serialize_field("cbc:IssueTime", &issue_time.format("%H:%M:%S").to_string())?;
    Ok(())
}

fn first_line_rate(lines: &[SaleLine]) -> f64 {
    lines.first().map(|line| line.igv_rate).unwrap_or(18.0)
}

pub(crate) struct InvoiceXml<'a>(pub &'a Invoice);

impl<'a> Serialize for InvoiceXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let invoice = self.0;
        let currency = invoice.currency.code();
        let mut root = serializer.serialize_struct("Invoice", 0)?;

        namespace_fields(&mut root, INVOICE_NS)?;
        header_fields(&mut root, &invoice.id, invoice.issue_date, invoice.issue_time)?;
        root.serialize_field("cbc:InvoiceTypeCode", invoice.id.kind().code())?;
        root.serialize_field("cbc:DocumentCurrencyCode", currency)?;
        root.serialize_field("cbc:LineCountNumeric", &invoice.lines.len().to_string())?;

        root.serialize_field("cac:Signature", &SignatoryXml(&invoice.supplier))?;
        root.serialize_field(
            "cac:AccountingSupplierParty",
            &AccountingPartyXml {
                tag: "cac:AccountingSupplierParty",
                party: &invoice.supplier,
                with_name: true,
            },
        )?;
        root.serialize_field(
            "cac:AccountingCustomerParty",
            &AccountingPartyXml {
                tag: "cac:AccountingCustomerParty",
                party: &invoice.customer,
                with_name: false,
            },
        )?;

        root.serialize_field(
            "cac:TaxTotal",
            &TaxTotalXml {
                currency,
                totals: &invoice.totals,
                percent: first_line_rate(&invoice.lines),
            },
        )?;
        root.serialize_field(
            "cac:LegalMonetaryTotal",
            &MonetaryTotalXml {
                tag: "cac:LegalMonetaryTotal",
                currency,
                totals: &invoice.totals,
            },
        )?;
        for line in &invoice.lines {
            root.serialize_field(
                "cac:InvoiceLine",
                &LineXml {
                    line,
                    currency,
                    line_tag: "cac:InvoiceLine",
                    quantity_tag: "cbc:InvoicedQuantity",
                },
            )?;
        }
        root.end()
    }
}

pub(crate) struct CreditNoteXml<'a>(pub &'a CreditNote);

impl<'a> Serialize for CreditNoteXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let note = self.0;
        let currency = note.currency.code();
        let mut root = serializer.serialize_struct("CreditNote", 0)?;

        namespace_fields(&mut root, CREDIT_NOTE_NS)?;
        header_fields(&mut root, &note.id, note.issue_date, note.issue_time)?;
        if let Some(text) = &note.note {
            root.serialize_field("cbc:Note", text)?;
        }
        root.serialize_field("cbc:DocumentCurrencyCode", currency)?;
        root.serialize_field("cbc:LineCountNumeric", &note.lines.len().to_string())?;

        root.serialize_field("cac:DiscrepancyResponse", &DiscrepancyXml(&note.discrepancy))?;
        root.serialize_field(
            "cac:BillingReference",
            &BillingReferenceXml(&note.billing_reference),
        )?;

        root.serialize_field("cac:Signature", &SignatoryXml(&note.supplier))?;
        root.serialize_field(
            "cac:AccountingSupplierParty",
            &AccountingPartyXml {
                tag: "cac:AccountingSupplierParty",
                party: &note.supplier,
                with_name: true,
            },
        )?;
        root.serialize_field(
            "cac:AccountingCustomerParty",
            &AccountingPartyXml {
                tag: "cac:AccountingCustomerParty",
                party: &note.customer,
                with_name: false,
            },
        )?;

        root.serialize_field(
            "cac:TaxTotal",
            &TaxTotalXml {
                currency,
                totals: &note.totals,
                percent: first_line_rate(&note.lines),
            },
        )?;
        root.serialize_field(
            "cac:LegalMonetaryTotal",
            &MonetaryTotalXml {
                tag: "cac:LegalMonetaryTotal",
                currency,
                totals: &note.totals,
            },
        )?;
        for line in &note.lines {
            root.serialize_field(
                "cac:CreditNoteLine",
                &LineXml {
                    line,
                    currency,
                    line_tag: "cac:CreditNoteLine",
                    quantity_tag: "cbc:CreditedQuantity",
                },
            )?;
        }
        root.end()
    }
}

pub(crate) struct DebitNoteXml<'a>(pub &'a DebitNote);

impl<'a> Serialize for DebitNoteXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let note = self.0;
        let currency = note.currency.code();
        let mut root = serializer.serialize_struct("DebitNote", 0)?;

        namespace_fields(&mut root, DEBIT_NOTE_NS)?;
        header_fields(&mut root, &note.id, note.issue_date, note.issue_time)?;
        if let Some(text) = &note.note {
            root.serialize_field("cbc:Note", text)?;
        }
        root.serialize_field("cbc:DocumentCurrencyCode", currency)?;
        root.serialize_field("cbc:LineCountNumeric", &note.lines.len().to_string())?;

        root.serialize_field("cac:DiscrepancyResponse", &DiscrepancyXml(&note.discrepancy))?;
        root.serialize_field(
            "cac:BillingReference",
            &BillingReferenceXml(&note.billing_reference),
        )?;

        root.serialize_field("cac:Signature", &SignatoryXml(&note.supplier))?;
        root.serialize_field(
            "cac:AccountingSupplierParty",
            &AccountingPartyXml {
                tag: "cac:AccountingSupplierParty",
                party: &note.supplier,
                with_name: true,
            },
        )?;
        root.serialize_field(
            "cac:AccountingCustomerParty",
            &AccountingPartyXml {
                tag: "cac:AccountingCustomerParty",
                party: &note.customer,
                with_name: false,
            },
        )?;

        root.serialize_field(
            "cac:TaxTotal",
            &TaxTotalXml {
                currency,
                totals: &note.totals,
                percent: first_line_rate(&note.lines),
            },
        )?;
        // Debit notes total under RequestedMonetaryTotal rather than
        // LegalMonetaryTotal.
        root.serialize_field(
            "cac:RequestedMonetaryTotal",
            &MonetaryTotalXml {
                tag: "cac:RequestedMonetaryTotal",
                currency,
                totals: &note.totals,
            },
        )?;
        for line in &note.lines {
            root.serialize_field(
                "cac:DebitNoteLine",
                &LineXml {
                    line,
                    currency,
                    line_tag: "cac:DebitNoteLine",
                    quantity_tag: "cbc:DebitedQuantity",
                },
            )?;
        }
        root.end()
    }
}
