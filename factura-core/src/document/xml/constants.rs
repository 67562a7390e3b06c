pub(crate) const INVOICE_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
pub(crate) const CREDIT_NOTE_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2";
pub(crate) const DEBIT_NOTE_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:DebitNote-2";
pub(crate) const CBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub(crate) const CAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub(crate) const EXT_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

// Legacy SUNAT signature profile. SHA-1 and RSA-PKCS#1 v1.5 are what the
// authority's schema accepts; changing them breaks acceptance.
pub(crate) const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub(crate) const ENVELOPED_SIGNATURE_ALGORITHM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub(crate) const RSA_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub(crate) const SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

/// `cbc:ID` of the `cac:Signature` signatory block and the URI fragment its
/// external reference points at.
pub(crate) const SIGNATURE_ID: &str = "SignatureSP";
