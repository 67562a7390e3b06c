//! Certificate handling, canonicalization and enveloped XML-DSig signing.
//!
//! The signature profile is the legacy one the SUNAT schema mandates:
//! C14N 1.0, SHA-1 digests and RSA-PKCS#1 v1.5 signatures. Do not upgrade
//! the algorithms without confirming the authority accepts the replacement.
use crate::document::xml::constants::{
    C14N_ALGORITHM, DS_NS, ENVELOPED_SIGNATURE_ALGORITHM, EXT_NS, RSA_SHA1_ALGORITHM,
    SHA1_ALGORITHM, SIGNATURE_ID,
};
use base64ct::{Base64, Encoding};
use libxml::{
    parser::Parser,
    tree::{c14n, Document, Node},
    xpath,
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

/// Key material loading errors. All of these are fatal; retrying without
/// fixing the input cannot help.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("no CERTIFICATE block found in PEM input")]
    MissingCertificate,
    #[error("no private key block found in PEM input")]
    MissingPrivateKey,
    #[error("private key is not an RSA key")]
    KeyNotRsa,
    #[error("malformed PEM input: {source}")]
    Pem {
        #[from]
        source: pem::PemError,
    },
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
    #[error("PFX key stores are not supported; convert the bundle to PEM")]
    PfxUnsupported,
    #[error("error reading key material: {0}")]
    Io(#[from] std::io::Error),
}

/// Signing pipeline errors.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("signature verification failed: {0}")]
    Verification(String),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

/// An X.509 certificate and its RSA private key, parsed from a PEM bundle.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    certificate: Certificate,
    private_key: RsaPrivateKey,
}

impl KeyMaterial {
    /// Parse a PEM bundle holding one `CERTIFICATE` block and one
    /// `PRIVATE KEY` or `RSA PRIVATE KEY` block. Keys are tried as PKCS#1
    /// first, then PKCS#8.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, CertificateError> {
        let blocks = pem::parse_many(pem_bytes)?;

        let mut certificate = None;
        let mut private_key = None;
        for block in &blocks {
            match block.tag() {
                "CERTIFICATE" => {
                    let parsed = Certificate::from_der(block.contents())
                        .map_err(|e| CertificateError::MalformedCertificate(format!("{e:?}")))?;
                    certificate = Some(parsed);
                }
                "RSA PRIVATE KEY" | "PRIVATE KEY" => {
                    let parsed = match RsaPrivateKey::from_pkcs1_der(block.contents()) {
                        Ok(key) => key,
                        Err(_) => RsaPrivateKey::from_pkcs8_der(block.contents())
                            .map_err(|_| CertificateError::KeyNotRsa)?,
                    };
                    private_key = Some(parsed);
                }
                _ => {}
            }
        }

        let certificate = certificate.ok_or(CertificateError::MissingCertificate)?;
        let private_key = private_key.ok_or(CertificateError::MissingPrivateKey)?;
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// PFX loading was dropped when the deployment moved to PEM bundles.
    pub fn from_pfx(_pfx_bytes: &[u8], _password: &str) -> Result<Self, CertificateError> {
        Err(CertificateError::PfxUnsupported)
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Certificate DER as base64 with no PEM armor or newlines, the form
    /// `ds:X509Certificate` carries.
    pub fn certificate_base64(&self) -> Result<String, CertificateError> {
        let der = self
            .certificate
            .to_der()
            .map_err(|e| CertificateError::MalformedCertificate(format!("{e:?}")))?;
        Ok(Base64::encode_string(&der))
    }

    pub fn public_key(&self) -> Result<RsaPublicKey, CertificateError> {
        rsa_public_key(&self.certificate).map_err(|_| CertificateError::KeyNotRsa)
    }
}

fn rsa_public_key(certificate: &Certificate) -> Result<RsaPublicKey, SigningError> {
    let spki_der = certificate
        .tbs_certificate()
        .subject_public_key_info()
        .to_der()
        .map_err(|e| SigningError::Signing(format!("SPKI encoding error: {e:?}")))?;
    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|_| SigningError::Certificate(CertificateError::KeyNotRsa))
}

/// Cached key material behind a read-mostly lock. The PEM source is parsed
/// once and reused until [`reload`][CertificateStore::reload] or
/// [`invalidate`][CertificateStore::invalidate].
#[derive(Debug)]
pub struct CertificateStore {
    pem: RwLock<Vec<u8>>,
    cached: RwLock<Option<Arc<KeyMaterial>>>,
}

impl CertificateStore {
    pub fn new(pem_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            pem: RwLock::new(pem_bytes.into()),
            cached: RwLock::new(None),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CertificateError> {
        Ok(Self::new(std::fs::read(path)?))
    }

    pub fn load(&self) -> Result<Arc<KeyMaterial>, CertificateError> {
        if let Some(material) = self.cached.read().expect("certificate cache lock").as_ref() {
            return Ok(Arc::clone(material));
        }

        let mut cached = self.cached.write().expect("certificate cache lock");
        // A concurrent loader may have won the race.
        if let Some(material) = cached.as_ref() {
            return Ok(Arc::clone(material));
        }
        let pem = self.pem.read().expect("certificate source lock");
        let material = Arc::new(KeyMaterial::from_pem(&pem)?);
        *cached = Some(Arc::clone(&material));
        Ok(material)
    }

    /// Replace the PEM source and drop the cached parse.
    pub fn reload(&self, pem_bytes: impl Into<Vec<u8>>) {
        *self.pem.write().expect("certificate source lock") = pem_bytes.into();
        self.invalidate();
    }

    pub fn invalidate(&self) {
        self.cached.write().expect("certificate cache lock").take();
    }
}

/// The three values an enveloped `ds:Signature` carries.
#[derive(Debug, Clone)]
pub struct SignatureBlock {
    digest_value: String,
    signature_value: String,
    certificate_b64: String,
}

impl SignatureBlock {
    pub fn digest_value(&self) -> &str {
        &self.digest_value
    }

    pub fn signature_value(&self) -> &str {
        &self.signature_value
    }

    pub fn certificate_b64(&self) -> &str {
        &self.certificate_b64
    }

    /// Serialized `ds:Signature` fragment, self-contained (declares the
    /// dsig namespace) so it can be parsed standalone.
    pub fn to_xml(&self) -> String {
        format!(
            "<ds:Signature xmlns:ds=\"{DS_NS}\" Id=\"{SIGNATURE_ID}\">{}\
             <ds:SignatureValue>{}</ds:SignatureValue>\
             <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>\
             </ds:Signature>",
            signed_info_xml(&self.digest_value, false),
            self.signature_value,
            self.certificate_b64,
        )
    }
}

/// The `ds:SignedInfo` block. `standalone` adds the dsig namespace
/// declaration so the fragment parses (and canonicalizes) on its own; the
/// canonical form is identical either way.
pub(crate) fn signed_info_xml(digest_b64: &str, standalone: bool) -> String {
    let ns_decl = if standalone {
        format!(" xmlns:ds=\"{DS_NS}\"")
    } else {
        String::new()
    };
    format!(
        "<ds:SignedInfo{ns_decl}>\
         <ds:CanonicalizationMethod Algorithm=\"{C14N_ALGORITHM}\"></ds:CanonicalizationMethod>\
         <ds:SignatureMethod Algorithm=\"{RSA_SHA1_ALGORITHM}\"></ds:SignatureMethod>\
         <ds:Reference URI=\"\">\
         <ds:Transforms>\
         <ds:Transform Algorithm=\"{ENVELOPED_SIGNATURE_ALGORITHM}\"></ds:Transform>\
         <ds:Transform Algorithm=\"{C14N_ALGORITHM}\"></ds:Transform>\
         </ds:Transforms>\
         <ds:DigestMethod Algorithm=\"{SHA1_ALGORITHM}\"></ds:DigestMethod>\
         <ds:DigestValue>{digest_b64}</ds:DigestValue>\
         </ds:Reference>\
         </ds:SignedInfo>"
    )
}

/// Base64 SHA-1 digest, the `ds:DigestValue` encoding.
pub fn digest_base64(bytes: &[u8]) -> String {
    Base64::encode_string(&Sha1::digest(bytes))
}

/// Hex SHA-256 fingerprint of a signed document, kept on submission
/// records for later integrity checks.
pub fn document_hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Canonical form of a document with extension and signature nodes
/// stripped, as used for digest computation.
pub fn canonical_document(xml: &str) -> Result<String, SigningError> {
    let doc = parse_xml(xml)?;
    canonical_form(&doc)
}

/// Signs documents with a fixed key material handle. Pure: the same
/// document and key always yield the same signature block.
pub struct DocumentSigner {
    key_material: Arc<KeyMaterial>,
}

impl DocumentSigner {
    pub fn new(key_material: Arc<KeyMaterial>) -> Self {
        Self { key_material }
    }

    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, SigningError> {
        Ok(Self::new(Arc::new(KeyMaterial::from_pem(pem_bytes)?)))
    }

    /// Sign an unsigned UBL document and return the final form: the input
    /// tree with an `ext:UBLExtensions` extension holding the enveloped
    /// signature, serialized with the XML declaration.
    pub fn sign_xml(&self, unsigned_xml: &str) -> Result<String, SigningError> {
        let mut doc = parse_xml(unsigned_xml)?;
        let block = self.signature_block_for(&doc)?;
        embed_signature(&mut doc, &block)?;
        Ok(doc.to_string())
    }

    /// Compute the signature block without assembling the final document.
    pub fn signature_block(&self, unsigned_xml: &str) -> Result<SignatureBlock, SigningError> {
        let doc = parse_xml(unsigned_xml)?;
        self.signature_block_for(&doc)
    }

    fn signature_block_for(&self, doc: &Document) -> Result<SignatureBlock, SigningError> {
        let canonical = canonical_form(doc)?;
        let digest_value = digest_base64(canonical.as_bytes());
        debug!(canonical_len = canonical.len(), "document canonicalized");

        let signed_info = signed_info_xml(&digest_value, true);
        let signed_info_doc = parse_xml(&signed_info)?;
        let signed_info_canonical = canonicalize(&signed_info_doc)?;

        let signing_key = SigningKey::<Sha1>::new(self.key_material.private_key.clone());
        let signature = signing_key
            .try_sign(signed_info_canonical.as_bytes())
            .map_err(|e| SigningError::Signing(format!("RSA signing error: {e}")))?;

        Ok(SignatureBlock {
            digest_value,
            signature_value: Base64::encode_string(&signature.to_bytes()),
            certificate_b64: self.key_material.certificate_base64()?,
        })
    }
}

/// Check an enveloped signature against the document it ships in: the
/// digest must match the canonical form and the `SignedInfo` signature
/// must verify under the embedded certificate's public key.
pub fn verify_signed_xml(signed_xml: &str) -> Result<(), SigningError> {
    let doc = parse_xml(signed_xml)?;
    let ctx = dsig_context(&doc)?;

    let digest_value = xpath_text(&ctx, "//ds:Signature/ds:SignedInfo/ds:Reference/ds:DigestValue")?;
    let signature_value = xpath_text(&ctx, "//ds:Signature/ds:SignatureValue")?;
    let certificate_b64 = xpath_text(
        &ctx,
        "//ds:Signature/ds:KeyInfo/ds:X509Data/ds:X509Certificate",
    )?;

    let canonical = canonical_form(&doc)?;
    let expected_digest = digest_base64(canonical.as_bytes());
    if expected_digest != digest_value {
        return Err(SigningError::Verification(format!(
            "digest mismatch: document canonicalizes to {expected_digest}, signature carries {digest_value}"
        )));
    }

    let cert_der = Base64::decode_vec(&certificate_b64)
        .map_err(|e| SigningError::Verification(format!("certificate decode error: {e}")))?;
    let certificate = Certificate::from_der(&cert_der)
        .map_err(|e| SigningError::Verification(format!("certificate parse error: {e:?}")))?;
    let public_key = rsa_public_key(&certificate)?;

    let signed_info = signed_info_xml(&digest_value, true);
    let signed_info_doc = parse_xml(&signed_info)?;
    let signed_info_canonical = canonicalize(&signed_info_doc)?;

    let signature_bytes = Base64::decode_vec(&signature_value)
        .map_err(|e| SigningError::Verification(format!("signature decode error: {e}")))?;
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| SigningError::Verification(format!("signature format error: {e}")))?;

    VerifyingKey::<Sha1>::new(public_key)
        .verify(signed_info_canonical.as_bytes(), &signature)
        .map_err(|e| SigningError::Verification(format!("RSA verification error: {e}")))
}

fn parse_xml(xml: &str) -> Result<Document, SigningError> {
    Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::Parse(format!("{e:?}")))
}

fn canonical_form(doc: &Document) -> Result<String, SigningError> {
    let copy = doc
        .dup()
        .map_err(|e| SigningError::Canonicalization(format!("failed to duplicate tree: {e:?}")))?;
    strip_signature_nodes(&copy)?;
    canonicalize(&copy)
}

/// The enveloped-signature transform: remove extension containers and any
/// dsig `Signature` before hashing. The `cac:Signature` signatory block is
/// business content and stays.
fn strip_signature_nodes(doc: &Document) -> Result<(), SigningError> {
    let ctx = xpath::Context::new(doc)
        .map_err(|e| SigningError::Canonicalization(format!("XPath context error: {e:?}")))?;

    let expressions = [
        format!("//*[local-name()='UBLExtensions' and namespace-uri()='{EXT_NS}']"),
        format!("//*[local-name()='Signature' and namespace-uri()='{DS_NS}']"),
    ];
    for expression in &expressions {
        let nodes = ctx
            .evaluate(expression)
            .map_err(|e| SigningError::Canonicalization(format!("XPath error: {e:?}")))?
            .get_nodes_as_vec();
        for mut node in nodes {
            node.unlink();
        }
    }
    Ok(())
}

fn canonicalize(doc: &Document) -> Result<String, SigningError> {
    let options = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_0,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    doc.canonicalize(options, None)
        .map_err(|e| SigningError::Canonicalization(format!("{e:?}")))
}

fn embed_signature(doc: &mut Document, block: &SignatureBlock) -> Result<(), SigningError> {
    let fragment = format!(
        "<ext:UBLExtensions xmlns:ext=\"{EXT_NS}\">\
         <ext:UBLExtension><ext:ExtensionContent>{}</ext:ExtensionContent></ext:UBLExtension>\
         </ext:UBLExtensions>",
        block.to_xml()
    );
    let mut extensions = import_fragment(doc, &fragment)?;

    let mut root = doc
        .get_root_element()
        .ok_or_else(|| SigningError::Parse("missing document root".into()))?;
    if let Some(mut first_child) = first_element_child(&root) {
        first_child
            .add_prev_sibling(&mut extensions)
            .map_err(|e| SigningError::Signing(e.to_string()))?;
    } else {
        root.add_child(&mut extensions)
            .map_err(|e| SigningError::Signing(e.to_string()))?;
    }
    Ok(())
}

fn import_fragment(doc: &mut Document, xml: &str) -> Result<Node, SigningError> {
    let fragment = parse_xml(xml)?;
    let mut node = fragment
        .get_root_element()
        .ok_or_else(|| SigningError::Parse("missing fragment root".into()))?;
    node.unlink();
    doc.import_node(&mut node)
        .map_err(|_| SigningError::Signing("failed to import signature fragment".into()))
}

fn first_element_child(root: &Node) -> Option<Node> {
    let mut current = root.get_first_child();
    while let Some(node) = current {
        if node.is_element_node() {
            return Some(node);
        }
        current = node.get_next_sibling();
    }
    None
}

fn dsig_context(doc: &Document) -> Result<xpath::Context, SigningError> {
    let ctx = xpath::Context::new(doc)
        .map_err(|e| SigningError::Verification(format!("XPath context error: {e:?}")))?;
    ctx.register_namespace("ds", DS_NS)
        .map_err(|e| SigningError::Verification(format!("XPath context error: {e:?}")))?;
    Ok(ctx)
}

fn xpath_text(ctx: &xpath::Context, expression: &str) -> Result<String, SigningError> {
    let nodes = ctx
        .evaluate(expression)
        .map_err(|e| SigningError::Verification(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    let node = nodes.first().ok_or_else(|| {
        SigningError::Verification(format!("missing signature element: {expression}"))
    })?;
    let value = node.get_content().trim().to_string();
    if value.is_empty() {
        return Err(SigningError::Verification(format!(
            "empty signature element: {expression}"
        )));
    }
    Ok(value)
}
