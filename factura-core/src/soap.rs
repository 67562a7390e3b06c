//! SOAP envelope construction, transport, and response parsing for the
//! SUNAT billService family.
//!
//! Envelopes are built through typed serializers rather than string
//! templates, so credential and payload values are always escaped.
use crate::config::SolCredentials;
use libxml::{parser::Parser, tree::Document, xpath};
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use reqwest::header::CONTENT_TYPE;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Serialize as SerdeSerialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub(crate) const SOAPENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub(crate) const SERVICE_NS: &str = "http://service.sunat.gob.pe";
pub(crate) const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// The namespace prefixes SUNAT responses have been observed to use for
/// the envelope, tried in order.
const BODY_PREFIXES: [&str; 3] = ["soap", "soapenv", "env"];

#[derive(Debug, Error)]
pub enum SoapError {
    /// Network-level failure; transient, the caller may retry.
    #[error("network error reaching the service: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },
    /// Authority-side rejection. Terminal for this attempt; not an
    /// engineering retry.
    #[error("service fault {code}: {message}")]
    Fault { code: String, message: String },
    /// The response shape is unrecognized: wire-contract drift.
    #[error("unrecognized SOAP response: {0}")]
    Protocol(String),
    #[error("failed to build SOAP envelope: {source}")]
    Envelope {
        #[from]
        source: SeError,
    },
    #[error("service returned status {status}: {body}")]
    FailureStatus { status: u16, body: String },
}

/// A request body that can ride in a SOAP envelope: its element tag and
/// the `SOAPAction` URN of the operation.
pub trait SoapOperation: SerdeSerialize {
    const TAG: &'static str;
    const ACTION: &'static str;
}

/// `<ser:sendBill>` payload: archive name and base64 content.
#[derive(Debug, Clone, SerdeSerialize)]
pub struct SendBill {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "contentFile")]
    pub content_file: String,
}

impl SoapOperation for SendBill {
    const TAG: &'static str = "ser:sendBill";
    const ACTION: &'static str = "urn:sendBill";
}

/// `<getStatus>` by document identifier.
#[derive(Debug, Clone, SerdeSerialize)]
pub struct StatusQuery {
    #[serde(rename = "rucComprobante")]
    pub ruc: String,
    #[serde(rename = "tipoComprobante")]
    pub document_type: String,
    #[serde(rename = "serieComprobante")]
    pub series: String,
    #[serde(rename = "numeroComprobante")]
    pub number: String,
}

impl SoapOperation for StatusQuery {
    const TAG: &'static str = "getStatus";
    const ACTION: &'static str = "urn:getStatus";
}

/// `<getStatus>` by ticket.
#[derive(Debug, Clone, SerdeSerialize)]
pub struct TicketQuery {
    pub ticket: String,
}

impl SoapOperation for TicketQuery {
    const TAG: &'static str = "getStatus";
    const ACTION: &'static str = "urn:getStatus";
}

struct Envelope<'a, T: SoapOperation> {
    username: String,
    password: &'a str,
    body: &'a T,
}

impl<'a, T: SoapOperation> Serialize for Envelope<'a, T> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct HeaderXml<'a> {
            username: &'a str,
            password: &'a str,
        }
        impl<'a> Serialize for HeaderXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                struct SecurityXml<'a> {
                    username: &'a str,
                    password: &'a str,
                }
                impl<'a> Serialize for SecurityXml<'a> {
                    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
                    where
                        S: Serializer,
                    {
                        struct TokenXml<'a> {
                            username: &'a str,
                            password: &'a str,
                        }
                        impl<'a> Serialize for TokenXml<'a> {
                            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
                            where
                                S: Serializer,
                            {
                                let mut st = s.serialize_struct("wsse:UsernameToken", 0)?;
                                st.serialize_field("wsse:Username", self.username)?;
                                st.serialize_field("wsse:Password", self.password)?;
                                st.end()
                            }
                        }
                        let mut st = s.serialize_struct("wsse:Security", 0)?;
                        st.serialize_field(
                            "wsse:UsernameToken",
                            &TokenXml {
                                username: self.username,
                                password: self.password,
                            },
                        )?;
                        st.end()
                    }
                }
                let mut st = s.serialize_struct("soapenv:Header", 0)?;
                st.serialize_field(
                    "wsse:Security",
                    &SecurityXml {
                        username: self.username,
                        password: self.password,
                    },
                )?;
                st.end()
            }
        }

        struct BodyXml<'a, T: SoapOperation>(&'a T);
        impl<'a, T: SoapOperation> Serialize for BodyXml<'a, T> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("soapenv:Body", 1)?;
                st.serialize_field(T::TAG, self.0)?;
                st.end()
            }
        }

        let mut st = s.serialize_struct("soapenv:Envelope", 0)?;
        st.serialize_field("@xmlns:soapenv", SOAPENV_NS)?;
        st.serialize_field("@xmlns:ser", SERVICE_NS)?;
        st.serialize_field("@xmlns:wsse", WSSE_NS)?;
        st.serialize_field(
            "soapenv:Header",
            &HeaderXml {
                username: &self.username,
                password: self.password,
            },
        )?;
        st.serialize_field("soapenv:Body", &BodyXml(self.body))?;
        st.end()
    }
}

fn render_envelope<T: SoapOperation>(
    credentials: &SolCredentials,
    body: &T,
) -> Result<String, SoapError> {
    let envelope = Envelope {
        username: credentials.sol_username(),
        password: credentials.password(),
        body,
    };
    let mut buffer = String::with_capacity(1024);
    envelope.serialize(QuickXmlSerializer::new(&mut buffer))?;
    Ok(buffer)
}

/// SOAP transport over the SUNAT billService endpoints.
#[derive(Debug)]
pub struct SoapClient {
    http: reqwest::Client,
    credentials: SolCredentials,
}

impl SoapClient {
    pub fn new(
        credentials: SolCredentials,
        timeout: Option<Duration>,
    ) -> Result<Self, SoapError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            credentials,
        })
    }

    /// Perform one SOAP exchange and return the inner content of the
    /// response `Body`. A single attempt: retry policy belongs to the
    /// caller, and only for [`SoapError::Transport`].
    pub async fn call<T: SoapOperation>(
        &self,
        endpoint: &str,
        request: &T,
    ) -> Result<String, SoapError> {
        let envelope = render_envelope(&self.credentials, request)?;
        debug!(endpoint, action = T::ACTION, "sending SOAP request");

        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "text/xml;charset=UTF-8")
            .header("SOAPAction", T::ACTION)
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Some((code, message)) = parse_fault(&body) {
                warn!(%code, %message, "service returned a fault");
                return Err(SoapError::Fault { code, message });
            }
            return Err(SoapError::FailureStatus {
                status: status.as_u16(),
                body,
            });
        }

        match extract_body(&body) {
            Ok(inner) => Ok(inner.to_string()),
            Err(err) => {
                error!(endpoint, "response body not recognized; wire contract may have changed");
                Err(err)
            }
        }
    }
}

/// Slice out the inner content of the envelope `Body`, trying the known
/// namespace-prefix spellings in order.
pub(crate) fn extract_body(envelope: &str) -> Result<&str, SoapError> {
    for prefix in BODY_PREFIXES {
        let open_prefix = format!("<{prefix}:Body");
        let close_tag = format!("</{prefix}:Body>");
        let Some(open_at) = envelope.find(&open_prefix) else {
            continue;
        };
        let after_open = &envelope[open_at..];
        let Some(open_end) = after_open.find('>') else {
            continue;
        };
        let content_start = open_at + open_end + 1;
        let Some(content_len) = envelope[content_start..].find(&close_tag) else {
            continue;
        };
        return Ok(&envelope[content_start..content_start + content_len]);
    }
    Err(SoapError::Protocol(
        "no Body element found under the soap, soapenv or env prefixes".into(),
    ))
}

/// Parse a SOAP `Fault` out of a response, tolerant of envelope prefixes.
/// Returns `None` when the body holds no recognizable fault.
pub(crate) fn parse_fault(body: &str) -> Option<(String, String)> {
    let doc = ResponseXml::parse(body).ok()?;
    doc.first("//*[local-name()='Fault']")?;
    let code = doc
        .text("//*[local-name()='Fault']/*[local-name()='faultcode']")
        .unwrap_or_default();
    let message = doc
        .text("//*[local-name()='Fault']/*[local-name()='faultstring']")
        .unwrap_or_default();
    Some((code, message))
}

/// Light XPath view over a response fragment. Matching is by local name:
/// the authority is inconsistent about response-element prefixes.
pub(crate) struct ResponseXml {
    doc: Document,
}

impl ResponseXml {
    pub(crate) fn parse(xml: &str) -> Result<Self, SoapError> {
        Parser::default()
            .parse_string(xml)
            .map(|doc| Self { doc })
            .map_err(|e| SoapError::Protocol(format!("unparseable response body: {e:?}")))
    }

    pub(crate) fn element_text(&self, local_name: &str) -> Option<String> {
        self.text(&format!("//*[local-name()='{local_name}']"))
    }

    fn first(&self, expression: &str) -> Option<()> {
        let ctx = xpath::Context::new(&self.doc).ok()?;
        let nodes = ctx.evaluate(expression).ok()?.get_nodes_as_vec();
        nodes.first().map(|_| ())
    }

    fn text(&self, expression: &str) -> Option<String> {
        let ctx = xpath::Context::new(&self.doc).ok()?;
        let nodes = ctx.evaluate(expression).ok()?.get_nodes_as_vec();
        let node = nodes.first()?;
        let value = node.get_content().trim().to_string();
        (!value.is_empty()).then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> SolCredentials {
        SolCredentials::new("20123456789", "MODDATOS", "moddatos")
    }

    #[test]
    fn envelope_carries_security_header_and_payload() {
        let request = SendBill {
            file_name: "20123456789-01-F001-1.zip".into(),
            content_file: "UEsDBA==".into(),
        };
        let envelope = render_envelope(&test_credentials(), &request).expect("render");

        assert!(envelope.starts_with("<soapenv:Envelope"));
        assert!(envelope.contains("xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\""));
        assert!(envelope.contains("<wsse:Username>20123456789MODDATOS</wsse:Username>"));
        assert!(envelope.contains("<wsse:Password>moddatos</wsse:Password>"));
        assert!(envelope
            .contains("<ser:sendBill><fileName>20123456789-01-F001-1.zip</fileName>"));
        assert!(envelope.contains("<contentFile>UEsDBA==</contentFile>"));
    }

    #[test]
    fn envelope_escapes_markup_in_values() {
        let credentials = SolCredentials::new("20123456789", "USER", "p&ss<word>");
        let request = TicketQuery {
            ticket: "abc&<def>".into(),
        };
        let envelope = render_envelope(&credentials, &request).expect("render");

        assert!(envelope.contains("<wsse:Password>p&amp;ss&lt;word&gt;</wsse:Password>"));
        assert!(envelope.contains("<ticket>abc&amp;&lt;def&gt;</ticket>"));
        assert!(!envelope.contains("p&ss<word>"));
    }

    #[test]
    fn body_extraction_accepts_known_prefixes() {
        for prefix in ["soap", "soapenv", "env"] {
            let envelope = format!(
                "<{prefix}:Envelope xmlns:{prefix}=\"http://schemas.xmlsoap.org/soap/envelope/\">\
                 <{prefix}:Body><r>ok</r></{prefix}:Body></{prefix}:Envelope>"
            );
            assert_eq!(extract_body(&envelope).expect("body"), "<r>ok</r>");
        }
    }

    #[test]
    fn body_extraction_fails_on_unknown_shape() {
        let err = extract_body("<x:Envelope><x:Body>hm</x:Body></x:Envelope>")
            .expect_err("unknown prefix");
        assert!(matches!(err, SoapError::Protocol(_)));
    }

    #[test]
    fn fault_parsing_extracts_code_and_message() {
        let body = "<soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\">\
                    <soapenv:Body><soapenv:Fault><faultcode>Client</faultcode>\
                    <faultstring>bad cert</faultstring></soapenv:Fault></soapenv:Body>\
                    </soapenv:Envelope>";
        let (code, message) = parse_fault(body).expect("fault");
        assert_eq!(code, "Client");
        assert_eq!(message, "bad cert");
    }

    #[test]
    fn fault_parsing_ignores_non_fault_bodies() {
        assert!(parse_fault("<r>ok</r>").is_none());
        assert!(parse_fault("not xml at all").is_none());
    }
}
