mod common;

use factura_core::client::{ClientError, Submission, SunatClient};
use factura_core::package::{encode_base64, package, read_first_entry};
use factura_core::soap::SoapError;
use factura_core::tracker::SubmissionState;
use httpmock::{Method::POST, MockServer};
use std::sync::{Mutex, MutexGuard, OnceLock};

fn base_url_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct BaseUrlGuard {
    _lock: MutexGuard<'static, ()>,
    previous: Option<String>,
}

impl BaseUrlGuard {
    fn new(url: &str) -> Self {
        let lock = base_url_lock().lock().expect("base url lock");
        let previous = std::env::var("FACTURA_SUNAT_BASE_URL").ok();
        unsafe {
            std::env::set_var("FACTURA_SUNAT_BASE_URL", url);
        }
        Self {
            _lock: lock,
            previous,
        }
    }
}

impl Drop for BaseUrlGuard {
    fn drop(&mut self) {
        match self.previous.as_ref() {
            Some(value) => unsafe {
                std::env::set_var("FACTURA_SUNAT_BASE_URL", value);
            },
            None => unsafe {
                std::env::remove_var("FACTURA_SUNAT_BASE_URL");
            },
        }
    }
}

fn envelope(inner_body: &str) -> String {
    format!(
        "<soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <soapenv:Body>{inner_body}</soapenv:Body></soapenv:Envelope>"
    )
}

fn test_client() -> SunatClient {
    SunatClient::new(common::test_config(), common::keypair_pem()).expect("client")
}

#[test]
fn submit_returns_ticket_and_records_submission() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    let send_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("SOAPAction", "urn:sendBill");
        then.status(200)
            .header("content-type", "text/xml")
            .body(envelope(
                "<br:sendBillResponse xmlns:br=\"http://service.sunat.gob.pe\">\
                 <ticket>1702345678901</ticket></br:sendBillResponse>",
            ));
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let invoice = common::dummy_invoice();

        let submission = client.submit_invoice(&invoice).await.expect("submit");
        match submission {
            Submission::Ticket(ticket) => assert_eq!(ticket, "1702345678901"),
            other => panic!("expected ticket, got {other:?}"),
        }

        let record = client.store().get(&invoice.id).expect("record");
        assert_eq!(record.ticket(), Some("1702345678901"));
        assert!(matches!(record.state, SubmissionState::Submitted { .. }));
        assert!(record.signed_xml.contains("<ds:SignatureValue>"));
        assert_eq!(record.document_hash.len(), 64);
    });

    send_mock.assert();
}

#[test]
fn submit_decodes_synchronous_receipt() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    // The authority returns the CDR as a base64 zip.
    let cdr_id = factura_core::document::DocumentId::parse("20123456789-01-F001-1").expect("id");
    let cdr_zip = package(b"<ApplicationResponse>ACEPTADO</ApplicationResponse>", &cdr_id)
        .expect("cdr zip");
    let body = envelope(&format!(
        "<br:sendBillResponse xmlns:br=\"http://service.sunat.gob.pe\">\
         <applicationResponse>{}</applicationResponse></br:sendBillResponse>",
        encode_base64(&cdr_zip)
    ));

    let send_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("SOAPAction", "urn:sendBill");
        then.status(200).header("content-type", "text/xml").body(body);
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let invoice = common::dummy_invoice();

        let submission = client.submit(&invoice).await.expect("submit");
        let archive = match submission {
            Submission::Receipt { archive } => archive,
            other => panic!("expected receipt, got {other:?}"),
        };
        let (_, content) = read_first_entry(&archive).expect("cdr entry");
        assert!(String::from_utf8(content).expect("utf-8").contains("ACEPTADO"));

        let record = client.store().get(&invoice.id).expect("record");
        assert_eq!(record.state, SubmissionState::Accepted);
        assert!(record.receipt_zip.is_some());
    });

    send_mock.assert();
}

#[test]
fn refresh_resolves_pending_ticket_to_accepted() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    let send_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("SOAPAction", "urn:sendBill");
        then.status(200)
            .header("content-type", "text/xml")
            .body(envelope(
                "<sendBillResponse><ticket>T-77</ticket></sendBillResponse>",
            ));
    });

    let mut in_process = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("SOAPAction", "urn:getStatus");
        then.status(200)
            .header("content-type", "text/xml")
            .body(envelope(
                "<getStatusResponse><statusResponse>\
                 <statusCode>98</statusCode></statusResponse></getStatusResponse>",
            ));
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let invoice = common::dummy_invoice();
        client.submit(&invoice).await.expect("submit");

        // First consultation: still in process.
        let state = client.refresh(&invoice.id).await.expect("refresh");
        assert_eq!(state, SubmissionState::Pending);
        in_process.assert();
        in_process.delete();

        let cdr_zip = package(b"<ApplicationResponse/>", &invoice.id).expect("cdr zip");
        let accepted = server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .header("SOAPAction", "urn:getStatus");
            then.status(200)
                .header("content-type", "text/xml")
                .body(envelope(&format!(
                    "<getStatusResponse><statusResponse><statusCode>0</statusCode>\
                     <content>{}</content></statusResponse></getStatusResponse>",
                    encode_base64(&cdr_zip)
                )));
        });

        // Second consultation: processed and accepted, CDR attached.
        let state = client.refresh(&invoice.id).await.expect("refresh again");
        assert_eq!(state, SubmissionState::Accepted);
        accepted.assert();

        let record = client.store().get(&invoice.id).expect("record");
        assert_eq!(record.state, SubmissionState::Accepted);
        assert!(record.receipt_zip.is_some());

        // Terminal states are stable: no further wire calls are needed.
        let state = client.refresh(&invoice.id).await.expect("terminal refresh");
        assert_eq!(state, SubmissionState::Accepted);
    });

    send_mock.assert();
}

#[test]
fn consult_status_parses_rejection() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    let status_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("SOAPAction", "urn:getStatus");
        then.status(200)
            .header("content-type", "text/xml")
            .body(envelope(
                "<getStatusResponse><statusResponse>\
                 <statusCode>99</statusCode></statusResponse></getStatusResponse>",
            ));
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let id = factura_core::document::DocumentId::parse("20123456789-01-F001-9").expect("id");
        let status = client.consult_status(&id).await.expect("status");
        assert_eq!(status.code, "99");
        assert_eq!(status.state, SubmissionState::Rejected);
        assert!(status.receipt.is_none());
    });

    status_mock.assert();
}

#[test]
fn faults_surface_code_and_message() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    let fault_mock = server.mock(|when, then| {
        when.method(POST).path("/");
        then.status(500)
            .header("content-type", "text/xml")
            .body(envelope(
                "<soapenv:Fault xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\">\
                 <faultcode>Client</faultcode><faultstring>bad cert</faultstring></soapenv:Fault>",
            ));
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let invoice = common::dummy_invoice();

        let err = client.submit(&invoice).await.expect_err("fault");
        match err {
            ClientError::Soap(SoapError::Fault { code, message }) => {
                assert_eq!(code, "Client");
                assert_eq!(message, "bad cert");
            }
            other => panic!("expected fault, got {other:?}"),
        }

        // Failed submissions leave no record behind.
        assert!(client.store().get(&invoice.id).is_none());
    });

    fault_mock.assert();
}

#[test]
fn unrecognized_body_is_a_protocol_error() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    let odd_mock = server.mock(|when, then| {
        when.method(POST).path("/");
        then.status(200)
            .header("content-type", "text/xml")
            .body("<x:Envelope xmlns:x=\"urn:odd\"><x:Body>hm</x:Body></x:Envelope>");
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let invoice = common::dummy_invoice();

        let err = client.submit(&invoice).await.expect_err("protocol error");
        assert!(matches!(
            err,
            ClientError::Soap(SoapError::Protocol(_))
        ));
    });

    odd_mock.assert();
}

#[test]
fn non_success_without_fault_reports_status() {
    let server = MockServer::start();
    let _guard = BaseUrlGuard::new(&server.base_url());

    let error_mock = server.mock(|when, then| {
        when.method(POST).path("/");
        then.status(503).body("service unavailable");
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = test_client();
        let invoice = common::dummy_invoice();

        let err = client.submit(&invoice).await.expect_err("failure status");
        match err {
            ClientError::Soap(SoapError::FailureStatus { status, body }) => {
                assert_eq!(status, 503);
                assert!(body.contains("service unavailable"));
            }
            other => panic!("expected failure status, got {other:?}"),
        }
    });

    error_mock.assert();
}
