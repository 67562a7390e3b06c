use chrono::{NaiveDate, NaiveTime};
use factura_core::config::{Config, Environment, SolCredentials};
use factura_core::document::{
    BillingReference, CreditNote, DebitNote, DiscrepancyResponse, DocumentId, DocumentKind,
    Invoice, Party, PostalAddress, Ruc, SaleLine, SaleTotals,
};
use iso_currency::Currency;
use std::path::{Path, PathBuf};

#[allow(dead_code)]
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/certs")
        .join(name)
}

#[allow(dead_code)]
pub fn keypair_pem() -> Vec<u8> {
    std::fs::read(fixture_path("test_keypair.pem")).expect("read test keypair")
}

#[allow(dead_code)]
pub fn test_config() -> Config {
    Config::new(
        Environment::Beta,
        SolCredentials::new("20123456789", "MODDATOS", "moddatos"),
    )
}

#[allow(dead_code)]
pub fn dummy_supplier() -> Party {
    Party::new(Ruc::parse("20123456789").expect("supplier ruc"), "Acme SAC").with_address(
        PostalAddress {
            street: "Av. Arequipa 1234".into(),
            district: "Lince".into(),
            province: "Lima".into(),
            department: "Lima".into(),
            ubigeo: "150116".into(),
        },
    )
}

#[allow(dead_code)]
pub fn dummy_customer() -> Party {
    Party::new(
        Ruc::parse("20600055519").expect("customer ruc"),
        "Cliente EIRL",
    )
}

#[allow(dead_code)]
pub fn dummy_line() -> SaleLine {
    SaleLine {
        id: 1,
        description: "Servicio de consultoría".into(),
        quantity: 1.0,
        unit_code: "NIU".into(),
        unit_price: 100.0,
        igv_amount: 18.0,
        igv_rate: 18.0,
        affectation_code: Some("10".into()),
        line_total: 100.0,
    }
}

#[allow(dead_code)]
pub fn dummy_invoice() -> Invoice {
    Invoice {
        id: DocumentId::new(
            Ruc::parse("20123456789").expect("ruc"),
            DocumentKind::Invoice,
            "F001",
            1,
        )
        .expect("document id"),
        issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("issue date"),
        issue_time: NaiveTime::from_hms_opt(10, 30, 0).expect("issue time"),
        currency: Currency::PEN,
        supplier: dummy_supplier(),
        customer: dummy_customer(),
        totals: SaleTotals {
            taxable: 100.0,
            igv: 18.0,
            total: 118.0,
        },
        lines: vec![dummy_line()],
    }
}

#[allow(dead_code)]
pub fn dummy_credit_note() -> CreditNote {
    CreditNote {
        id: DocumentId::new(
            Ruc::parse("20123456789").expect("ruc"),
            DocumentKind::CreditNote,
            "FC01",
            1,
        )
        .expect("document id"),
        issue_date: NaiveDate::from_ymd_opt(2024, 1, 20).expect("issue date"),
        issue_time: NaiveTime::from_hms_opt(9, 0, 0).expect("issue time"),
        note: Some("Anulación de la operación".into()),
        currency: Currency::PEN,
        discrepancy: DiscrepancyResponse {
            reference_id: "F001-1".into(),
            response_code: "01".into(),
            description: "Anulación de la operación".into(),
        },
        billing_reference: BillingReference {
            id: "F001-1".into(),
            document_type_code: Some("01".into()),
        },
        supplier: dummy_supplier(),
        customer: dummy_customer(),
        totals: SaleTotals {
            taxable: 100.0,
            igv: 18.0,
            total: 118.0,
        },
        lines: vec![dummy_line()],
    }
}

#[allow(dead_code)]
pub fn dummy_debit_note() -> DebitNote {
    DebitNote {
        id: DocumentId::new(
            Ruc::parse("20123456789").expect("ruc"),
            DocumentKind::DebitNote,
            "FD01",
            1,
        )
        .expect("document id"),
        issue_date: NaiveDate::from_ymd_opt(2024, 1, 22).expect("issue date"),
        issue_time: NaiveTime::from_hms_opt(16, 45, 0).expect("issue time"),
        note: Some("Intereses por mora".into()),
        currency: Currency::PEN,
        discrepancy: DiscrepancyResponse {
            reference_id: "F001-1".into(),
            response_code: "01".into(),
            description: "Intereses por mora".into(),
        },
        billing_reference: BillingReference {
            id: "F001-1".into(),
            document_type_code: Some("01".into()),
        },
        supplier: dummy_supplier(),
        customer: dummy_customer(),
        totals: SaleTotals {
            taxable: 50.0,
            igv: 9.0,
            total: 59.0,
        },
        lines: vec![SaleLine {
            id: 1,
            description: "Interés moratorio".into(),
            quantity: 1.0,
            unit_code: "NIU".into(),
            unit_price: 50.0,
            igv_amount: 9.0,
            igv_rate: 18.0,
            affectation_code: Some("10".into()),
            line_total: 50.0,
        }],
    }
}
