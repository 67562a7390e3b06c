use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use factura_core::client::{Submission, SunatClient};
use factura_core::config::{Config, Environment, SolCredentials};
use factura_core::document::xml::ToXml;
use factura_core::document::{CreditNote, DebitNote, DocumentId, Invoice, UblDocument};
use factura_core::package::{encode_base64, package};
use factura_core::sign::DocumentSigner;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "factura")]
#[command(about = "SUNAT e-invoicing: sign UBL documents and drive billService")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SolArgs {
    /// Issuer RUC.
    #[arg(long)]
    ruc: String,
    /// SOL username (without the RUC prefix).
    #[arg(long)]
    username: String,
    /// SOL password.
    #[arg(long)]
    password: String,
    /// Target environment: beta or production.
    #[arg(long, default_value = "beta")]
    env: Environment,
}

impl SolArgs {
    fn config(&self) -> Config {
        Config::new(
            self.env,
            SolCredentials::new(&self.ruc, &self.username, &self.password),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a document JSON file and print the signed XML.
    Sign {
        #[arg(long)]
        document: PathBuf,
        /// PEM bundle with the certificate and RSA private key.
        #[arg(long)]
        cert: PathBuf,
    },
    /// Sign and package a document; print the base64 zip for the SOAP body.
    Package {
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        cert: PathBuf,
    },
    /// Sign, package and submit a document through sendBill.
    Send {
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        cert: PathBuf,
        #[command(flatten)]
        sol: SolArgs,
    },
    /// Consult the status of a document by its identifier.
    Status {
        /// Document identifier: {RUC}-{tipo}-{serie}-{numero}.
        #[arg(long)]
        id: String,
        #[command(flatten)]
        sol: SolArgs,
    },
    /// Consult the status of a submission ticket.
    Ticket {
        #[arg(long)]
        ticket: String,
        #[command(flatten)]
        sol: SolArgs,
    },
}

/// Document files carry an explicit kind tag so notes and invoices share
/// one input format.
#[derive(serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum DocumentFile {
    Invoice(Invoice),
    CreditNote(CreditNote),
    DebitNote(DebitNote),
}

fn load_document(path: &PathBuf) -> Result<Box<dyn UblDocument>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading document file {}", path.display()))?;
    let file: DocumentFile =
        serde_json::from_str(&raw).with_context(|| "parsing document JSON")?;
    Ok(match file {
        DocumentFile::Invoice(invoice) => Box::new(invoice),
        DocumentFile::CreditNote(note) => Box::new(note),
        DocumentFile::DebitNote(note) => Box::new(note),
    })
}

fn sign_from_files(document: &PathBuf, cert: &PathBuf) -> Result<(Box<dyn UblDocument>, String)> {
    let doc = load_document(document)?;
    doc.validate()?;
    let pem = std::fs::read(cert)
        .with_context(|| format!("reading certificate bundle {}", cert.display()))?;
    let signer = DocumentSigner::from_pem(&pem)?;
    let signed = signer.sign_xml(&doc.to_xml()?)?;
    Ok((doc, signed))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sign { document, cert } => {
            let (_, signed) = sign_from_files(&document, &cert)?;
            println!("{signed}");
        }
        Commands::Package { document, cert } => {
            let (doc, signed) = sign_from_files(&document, &cert)?;
            let archive = package(signed.as_bytes(), doc.document_id())?;
            println!("{}", encode_base64(&archive));
        }
        Commands::Send {
            document,
            cert,
            sol,
        } => {
            let doc = load_document(&document)?;
            let pem = std::fs::read(&cert)
                .with_context(|| format!("reading certificate bundle {}", cert.display()))?;
            let client = SunatClient::new(sol.config(), pem)?;
            match client.submit(doc.as_ref()).await? {
                Submission::Ticket(ticket) => println!("ticket: {ticket}"),
                Submission::Receipt { archive } => {
                    println!("receipt: {} bytes", archive.len())
                }
            }
        }
        Commands::Status { id, sol } => {
            let id = DocumentId::parse(&id)?;
            // Consultations never sign, so no key material is loaded.
            let client = SunatClient::new(sol.config(), Vec::new())?;
            let status = client.consult_status(&id).await?;
            println!("status: {} ({})", status.code, status.state.name());
        }
        Commands::Ticket { ticket, sol } => {
            let client = SunatClient::new(sol.config(), Vec::new())?;
            let status = client.consult_ticket(&ticket).await?;
            println!("status: {} ({})", status.code, status.state.name());
        }
    }

    Ok(())
}
