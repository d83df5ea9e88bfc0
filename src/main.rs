use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use nestpay::application::orchestrator::{PaymentOrchestrator, ProcessOptions, ReturnChannel};
use nestpay::domain::config::MerchantConfig;
use nestpay::domain::hash::{self, HashAlgorithm, HashInput};
use nestpay::domain::ports::PaymentStoreBox;
use nestpay::infrastructure::in_memory::InMemoryPaymentStore;
use nestpay::interfaces::json::field_reader::FieldReader;
use nestpay::interfaces::json::field_writer::FieldWriter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Merchant config JSON file. Falls back to NESTPAY_* environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the gateway hash of ordered values.
    Hash {
        #[arg(long)]
        store_key: String,
        #[arg(long, default_value = "ver2")]
        algorithm: HashAlgorithm,
        values: Vec<String>,
    },
    /// Build the signed 3D gate form for a payment JSON document.
    Sign {
        payment: PathBuf,
        #[arg(long, default_value = "ver2")]
        algorithm: HashAlgorithm,
    },
    /// Verify and process a gateway callback JSON document.
    Verify {
        callback: PathBuf,
        /// The callback arrived on the merchant's fail URL.
        #[arg(long)]
        fail_url: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<MerchantConfig> {
    match path {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            MerchantConfig::from_json_reader(file).into_diagnostic()
        }
        None => MerchantConfig::from_env().into_diagnostic(),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(cli: &Cli) -> Result<PaymentStoreBox> {
    use nestpay::infrastructure::rocksdb::RocksDBPaymentStore;

    match &cli.db_path {
        Some(db_path) => Ok(Box::new(RocksDBPaymentStore::open(db_path).into_diagnostic()?)),
        None => Ok(Box::new(InMemoryPaymentStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(_cli: &Cli) -> Result<PaymentStoreBox> {
    Ok(Box::new(InMemoryPaymentStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut writer = FieldWriter::new(stdout.lock());

    match &cli.command {
        Command::Hash {
            store_key,
            algorithm,
            values,
        } => {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            let hash = hash::compute_hash(store_key, HashInput::Ordered(&values), *algorithm);
            println!("{hash}");
        }
        Command::Sign { payment, algorithm } => {
            let config = load_config(cli.config.as_ref())?;
            let fields = FieldReader::new(File::open(payment).into_diagnostic()?)
                .fields()
                .into_diagnostic()?;

            let mut orchestrator =
                PaymentOrchestrator::from_merchant_config(config).with_store(open_store(&cli)?);
            let form = orchestrator
                .build_request_form(Some(fields.into()), *algorithm)
                .await
                .into_diagnostic()?;
            writer.write(&form).into_diagnostic()?;
        }
        Command::Verify { callback, fail_url } => {
            let config = load_config(cli.config.as_ref())?;
            let response = FieldReader::new(File::open(callback).into_diagnostic()?)
                .fields()
                .into_diagnostic()?;
            let channel = if *fail_url {
                ReturnChannel::FailUrl
            } else {
                ReturnChannel::OkUrl
            };

            let mut orchestrator =
                PaymentOrchestrator::from_merchant_config(config).with_store(open_store(&cli)?);
            let payment = orchestrator
                .process_gateway_callback(&response, channel, ProcessOptions::default())
                .await
                .into_diagnostic()?;
            writer.write(&payment).into_diagnostic()?;
        }
    }

    Ok(())
}
