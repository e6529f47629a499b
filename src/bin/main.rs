//! DGOJ regulatory file signer CLI
//!
//! Thin host adapter around the library: prepares signed and encrypted
//! archives, verifies them, and normalizes PEM material pulled out of secret
//! stores.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dgoj_signer::{
    normalize_pem, ConfigManager, CredentialResolver, PipelineOutcome, PrepareWorkflow,
    VerifyWorkflow, ZipPassword,
};
use miette::{Context, IntoDiagnostic, Result};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dgoj-signer")]
#[command(about = "XAdES-BES signing and AES-256 ZIP packaging for DGOJ submissions")]
#[command(long_about = "
DGOJ Signer - prepares XML files for the Spanish gambling regulator

EXAMPLES:
    # Sign, compress and encrypt a batch file
    dgoj-signer prepare --config dgoj.toml --input lote.xml --output lote.zip

    # Verify a prepared archive
    DGOJ_ZIP_PASSWORD=... dgoj-signer verify --input lote.zip

    # Repair a PEM copied out of a secret manager
    dgoj-signer normalize-pem - < mangled.pem

ENVIRONMENT VARIABLES:
    DGOJ_ZIP_PASSWORD   Archive password read by 'verify' (default variable)
    RUST_LOG            Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign, compress and encrypt an XML file
    Prepare {
        /// TOML configuration file
        #[arg(short, long, value_name = "CONFIG_FILE")]
        config: PathBuf,

        /// XML file to prepare
        #[arg(short, long, value_name = "INPUT_FILE")]
        input: PathBuf,

        /// Where to write the encrypted archive
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: PathBuf,

        /// Signing time in RFC 3339 form (defaults to now)
        #[arg(long, value_name = "TIME")]
        signing_time: Option<String>,
    },

    /// Decrypt a prepared archive and verify its signature
    Verify {
        /// Archive produced by 'prepare'
        #[arg(short, long, value_name = "INPUT_FILE")]
        input: PathBuf,

        /// Environment variable holding the archive password
        #[arg(long, value_name = "VAR", default_value = "DGOJ_ZIP_PASSWORD")]
        password_env: String,

        /// Entry to verify (defaults to the only entry)
        #[arg(long, value_name = "NAME")]
        entry: Option<String>,

        /// Verify against this certificate instead of the embedded one
        #[arg(long, value_name = "CERT_FILE")]
        certificate: Option<PathBuf>,
    },

    /// Print the normalized form of a PEM block
    NormalizePem {
        /// PEM file, or '-' for standard input
        #[arg(value_name = "FILE")]
        file: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare {
            config,
            input,
            output,
            signing_time,
        } => handle_prepare(config, input, output, signing_time),
        Commands::Verify {
            input,
            password_env,
            entry,
            certificate,
        } => handle_verify(input, &password_env, entry.as_deref(), certificate),
        Commands::NormalizePem { file } => handle_normalize_pem(&file),
    }
}

fn handle_prepare(
    config: PathBuf,
    input: PathBuf,
    output: PathBuf,
    signing_time: Option<String>,
) -> Result<()> {
    let configuration = ConfigManager::with_path(&config).load()?;
    let signing_time = match signing_time {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid --signing-time '{text}'"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let xml = std::fs::read(&input)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read input file {}", input.display()))?;

    let result = PrepareWorkflow::from_configuration(&configuration)
        .and_then(|workflow| workflow.execute_at(&xml, signing_time));
    let outcome = dgoj_signer::pipelines::prepare::outcome_of(result);

    let attributes = serde_json::to_string_pretty(&outcome.host_attributes()).into_diagnostic()?;
    println!("{attributes}");

    match outcome {
        PipelineOutcome::Success(artifact) => {
            std::fs::write(&output, artifact.bytes())
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write {}", output.display()))?;
            log::info!("Wrote {}", output.display());
            Ok(())
        }
        PipelineOutcome::Failure { .. } => std::process::exit(1),
    }
}

fn handle_verify(
    input: PathBuf,
    password_env: &str,
    entry: Option<&str>,
    certificate: Option<PathBuf>,
) -> Result<()> {
    let password = std::env::var(password_env)
        .into_diagnostic()
        .wrap_err_with(|| format!("Archive password variable {password_env} is not set"))?;
    let password = ZipPassword::new(password)?;

    let archive = std::fs::read(&input)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read archive {}", input.display()))?;

    let trusted = match certificate {
        Some(path) => {
            let bytes = std::fs::read(&path)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to read certificate {}", path.display()))?;
            Some(CredentialResolver::new().load_certificate(&bytes)?)
        }
        None => None,
    };

    let report =
        VerifyWorkflow::new().verify_archive(&archive, entry, &password, trusted.as_ref())?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).into_diagnostic()?
    );

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn handle_normalize_pem(file: &str) -> Result<()> {
    let raw = if file == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .into_diagnostic()
            .wrap_err("Failed to read standard input")?;
        buffer
    } else {
        std::fs::read_to_string(file)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {file}"))?
    };

    let normalized = normalize_pem(&raw)?;
    println!("{}", normalized.as_str());
    Ok(())
}
