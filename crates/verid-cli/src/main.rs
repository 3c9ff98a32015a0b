use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use verid_core::face::DetectorConfig;
use verid_core::{DocumentType, OrtFaceEngine, OrtTextRecognizer, Verifier};
use verid_engine::{spawn_pool, Config};

#[derive(Parser)]
#[command(name = "verid", about = "Document identity verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DocType {
    Pan,
    Aadhaar,
    Generic,
}

impl From<DocType> for DocumentType {
    fn from(value: DocType) -> Self {
        match value {
            DocType::Pan => DocumentType::Pan,
            DocType::Aadhaar => DocumentType::Aadhaar,
            DocType::Generic => DocumentType::Generic,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract identity fields from a document image
    Extract {
        /// Path to the document image
        image: String,
        /// Document scheme to validate against
        #[arg(short, long, value_enum, default_value_t = DocType::Generic)]
        doc_type: DocType,
    },
    /// Match the face in a selfie against the face in a document photo
    Match {
        /// Path to the selfie image
        selfie: String,
        /// Path to the document image
        document: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    // A single worker is enough for one-shot CLI requests.
    let handle = spawn_pool(1, |_| {
        let recognizer = OrtTextRecognizer::load(
            &config.recognition_model_path(),
            &config.dictionary_path(),
        )?;
        let faces = OrtFaceEngine::load(
            &config.detector_model_path(),
            &config.encoder_model_path(),
            DetectorConfig::default(),
        )?;
        Ok(Verifier::new(
            config.verifier_config(),
            Box::new(recognizer),
            Box::new(faces),
        ))
    })
    .context("starting verification pipeline")?;

    match cli.command {
        Commands::Extract { image, doc_type } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {image}"))?;
            let result = handle.extract_fields(bytes, doc_type.into()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Match { selfie, document } => {
            let selfie_bytes = tokio::fs::read(&selfie)
                .await
                .with_context(|| format!("reading {selfie}"))?;
            let document_bytes = tokio::fs::read(&document)
                .await
                .with_context(|| format!("reading {document}"))?;
            let result = handle.match_faces(selfie_bytes, document_bytes).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
