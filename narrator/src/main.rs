use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use narrator::{Narrator, OutputKind, Settings, init_logging, run_controls};
use playback::{AudioOutput, ClockOutput};
use tokio::io::{AsyncReadExt, BufReader};
use tracing::info;
use tts::{PendingEngine, PiperEngine};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the segments the text is split into, one per line
    Segment(TextInput),
    /// Synthesize the text and play it as it is generated
    Speak {
        #[command(flatten)]
        input: TextInput,
        /// Read transport commands (stop, play [i], seek i, rate r, status, quit) from stdin
        #[arg(long)]
        interactive: bool,
        /// Also write the generated audio to this WAV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Synthesize the text without playing it and write a WAV file
    Render {
        #[command(flatten)]
        input: TextInput,
        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct TextInput {
    /// Text to narrate; read from stdin when omitted
    text: Option<String>,
    /// Read the text from a file
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,
}

impl TextInput {
    async fn read(&self) -> anyhow::Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        if let Some(path) = &self.file {
            return tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()));
        }
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("reading text from stdin")?;
        Ok(text)
    }
}

fn open_output(kind: OutputKind) -> anyhow::Result<Arc<dyn AudioOutput>> {
    match kind {
        OutputKind::Virtual => Ok(Arc::new(ClockOutput::new())),
        #[cfg(feature = "device")]
        OutputKind::Device => Ok(Arc::new(playback::RodioOutput::new())),
        #[cfg(not(feature = "device"))]
        OutputKind::Device => bail!("built without the `device` feature"),
    }
}

async fn load_narrator(settings: &Settings) -> anyhow::Result<Narrator> {
    let config = settings.narrator_config()?;
    let piper = settings.piper_config();
    let pending = PendingEngine::spawn(move || PiperEngine::new(piper));
    let narrator = Narrator::new(pending, open_output(settings.output)?, config);
    narrator.wait_ready().await.context("loading voice")?;
    Ok(narrator)
}

fn print_status(narrator: &Narrator) {
    let mut events = narrator.subscribe();
    tokio::spawn(async move {
        while let Ok(evt) = events.recv().await {
            eprintln!("{evt}");
        }
    });
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Segment(input) => {
            let config = cli.settings.narrator_config()?;
            let text = input.read().await?;
            for segment in lingproc::segment_text(&text, config.max_chunk_size) {
                println!("{}\t{}", segment.index, segment.text);
            }
        }
        Command::Speak {
            input,
            interactive,
            export,
        } => {
            if interactive && input.text.is_none() && input.file.is_none() {
                bail!("--interactive needs the text as an argument or --file");
            }
            let text = input.read().await?;
            let narrator = load_narrator(&cli.settings).await?;
            print_status(&narrator);
            let total = narrator.speak(&text).await?;
            info!(total, "speaking");

            let quit = if interactive {
                let stdin = BufReader::new(tokio::io::stdin());
                run_controls(&narrator, stdin, tokio::io::stdout()).await?
            } else {
                false
            };
            if !quit {
                narrator.wait().await;
            }
            if let Some(path) = export {
                let merged = narrator.export(&path)?;
                println!(
                    "wrote {} samples at {} Hz to {}",
                    merged.samples.len(),
                    merged.sample_rate,
                    path.display()
                );
            }
        }
        Command::Render { input, output } => {
            let text = input.read().await?;
            let narrator = load_narrator(&cli.settings).await?;
            print_status(&narrator);
            let merged = narrator.render(&text, &output).await?;
            println!(
                "wrote {} samples at {} Hz to {}",
                merged.samples.len(),
                merged.sample_rate,
                output.display()
            );
        }
    }
    Ok(())
}
