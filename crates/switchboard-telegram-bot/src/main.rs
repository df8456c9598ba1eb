use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use switchboard_transport_telegram::config::TelegramSettings;
use switchboard_transport_telegram::runner::run_bot;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns that mask the bot token before it can reach the log stream.
struct TokenRedactor {
    in_url: Regex,
    bare: Regex,
    prefixed: Regex,
}

impl TokenRedactor {
    /// Compile all patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern is invalid.
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            in_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .in_url
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self.bare.replace_all(&output, "[TELEGRAM_TOKEN]").to_string();
        output = self
            .prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<TokenRedactor>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.redactor.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length to satisfy the contract even when the
        // redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    redactor: Arc<TokenRedactor>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            redactor: self.redactor.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let redactor = Arc::new(TokenRedactor::new().map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);

    init_logging(redactor);

    info!("Starting Switchboard relay bot...");

    let settings = init_settings();

    run_bot(settings).await;

    Ok(())
}

fn init_logging(redactor: Arc<TokenRedactor>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        redactor,
    };

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "switchboard_core=info,switchboard_transport_telegram=info,switchboard_telegram_bot=info,hyper=warn,h2=error,reqwest=warn,tokio=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<TelegramSettings> {
    match TelegramSettings::new() {
        Ok(settings) => {
            info!("Configuration loaded successfully.");
            Arc::new(settings)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
