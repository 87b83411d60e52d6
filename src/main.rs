mod generator;

use std::sync::Arc;

use anyhow::Context;
use config::Config as CConfig;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::generator::{Catalog, ConsoleEmitter, LoadGenerator, Pacing};

const CONFIG_FILE: &str = "config.toml";

const DEFAULT_RECIPIENTS: [&str; 6] = [
    "5511999999999@c.us",
    "5511888888888@c.us",
    "5511777777777@c.us",
    "5511666666666@c.us",
    "5511555555555@c.us",
    "554797377750@c.us",
];

const DEFAULT_COMMANDS: [&str; 10] = [
    "!relatorio 2023-10-01",
    "!group GrupoA",
    "!conhecimento Dados importantes",
    "!ajuda",
    "!sentimento Estou muito feliz hoje!",
    "!traduzir Hello, how are you?",
    "!ner A reunião com João será em São Paulo no dia 15.",
    "!resumo Este é um texto longo que precisa ser resumido.",
    "!gerar Escreva um texto sobre inteligência artificial.",
    "!limpeza",
];

fn main() -> anyhow::Result<()> {
    let config = Config::new(CONFIG_FILE).context("Error loading config")?;
    // Logs go to stderr, stdout only carries the dispatch and completion lines.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_writer(std::io::stderr)
        .init();

    let generator = config.generator().context("Invalid load configuration")?;

    // Each worker is a task, so the OS threads of the runtime are the real parallelism knob.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads.max(1))
        .enable_all()
        .build()
        .context("Error building runtime")?;
    tracing::debug!("Runtime started [threads={}]", config.threads.max(1));

    runtime.block_on(generator.run(Arc::new(ConsoleEmitter)))?;
    Ok(())
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
struct Config {
    log_level: String,
    threads: usize,
    workers: usize,
    duration_secs: u64,
    min_pause_ms: u64,
    max_pause_ms: u64,
    seed: Option<u64>,
    recipients: Vec<String>,
    commands: Vec<String>,
}

impl Config {
    // The file is optional, every missing key falls back to `Config::default`.
    fn new(path: &str) -> anyhow::Result<Self> {
        let config = CConfig::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    fn generator(&self) -> anyhow::Result<LoadGenerator> {
        let catalog = Catalog::new(self.recipients.clone(), self.commands.clone())?;
        let pacing = if self.min_pause_ms == self.max_pause_ms {
            Pacing::fixed(Duration::from_millis(self.min_pause_ms))
        } else {
            Pacing::new(
                Duration::from_millis(self.min_pause_ms),
                Duration::from_millis(self.max_pause_ms),
            )?
        };
        let generator = LoadGenerator::new(
            catalog,
            pacing,
            self.workers,
            Duration::from_secs(self.duration_secs),
        );
        Ok(match self.seed {
            Some(seed) => generator.with_seed(seed),
            None => generator,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            threads: num_cpus::get(),
            workers: 50,
            duration_secs: 300,
            min_pause_ms: 100,
            max_pause_ms: 500,
            seed: None,
            recipients: DEFAULT_RECIPIENTS.iter().map(|r| r.to_string()).collect(),
            commands: DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bot-stress-{}.toml", name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_uses_defaults() {
        let sut = Config::new("does-not-exist.toml").unwrap();
        assert_eq!(sut.workers, 50);
        assert_eq!(sut.duration_secs, 300);
        assert_eq!(sut.min_pause_ms, 100);
        assert_eq!(sut.max_pause_ms, 500);
        assert_eq!(sut.seed, None);
        assert_eq!(sut.recipients.len(), 6);
        assert_eq!(sut.commands.len(), 10);
        assert!(sut.threads >= 1);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = write_config(
            "overrides",
            r#"
            workers = 3
            duration_secs = 10
            seed = 7
            recipients = ["alice@c.us"]
            "#,
        );

        let sut = Config::new(path.to_str().unwrap()).unwrap();
        assert_eq!(sut.workers, 3);
        assert_eq!(sut.duration_secs, 10);
        assert_eq!(sut.seed, Some(7));
        assert_eq!(sut.recipients, vec!["alice@c.us".to_string()]);
        // Keys not present in the file keep their defaults.
        assert_eq!(sut.commands.len(), 10);
        assert_eq!(sut.max_pause_ms, 500);
    }

    #[test]
    fn generator_validations() {
        assert!(Config::default().generator().is_ok());

        let config = Config {
            min_pause_ms: 600,
            ..Config::default()
        };
        assert!(config.generator().is_err());

        let config = Config {
            min_pause_ms: 250,
            max_pause_ms: 250,
            ..Config::default()
        };
        assert!(config.generator().is_ok());

        let config = Config {
            commands: vec![],
            ..Config::default()
        };
        assert!(config.generator().is_err());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(CONFIG_FILE);
        let sut = Config::new(path.to_str().unwrap()).unwrap();
        let defaults = Config::default();
        assert_eq!(sut.workers, defaults.workers);
        assert_eq!(sut.duration_secs, defaults.duration_secs);
        assert_eq!(sut.recipients, defaults.recipients);
        assert_eq!(sut.commands, defaults.commands);
    }
}
