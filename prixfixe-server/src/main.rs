use std::path::PathBuf;

use clap::Parser;
use prixfixe::Config;
use prixfixe_http::{serve, ServeOptions};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "prixfixe", about = "PrixFixe search server")]
struct Cli {
    /// JSON configuration file. Without one, search is switched off.
    #[arg(long, env = "PRIXFIXE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "PRIXFIXE_BIND_ADDR", default_value = "127.0.0.1:7700")]
    bind_addr: String,

    /// Overrides `search.indexPath` from the configuration file.
    #[arg(long, env = "PRIXFIXE_INDEX_PATH")]
    index_path: Option<PathBuf>,

    /// Trust session headers without an auth gateway and fall back to a
    /// development session when they are missing.
    #[arg(long)]
    no_auth: bool,
}

fn resolve_config(cli: &Cli) -> prixfixe::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    if let Some(index_path) = &cli.index_path {
        config.search.index_path = index_path.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = resolve_config(&cli)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = config.search.provider.as_str(),
        index_path = %config.search.index_path.display(),
        "starting prixfixe"
    );
    serve(ServeOptions {
        config,
        bind_addr: cli.bind_addr,
        no_auth: cli.no_auth,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use prixfixe::SearchProvider;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("prixfixe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_bind_to_localhost() {
        let c = cli(&[]);
        assert_eq!(c.bind_addr, "127.0.0.1:7700");
        assert!(!c.no_auth);
    }

    #[test]
    fn index_path_flag_overrides_file() {
        let dir = std::env::temp_dir().join(format!("prixfixe-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"search": {"provider": "embedded", "indexPath": "/nope"}}"#)
            .unwrap();

        let c = cli(&[
            "--config",
            path.to_str().unwrap(),
            "--index-path",
            "/srv/indexes",
        ]);
        let config = resolve_config(&c).unwrap();
        assert_eq!(config.search.provider, SearchProvider::Embedded);
        assert_eq!(config.search.index_path, PathBuf::from("/srv/indexes"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn no_config_means_search_off() {
        let config = resolve_config(&cli(&[])).unwrap();
        assert_eq!(config.search.provider, SearchProvider::None);
    }
}
