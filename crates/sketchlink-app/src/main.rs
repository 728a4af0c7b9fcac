//! Command-line entry point (native).

#[cfg(feature = "native")]
mod cli {
    use clap::{Parser, Subcommand};
    use sketchlink_app::{App, AppError, AppResult};
    use sketchlink_core::canvas::CanvasDocument;
    use sketchlink_core::config::SketchConfig;
    use sketchlink_core::editor::StartupSource;
    use sketchlink_core::svg::DEFAULT_SVG_FILE_NAME;
    use std::fs;
    use std::io::{self, Read};
    use std::path::{Path, PathBuf};

    #[derive(Parser, Debug)]
    #[command(name = "sketchlink", about = "Share drawings as links")]
    pub struct Cli {
        /// Configuration file (JSON). Missing files fall back to defaults.
        #[arg(long, env = "SKETCHLINK_CONFIG", default_value = "sketchlink.json")]
        config: PathBuf,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand, Debug)]
    enum Command {
        /// Encode a scene JSON file (or `-` for stdin) as a share token or link.
        Share {
            scene: PathBuf,
            #[arg(long, env = "SKETCHLINK_BASE_URL")]
            base_url: Option<String>,
        },
        /// Decode a share link or token and print the scene JSON.
        Open {
            link: String,
            #[arg(long)]
            pretty: bool,
        },
        /// Render a share link or token as SVG.
        Svg {
            link: String,
            #[arg(short, long, default_value = DEFAULT_SVG_FILE_NAME)]
            output: PathBuf,
        },
        /// Apply a command script to a shared drawing and print the new link.
        Apply {
            link: String,
            /// Script file, or `-` for stdin.
            script: PathBuf,
            #[arg(long, env = "SKETCHLINK_BASE_URL")]
            base_url: Option<String>,
        },
    }

    pub fn run(cli: Cli) -> AppResult<()> {
        let config = SketchConfig::load(&cli.config)?;
        match cli.command {
            Command::Share { scene, base_url } => {
                let json = read_input(&scene)?;
                let document = CanvasDocument::from_json(&json)?;
                let mut app = App::from_document(&config, document)?;
                if let Some(base_url) = base_url {
                    app = app.with_base_url(base_url);
                }
                println!("{}", app.share_link()?);
            }
            Command::Open { link, pretty } => {
                let app = open_strict(&config, &link)?;
                let document = app.document();
                let json = if pretty {
                    document.to_json_pretty()
                } else {
                    document.to_json()
                };
                println!("{}", json?);
            }
            Command::Svg { link, output } => {
                let app = open_strict(&config, &link)?;
                fs::write(&output, app.export_svg()).map_err(|source| io_error(&output, source))?;
                log::info!("Wrote {}", output.display());
            }
            Command::Apply {
                link,
                script,
                base_url,
            } => {
                let text = read_input(&script)?;
                let mut app = open_strict(&config, &link)?;
                if let Some(base_url) = base_url {
                    app = app.with_base_url(base_url);
                }
                app.apply(&text)?;
                println!("{}", app.share_link()?);
            }
        }
        Ok(())
    }

    /// Open a link, treating a decode failure as an error rather than
    /// silently starting blank.
    fn open_strict(config: &SketchConfig, link: &str) -> AppResult<App> {
        let (app, source) = App::open(config, Some(link))?;
        match source {
            StartupSource::Fallback(err) => {
                log::error!("{} stage failed: {}", err.stage(), err);
                Err(AppError::Decode(err))
            }
            StartupSource::Shared | StartupSource::Blank => Ok(app),
        }
    }

    fn read_input(path: &Path) -> AppResult<String> {
        if path == Path::new("-") {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|source| io_error(path, source))?;
            return Ok(text);
        }
        fs::read_to_string(path).map_err(|source| io_error(path, source))
    }

    fn io_error(path: &Path, source: io::Error) -> AppError {
        AppError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(feature = "native")]
fn main() {
    use clap::Parser;

    env_logger::init();
    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli) {
        log::error!("{}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "native"))]
fn main() {
    panic!("Native feature not enabled. Use `cargo run --features native`");
}
