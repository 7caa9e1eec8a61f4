use std::path::PathBuf;
use std::process::ExitCode;

use anstream::eprintln;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use url::Url;

use pincer_cache::{Cache, CacheArgs};
use pincer_normalize::PackageName;
use pincer_resolver::ResolverOptionsBuilder;

use crate::commands::ExitStatus;
use crate::python_version::PythonVersion;

mod commands;
mod logging;
mod output;
mod printer;
mod python_version;
mod requirements;

#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,

    #[command(flatten)]
    cache_args: CacheArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a `requirements.in` file to a `requirements.txt` file.
    Compile(CompileArgs),
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct CompileArgs {
    /// Include all packages listed in the given `requirements.in` files.
    #[arg(required(true))]
    src_file: Vec<PathBuf>,

    /// Constrain versions using the given constraints files.
    #[arg(short, long)]
    constraint: Vec<PathBuf>,

    /// Allow pre-release and development versions to be pinned.
    #[arg(long)]
    pre: bool,

    /// Pin packaging tools like `setuptools` and `pip` too.
    #[arg(long)]
    allow_unsafe: bool,

    /// Treat the given package as unsafe instead of `setuptools`, `distribute` and `pip`; may be
    /// provided more than once.
    #[arg(long)]
    unsafe_package: Vec<PackageName>,

    /// Give up after this many rounds of resolving.
    #[arg(long, default_value_t = 10)]
    max_rounds: usize,

    /// How many index requests may be in flight at once.
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// The `major.minor` Python version to compile for.
    #[arg(long, short, default_value = "3.12")]
    python_version: PythonVersion,

    /// Add the hashes of every distribution of each pin, for `pip install --require-hashes`.
    #[arg(long)]
    generate_hashes: bool,

    /// Annotate each pin with the packages and files that required it (the default).
    #[arg(long, overrides_with = "no_annotate", hide = true)]
    annotate: bool,

    /// Don't annotate pins with `# via` comments.
    #[arg(long, overrides_with = "annotate")]
    no_annotate: bool,

    /// Don't start the output with the command that produced it.
    #[arg(long)]
    no_header: bool,

    /// Write the compiled requirements to the given `requirements.txt` file.
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// The URL of the Python Package Index, overriding any `--index-url` in the source files.
    #[arg(long, short, env = "PINCER_INDEX_URL")]
    index_url: Option<Url>,

    /// Extra URLs of package indexes to use, in addition to `--index-url`.
    #[arg(long)]
    extra_index_url: Vec<Url>,

    /// Discard cached dependency lists and fetch all metadata again.
    #[arg(long)]
    rebuild: bool,
}

/// The command line as given, for the output header.
fn command_line() -> String {
    let args = std::env::args().skip(1).map(|arg| {
        if arg.contains(char::is_whitespace) {
            format!("'{arg}'")
        } else {
            arg
        }
    });
    std::iter::once("pincer".to_string())
        .chain(args)
        .collect::<Vec<_>>()
        .join(" ")
}

async fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    })?;

    if !cli.quiet {
        pincer_warnings::enable();
    }

    let printer = printer::Printer::from_flags(cli.quiet, cli.verbose);
    let cache = Cache::try_from(cli.cache_args)?;

    match cli.command {
        Commands::Compile(args) => {
            let options = ResolverOptionsBuilder::new()
                .prereleases(args.pre)
                .allow_unsafe(args.allow_unsafe)
                .unsafe_packages(args.unsafe_package)
                .max_rounds(args.max_rounds)
                .concurrency(args.concurrency)
                .build();
            let header = (!args.no_header).then(|| {
                format!(
                    "This file was autogenerated by pincer with Python {}:\n   {}",
                    args.python_version,
                    command_line()
                )
            });

            commands::compile(
                &args.src_file,
                &args.constraint,
                args.output_file.as_deref(),
                options,
                &args.python_version,
                args.index_url,
                args.extra_index_url,
                args.generate_hashes,
                args.annotate || !args.no_annotate,
                header,
                args.rebuild,
                &cache,
                printer,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match inner().await {
        Ok(code) => code.into(),
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                let mut causes = err.chain();
                if let Some(err) = causes.next() {
                    eprintln!("{}: {}", "error".red().bold(), err);
                }
                for err in causes {
                    eprintln!("  {}: {}", "Caused by".red().bold(), err);
                }
            }
            ExitStatus::Error.into()
        }
    }
}
