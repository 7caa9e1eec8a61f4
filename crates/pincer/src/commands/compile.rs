use std::fmt::Write;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anstream::eprintln;
use anyhow::{Context, Result};
use itertools::Itertools;
use owo_colors::OwoColorize;
use tracing::debug;
use url::Url;

use pincer_cache::Cache;
use pincer_client::{Platform, PypiRepositoryBuilder};
use pincer_fs::Simplified;
use pincer_resolver::{
    CacheError, DependencyCache, InstallRequirement, Repository, ResolveError, Resolver,
    ResolverOptions,
};

use crate::commands::{ExitStatus, elapsed};
use crate::output::RequirementsTxtWriter;
use crate::printer::Printer;
use crate::python_version::PythonVersion;
use crate::requirements::RequirementsSpecification;

/// Resolve a set of requirements into a set of pinned versions.
pub(crate) async fn compile(
    src_files: &[PathBuf],
    constraint_files: &[PathBuf],
    output_file: Option<&Path>,
    options: ResolverOptions,
    python_version: &PythonVersion,
    index_url: Option<Url>,
    extra_index_urls: Vec<Url>,
    generate_hashes: bool,
    annotate: bool,
    header: Option<String>,
    rebuild: bool,
    cache: &Cache,
    mut printer: Printer,
) -> Result<ExitStatus> {
    let start = std::time::Instant::now();

    // Read all requirements from the provided sources.
    let working_dir = std::env::current_dir()?;
    let spec = RequirementsSpecification::from_sources(src_files, constraint_files, &working_dir)?;
    debug!(
        "Read {} requirements and {} constraints",
        spec.requirements.len(),
        spec.constraints.len()
    );

    // Index locations on the command line take precedence over those in the files.
    let mut builder = PypiRepositoryBuilder::new()
        .platform(Platform::current())
        .python_version(python_version.version())
        .extra_index_urls(
            extra_index_urls
                .into_iter()
                .chain(spec.extra_index_urls)
                .unique(),
        );
    if let Some(index_url) = index_url.or(spec.index_url) {
        builder = builder.index_url(index_url);
    }
    let repository = builder.build()?;

    let dependency_cache = load_dependency_cache(cache, python_version, rebuild)?;
    if rebuild {
        dependency_cache.clear()?;
        repository.clear_caches();
    }

    // Resolve the dependencies.
    let markers = python_version.markers();
    let unsafe_packages = options.unsafe_packages.clone();
    let allow_unsafe = options.allow_unsafe;
    let mut resolver = Resolver::new(
        spec.requirements.into_iter().chain(spec.constraints),
        &repository,
        &dependency_cache,
        &markers,
        options,
    );
    let resolution = match resolver.resolve().await {
        Err(err @ (ResolveError::NoCandidateFound(_) | ResolveError::Incompatible(_))) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{}: {err}", "error".red().bold());
            }
            return Ok(ExitStatus::Failure);
        }
        result => result?,
    };

    let len = resolution.iter().count();
    let s = if len == 1 { "" } else { "s" };
    writeln!(
        printer,
        "{}",
        format!(
            "Resolved {} in {}",
            format!("{len} package{s}").bold(),
            elapsed(start.elapsed())
        )
        .dimmed()
    )?;

    let hashes = if generate_hashes {
        let pins: Vec<InstallRequirement> = resolution.iter().cloned().collect();
        Some(resolver.resolve_hashes(&pins).await?)
    } else {
        None
    };
    let reverse_dependencies = annotate.then(|| resolution.reverse_dependencies(&dependency_cache));

    let output = RequirementsTxtWriter::from_resolution(&resolution, &unsafe_packages, allow_unsafe)
        .with_header(header)
        .with_annotations(reverse_dependencies.as_ref())
        .with_hashes(hashes.as_ref())
        .to_string();

    if let Some(output_file) = output_file {
        pincer_fs::write_atomic_sync(output_file, output)
            .with_context(|| format!("Failed to write `{}`", output_file.user_display()))?;
    } else {
        std::io::stdout().lock().write_all(output.as_bytes())?;
    }

    Ok(ExitStatus::Success)
}

/// Open the dependency cache of the target interpreter. Without a persistent cache directory
/// the cache only lives for this run.
fn load_dependency_cache(
    cache: &Cache,
    python_version: &PythonVersion,
    rebuild: bool,
) -> Result<DependencyCache> {
    if cache.is_temporary() {
        return Ok(DependencyCache::in_memory());
    }

    let path = cache.dependency_cache_path(python_version.major(), python_version.minor());
    match DependencyCache::from_path(&path) {
        Ok(dependency_cache) => Ok(dependency_cache),
        // The cache is about to be cleared anyway.
        Err(
            err @ (CacheError::Corrupt { .. }
            | CacheError::UnknownFormat { .. }
            | CacheError::Json { .. }),
        ) if rebuild => {
            debug!("Discarding unreadable dependency cache: {err}");
            pincer_fs::remove_file_if_exists(&path)?;
            Ok(DependencyCache::from_path(path)?)
        }
        Err(err) => Err(err)
            .context("Failed to load the dependency cache (use `--rebuild` to discard it)"),
    }
}
