use clap::Parser;
use depmetric::events::ResultPrinter;
use depmetric::fs::default_fs;
use depmetric::metrics::{AnalyzerRegistry, Origin};
use depmetric::{Cli, Config, EXIT_OK, Engine, EngineError, style};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let exit_code = match run(&cli) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            style::error(&e.to_string());
            e.exit_code()
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|e| {
            style::warning(&format!("invalid log level '{}': {}", level, e));
            EnvFilter::new("warn")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, EngineError> {
    let mut config = match &cli.config {
        Some(path) => Config::load_file(path),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
            Config::load(&cwd)
        }
    }
    .map_err(depmetric::ConfigurationError::from)?;
    cli.apply(&mut config);
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), EngineError> {
    let config = load_config(cli)?;
    let fs = default_fs();

    if cli.list_analyzers {
        let mut registry = AnalyzerRegistry::with_builtins();
        registry.load_search_paths(&config.analyzer_paths, fs.as_ref());
        list_analyzers(&registry);
        return Ok(());
    }

    let mut engine = Engine::from_config(&config, fs)?;
    if !cli.quiet {
        engine.add_listener(Box::new(ResultPrinter::stderr()));
    }

    let summary = engine.run()?;
    if !cli.quiet {
        style::success(&format!(
            "{} files, {} analyzers, {} reports",
            summary.files,
            summary.analyzers(),
            summary.reports.len()
        ));
    }
    Ok(())
}

fn list_analyzers(registry: &AnalyzerRegistry) {
    style::header("Analyzers");
    for descriptor in registry.find_all() {
        println!(
            "{} [{}] ({})",
            style::analyzer(descriptor.id.as_str()),
            descriptor.capabilities,
            descriptor.origin
        );
        if !descriptor.description.is_empty() {
            println!("    {}", descriptor.description);
        }
        if !descriptor.requires.is_empty() {
            let requires: Vec<_> = descriptor.requires.iter().map(|s| s.to_string()).collect();
            println!("{}", style::metric("requires", requires.join(", ")));
        }
    }
    if registry.find_all().all(|d| d.origin == Origin::Builtin) {
        style::hint("add analyzer manifests with --analyzer-path");
    }
}
