use crate::config::Config;
use crate::metrics::{DISABLED_ANALYZERS, Options};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "depmetric")]
#[command(about = "Compute code metrics with dependency-ordered analyzers")]
#[command(version)]
pub struct Cli {
    /// Source directories or files to analyze
    pub sources: Vec<PathBuf>,

    /// Report to produce, as id=path (`-` writes to stdout). Repeatable
    #[arg(short, long = "report", value_name = "ID=PATH", value_parser = Options::parse_pair)]
    pub reports: Vec<(String, String)>,

    /// File suffixes to parse (comma-separated, replaces the defaults)
    #[arg(long, value_delimiter = ',')]
    pub suffix: Vec<String>,

    /// Additional directory names to skip
    #[arg(long, value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Package name patterns to hide from analyzers (`*` is a wildcard)
    #[arg(long, value_delimiter = ',')]
    pub exclude_package: Vec<String>,

    /// Analyzer option, as key=value. Repeatable
    #[arg(short, long = "option", value_name = "KEY=VALUE", value_parser = Options::parse_pair)]
    pub options: Vec<(String, String)>,

    /// Analyzer ids to disable (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub disable: Vec<String>,

    /// Directories searched for analyzer manifests
    #[arg(long)]
    pub analyzer_path: Vec<PathBuf>,

    /// Directory holding the persisted metric cache
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Run the analyzers of one step concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Also drop analyzers that depend on a disabled one
    #[arg(long)]
    pub cascade_disabled: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// List the known analyzers and exit
    #[arg(long)]
    pub list_analyzers: bool,

    /// Config file (defaults to .depmetric.toml in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter, e.g. `debug` or `depmetric=trace`
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Layers the command line over a loaded config. Lists given on the
    /// command line replace the configured ones, except disabled analyzers
    /// and options, which are merged.
    pub fn apply(&self, config: &mut Config) {
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if !self.reports.is_empty() {
            config.reports = self.reports.iter().cloned().collect();
        }
        if !self.suffix.is_empty() {
            config.extensions = self.suffix.clone();
        }
        config.exclude_dirs.extend(self.ignore.iter().cloned());
        config
            .exclude_packages
            .extend(self.exclude_package.iter().cloned());
        config
            .analyzer_paths
            .extend(self.analyzer_path.iter().cloned());
        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir.clone();
        }
        config.parallel |= self.parallel;
        config.cascade_disabled |= self.cascade_disabled;

        config
            .options
            .extend(self.options.iter().cloned().collect::<Options>());
        if !self.disable.is_empty() {
            let mut disabled = config.options.get_list(DISABLED_ANALYZERS);
            for id in &self.disable {
                if !disabled.contains(id) {
                    disabled.push(id.clone());
                }
            }
            config.options.insert(DISABLED_ANALYZERS, disabled.join(","));
        }
    }
}
