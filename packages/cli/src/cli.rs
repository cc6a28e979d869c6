//! Command-line interface for markweave.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use markweave_compiler::{
    CompileOptions, Compiler, CompilerConfig, ProcessingError, Severity, TagRegistry, Transformer,
    Value,
};

use crate::error::{CliError, Result};

/// markweave - Compile markup documents into structured output.
#[derive(Parser)]
#[command(name = "markweave")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by commands that build a compiler.
#[derive(Args, Debug, Default)]
pub struct CompilerArgs {
    /// Tag definitions file (YAML)
    #[arg(short, long)]
    pub tags: Option<PathBuf>,

    /// Reject duplicate tag definitions
    #[arg(long)]
    pub strict_tags: bool,

    /// Accept invalid TLS certificates for remote references
    #[arg(long)]
    pub insecure: bool,

    /// Timeout per reference resolution, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a document against the tag definitions.
    Validate {
        /// Markup document to validate
        file: PathBuf,

        #[command(flatten)]
        compiler: CompilerArgs,
    },

    /// Resolve, transform and render a document.
    Compile {
        /// Markup document to compile
        file: PathBuf,

        /// Mapping rules file (YAML); without rules the processed tree is rendered
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Output format (default: json)
        #[arg(short, long)]
        format: Option<String>,

        /// Variable available to `var:` references and `$name` selectors
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compact output instead of pretty-printed
        #[arg(long)]
        compact: bool,

        /// Resolve sibling references one after another
        #[arg(long)]
        sequential: bool,

        #[command(flatten)]
        compiler: CompilerArgs,
    },

    /// List the available output formats.
    Formats,
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    run_with(Cli::parse()).await
}

/// Run an already parsed command line.
pub async fn run_with(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { file, compiler } => validate_command(&file, &compiler),
        Commands::Compile {
            file,
            rules,
            format,
            vars,
            output,
            compact,
            sequential,
            compiler,
        } => {
            let options = CompileCommand {
                rules,
                format,
                vars,
                output,
                compact,
                sequential,
            };
            compile_command(&file, &compiler, options).await
        }
        Commands::Formats => formats_command(),
    }
}

struct CompileCommand {
    rules: Option<PathBuf>,
    format: Option<String>,
    vars: Vec<String>,
    output: Option<PathBuf>,
    compact: bool,
    sequential: bool,
}

fn build_compiler(args: &CompilerArgs, concurrent: bool) -> Result<Compiler> {
    let mut config = CompilerConfig::from_env()
        .with_concurrent_references(concurrent)
        .with_strict_tags(args.strict_tags);
    if args.insecure {
        config = config.with_insecure_tls(true);
    }
    if let Some(secs) = args.timeout {
        config = config.with_resolve_timeout(Duration::from_secs(secs));
    }

    let mut tags = TagRegistry::new().with_strict(config.strict_tags);
    if let Some(path) = &args.tags {
        let yaml = std::fs::read_to_string(path)?;
        let count = tags.load_from_yaml(&yaml)?;
        tracing::info!(count, path = %path.display(), "Loaded tag definitions");
    }

    Ok(Compiler::new(config)?.with_tags(tags))
}

/// Execute the validate command.
fn validate_command(file: &Path, args: &CompilerArgs) -> Result<()> {
    let compiler = build_compiler(args, true)?;
    let source = std::fs::read_to_string(file)?;
    let document = compiler.parse(&source)?;
    let result = compiler.validate(&document);

    for warning in &result.warnings {
        eprintln!("{} {warning}", style("warning:").yellow().bold());
    }
    for error in &result.errors {
        eprintln!("{} {error}", style("error:").red().bold());
    }

    if !result.is_valid() {
        return Err(CliError::Invalid {
            file: file.display().to_string(),
            count: result.errors.len(),
        });
    }

    println!(
        "{} {}",
        style("Valid:").green().bold(),
        style(file.display()).cyan()
    );
    Ok(())
}

/// Execute the compile command.
async fn compile_command(file: &Path, args: &CompilerArgs, command: CompileCommand) -> Result<()> {
    let compiler = build_compiler(args, !command.sequential)?;

    let mut options = CompileOptions::new()
        .with_variables(parse_variables(&command.vars)?)
        .with_pretty(!command.compact);
    if let Some(format) = command.format {
        options = options.with_format(format);
    }
    if let Some(path) = &command.rules {
        let yaml = std::fs::read_to_string(path)?;
        options = options.with_transformer(Transformer::from_yaml_str(&yaml)?);
    }

    let compilation = compiler.compile_file(file, &options).await?;

    for diagnostic in &compilation.diagnostics {
        print_diagnostic(diagnostic);
    }
    for error in &compilation.transform_errors {
        eprintln!("{} {error}", style("transform:").yellow().bold());
    }

    if let Some(aborted) = compilation.aborted {
        return Err(CliError::Aborted {
            file: file.display().to_string(),
            message: aborted.to_string(),
        });
    }

    let rendered = compilation.rendered.unwrap_or_default();
    match &command.output {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))?;
            eprintln!(
                "{} {}",
                style("Saved to:").green().bold(),
                path.display()
            );
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Execute the formats command.
fn formats_command() -> Result<()> {
    let compiler = Compiler::new(CompilerConfig::from_env())?;
    let default = &compiler.config().default_format;
    for format in compiler.adapters().formats() {
        if format.eq_ignore_ascii_case(default) {
            println!("{} {}", style(format).cyan(), style("(default)").dim());
        } else {
            println!("{}", style(format).cyan());
        }
    }
    Ok(())
}

fn print_diagnostic(diagnostic: &ProcessingError) {
    let label = match diagnostic.severity {
        Severity::Warning => style("warning:").yellow().bold(),
        Severity::Error | Severity::Fatal => style("error:").red().bold(),
    };
    eprintln!("{label} {diagnostic}");
}

/// Parse `NAME=VALUE` arguments. Values that read as booleans or numbers
/// are typed; everything else stays a string.
fn parse_variables(args: &[String]) -> Result<BTreeMap<String, Value>> {
    args.iter().map(|arg| parse_variable(arg)).collect()
}

fn parse_variable(arg: &str) -> Result<(String, Value)> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| CliError::InvalidVariable(arg.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidVariable(arg.to_string()));
    }

    let value = if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::String(raw.to_string())
    };
    Ok((name.to_string(), value))
}
