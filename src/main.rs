//! uastx CLI - run UAST transformation pipelines over JSON trees

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uast_transform::config::{default_config_path, load_config, write_config, UastConfig};
use uast_transform::ui::{self, Icons};
use uast_transform::{Kind, Mode, Node, Transformer};

#[derive(Parser)]
#[command(name = "uastx")]
#[command(version)]
#[command(about = "Reversible tree rewriting for language-agnostic ASTs")]
#[command(long_about = r#"
uastx applies a language driver's transformation pipeline to a JSON tree:
  • Convert native parser output into node shape
  • Annotate and normalize it up to the requested mode
  • Run the native conversion backwards to recover the parser's shape

Example usage:
  uastx init
  uastx normalize ast.json --mode annotated
  uastx normalize uast.json --reverse -o native.json
  uastx inspect uast.json --format json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the configured pipeline to a JSON tree
    Normalize {
        /// Input file ("-" reads stdin)
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to the config file (defaults to ./uastx.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How far the pipeline runs (overrides the config)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Run the native conversion backwards instead of the pipeline
        #[arg(short, long)]
        reverse: bool,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Summarize the node types of a JSON tree
    Inspect {
        /// Input file ("-" reads stdin)
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Show only the N most frequent types
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Write a starter config file
    Init {
        /// Where to write it (defaults to ./uastx.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Normalize { input, output, config, mode, reverse, compact } => {
            let config = match load_config(config.as_deref())? {
                Some(c) => c,
                None if config.is_some() => anyhow::bail!("config file not found"),
                None => {
                    ui::warn("no uastx.toml found, using defaults");
                    UastConfig::default()
                }
            };
            let root = read_tree(&input)?;
            let started = Instant::now();

            let result = if reverse {
                let Some(mapping) = config.object_to_node().mapping() else {
                    anyhow::bail!("config has no native conversion to reverse (set [native] keys)");
                };
                ui::header(&format!("{} Reversing native conversion", Icons::REVERSE));
                mapping.reverse().transform(&root)
            } else {
                let mode = mode.unwrap_or(config.mode);
                ui::header(&format!("Normalizing to {} mode", mode));
                config.transforms().run(mode, &root)
            };

            let out = match result {
                Ok(out) => out,
                Err(err) => {
                    for e in err.errors() {
                        ui::error(&e.to_string());
                    }
                    anyhow::bail!("transformation failed with {} error(s)", err.errors().len());
                }
            };

            write_tree(output.as_deref(), &out, compact)?;
            ui::success("Done");
            ui::timing(&format!("{:.2?}", started.elapsed()));
        }

        Commands::Inspect { input, format, limit } => {
            let root = read_tree(&input)?;
            let stats = TreeStats::collect(&root);

            match format {
                Format::Json => {
                    let types: Vec<_> = stats
                        .top(limit)
                        .into_iter()
                        .map(|(t, n)| serde_json::json!({ "type": t, "count": n }))
                        .collect();
                    let report = serde_json::json!({
                        "nodes": stats.nodes,
                        "objects": stats.objects,
                        "arrays": stats.arrays,
                        "untyped_objects": stats.untyped,
                        "max_depth": stats.max_depth,
                        "types": types,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Format::Text => {
                    ui::section("Tree");
                    ui::summary_row("nodes", &stats.nodes.to_string());
                    ui::summary_row("objects", &stats.objects.to_string());
                    ui::summary_row("arrays", &stats.arrays.to_string());
                    ui::summary_row("untyped objects", &stats.untyped.to_string());
                    ui::summary_row("max depth", &stats.max_depth.to_string());

                    ui::section(&format!("Types ({} distinct)", stats.types.len()));
                    if stats.types.is_empty() {
                        println!("  {}", ui::muted("no typed nodes"));
                    }
                    for (t, n) in stats.top(limit) {
                        ui::summary_row(&format!("{:>8}", n), t);
                    }
                }
            }
        }

        Commands::Init { path, force } => {
            let path = path.unwrap_or_else(default_config_path);
            write_config(&path, &UastConfig::example(), force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

fn read_tree(input: &Path) -> anyhow::Result<Node> {
    let text = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        ui::info(&format!("{} Input", Icons::FILE), &input.display().to_string());
        std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?
    };
    let node = serde_json::from_str(&text).context("input is not a valid JSON tree")?;
    Ok(node)
}

fn write_tree(output: Option<&Path>, root: &Node, compact: bool) -> anyhow::Result<()> {
    let mut text = if compact {
        serde_json::to_string(root)?
    } else {
        serde_json::to_string_pretty(root)?
    };
    text.push('\n');

    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            ui::info("Output", &path.display().to_string());
        }
        None => std::io::stdout().write_all(text.as_bytes())?,
    }
    Ok(())
}

#[derive(Default)]
struct TreeStats {
    nodes: usize,
    objects: usize,
    arrays: usize,
    untyped: usize,
    max_depth: usize,
    types: HashMap<String, usize>,
}

impl TreeStats {
    fn collect(root: &Node) -> Self {
        let mut stats = TreeStats::default();
        for n in root.iter() {
            stats.nodes += 1;
            match n.kind() {
                Kind::Object => {
                    stats.objects += 1;
                    match n.type_tag() {
                        Some(t) => *stats.types.entry(t.to_string()).or_default() += 1,
                        None => stats.untyped += 1,
                    }
                }
                Kind::Array => stats.arrays += 1,
                _ => {}
            }
        }
        stats.max_depth = depth(root);
        stats
    }

    /// Most frequent types first, ties broken by name.
    fn top(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut types: Vec<_> = self.types.iter().map(|(t, n)| (t.as_str(), *n)).collect();
        types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        types.truncate(limit);
        types
    }
}

fn depth(n: &Node) -> usize {
    match n {
        Node::Object(o) => 1 + o.iter().map(|(_, v)| depth(v)).max().unwrap_or(0),
        Node::Array(a) => 1 + a.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}
