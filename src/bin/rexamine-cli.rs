//! Command-line interface for pattern diagnostics.
//!
//! A thin, binding-agnostic layer over the facade: every subcommand reads
//! a pattern (argument or stdin) and emits a JSON document on stdout, so
//! editors and CI wrappers can consume results without linking the crate.
//!
//! # Usage
//!
//! ```bash
//! rexamine-cli validate '/(a|b)+c/'
//! rexamine-cli redos '/(a+)+$/' --confirm
//! rexamine-cli solve subset '/^a+$/' '/^[a-c]+$/'
//! echo '/ab+c/i' | rexamine-cli explain --format json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use rexamine::automata::solver::{MatchMode, SolverOptions};
use rexamine::config::Config;
use rexamine::core::optimizer::OptimizeOptions;
use rexamine::facade::{ExplainFormat, Facade, LanguageSolver};
use rexamine::redos::RedosOptions;
use std::io::Read;

#[derive(Parser)]
#[command(name = "rexamine-cli", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a pattern and print its AST as JSON
    Parse {
        /// Pattern (omit to read stdin)
        pattern: Option<String>,
        /// Collect errors instead of stopping at the first one
        #[arg(long)]
        tolerant: bool,
    },

    /// Validate a pattern and print the structured result
    Validate {
        pattern: Option<String>,
    },

    /// Optimize a pattern and print the rewrite report
    Optimize {
        pattern: Option<String>,
        /// Leave character classes untouched
        #[arg(long)]
        keep_classes: bool,
    },

    /// Analyze a pattern for ReDoS risk
    Redos {
        pattern: Option<String>,
        /// Confirm findings empirically with the witness runtime
        #[arg(long)]
        confirm: bool,
    },

    /// Render the AST for humans or tools
    Explain {
        pattern: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Decide a relation between two patterns
    Solve {
        #[arg(value_enum)]
        operation: Operation,
        left: String,
        right: String,
        /// Compare substring languages instead of full matches
        #[arg(long)]
        partial: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Operation {
    /// Is the intersection of the two languages empty?
    Intersection,
    /// Is the left language contained in the right?
    Subset,
    /// Do both patterns recognize the same language?
    Equivalent,
}

fn main() {
    let cli = Cli::parse();
    let facade = Facade::new(Config::default());

    let outcome = match cli.command {
        Commands::Parse { pattern, tolerant } => {
            let source = read_pattern(pattern);
            if tolerant {
                match facade.parse_tolerant(&source) {
                    Ok(out) => {
                        let diagnostics: Vec<serde_json::Value> = out
                            .errors
                            .iter()
                            .map(|e| match e {
                                rexamine::Error::Lexer(s)
                                | rexamine::Error::Parser(s)
                                | rexamine::Error::Validation(s) => s.to_lsp_diagnostic(),
                                other => serde_json::json!({ "message": other.to_string() }),
                            })
                            .collect();
                        Ok(serde_json::json!({
                            "success": out.errors.is_empty(),
                            "ast": out.root,
                            "diagnostics": diagnostics,
                        }))
                    }
                    Err(e) => Err(e),
                }
            } else {
                facade
                    .parse(&source)
                    .map(|out| serde_json::json!({ "success": true, "ast": out.root }))
            }
        }
        Commands::Validate { pattern } => {
            let source = read_pattern(pattern);
            let result = facade.validate(&source);
            serde_json::to_value(&result).map_err(|e| rexamine::Error::Cache {
                message: e.to_string(),
            })
        }
        Commands::Optimize { pattern, keep_classes } => {
            let source = read_pattern(pattern);
            let options = OptimizeOptions {
                canonicalize_classes: !keep_classes,
                ..Default::default()
            };
            facade
                .optimize(&source, &options)
                .and_then(|r| to_value(&r))
        }
        Commands::Redos { pattern, confirm } => {
            let source = read_pattern(pattern);
            let options = RedosOptions {
                confirm,
                ..Default::default()
            };
            facade.redos(&source, &options).and_then(|r| to_value(&r))
        }
        Commands::Explain { pattern, format } => {
            let source = read_pattern(pattern);
            let format = match format {
                Format::Text => ExplainFormat::Text,
                Format::Json => ExplainFormat::Json,
            };
            match facade.explain(&source, format) {
                Ok(rendered) if format == ExplainFormat::Json => {
                    serde_json::from_str(&rendered).map_err(|e| rexamine::Error::Cache {
                        message: e.to_string(),
                    })
                }
                Ok(rendered) => Ok(serde_json::json!({ "explanation": rendered })),
                Err(e) => Err(e),
            }
        }
        Commands::Solve {
            operation,
            left,
            right,
            partial,
        } => {
            let options = SolverOptions {
                match_mode: if partial {
                    MatchMode::Partial
                } else {
                    MatchMode::Full
                },
                ..Default::default()
            };
            let solver = LanguageSolver::new(&facade);
            match operation {
                Operation::Intersection => solver
                    .intersection_empty(&left, &right, &options)
                    .and_then(|r| to_value(&r)),
                Operation::Subset => solver
                    .subset_of(&left, &right, &options)
                    .and_then(|r| to_value(&r)),
                Operation::Equivalent => solver
                    .equivalent(&left, &right, &options)
                    .and_then(|r| to_value(&r)),
            }
        }
    };

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        }
        Err(e) => {
            let error = serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "category": e.category().to_string(),
                "code": e.code(),
                "offset": e.offset(),
                "hint": e.hint(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&error).unwrap_or_default());
            std::process::exit(1);
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, rexamine::Error> {
    serde_json::to_value(value).map_err(|e| rexamine::Error::Cache {
        message: e.to_string(),
    })
}

fn read_pattern(arg: Option<String>) -> String {
    match arg {
        Some(p) => p,
        None => {
            let mut buffer = String::new();
            if std::io::stdin().read_to_string(&mut buffer).is_err() {
                eprintln!("error reading pattern from stdin");
                std::process::exit(1);
            }
            buffer.trim_end_matches(['\r', '\n']).to_string()
        }
    }
}
