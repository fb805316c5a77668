//! rexamine: PCRE-family patterns as first-class code.
//!
//! Parses delimited patterns into a validated AST, normalizes and
//! optimizes them, lowers the regular sublanguage to NFA/DFA form, and
//! answers decision questions (containment, equivalence, intersection
//! emptiness) with minimal witness strings. A separate analyzer locates
//! ReDoS-prone ambiguity statically and can confirm it empirically
//! against a step-counting backtracking runtime.
//!
//! # Modules
//!
//! - `core`: front end: splitter, lexer, parser, validator, optimizer,
//!   writer, literal extraction, errors and hints
//! - `automata`: NFA/DFA pipeline and the language solver
//! - `redos`: ReDoS analysis and its witness runtime
//! - `cache`: content-addressed memoization backends
//! - `facade`: the composed entry points
//! - `build`: fluent AST construction helpers
//!
//! # Example
//!
//! ```
//! use rexamine::config::Config;
//! use rexamine::facade::{Facade, LanguageSolver};
//! use rexamine::automata::solver::SolverOptions;
//!
//! let facade = Facade::new(Config::default());
//! assert!(facade.validate("/(a|b)+c/").valid);
//!
//! let solver = LanguageSolver::new(&facade);
//! let verdict = solver
//!     .subset_of("/^a+$/", "/^[a-c]+$/", &SolverOptions::default())
//!     .unwrap();
//! assert!(verdict.holds);
//! ```

pub mod automata;
pub mod build;
pub mod cache;
pub mod config;
pub mod core;
pub mod facade;
pub mod redos;

// Re-export commonly used types for convenience
pub use crate::config::{Config, TargetVersion};
pub use crate::core::errors::{Error, ErrorCategory, SourceError};
pub use crate::core::nodes::Node;
pub use crate::core::pattern::{Flags, Pattern};
pub use crate::facade::{Facade, LanguageSolver};
