//! # apiprobe core
//!
//! Scenario-driven probing of the order, user and discount API.
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | scenario table      | ---> | runner              | ---> | reporter (output)   |
//! | id/label/expected   |      | run lock + results  |      | List/Null           |
//! +---------------------+      +---------------------+      +---------------------+
//!                                 |      ^      |
//!                                 v      |      v
//! +---------------------+      +---------------------+      +---------------------+
//! | token cache         | <--- | driver -> http      | ---> | evaluator + summary |
//! | /user, corruptions  |      | PreparedRequest     |      | {data, status}      |
//! +---------------------+      +---------------------+      +---------------------+
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod http;
pub mod masking;
pub mod reporter;
pub mod runner;
pub mod scenario;
pub mod summary;
pub mod token;

pub use eyre;

pub use config::{Config, TokenFallback};
pub use error::{Error, Result};
pub use evaluator::{evaluate, Evaluation};
pub use reporter::{ListReporter, NullReporter, Reporter, ReporterType};
pub use runner::{Message, Runner};
pub use scenario::{Scenario, ScenarioTable, UserMode};
pub use summary::{summarize, Outcome, ScenarioResult, Summary};
pub use token::{decode_header_segment, flip_last_char, Token};
