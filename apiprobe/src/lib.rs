//! # apiprobe
//!
//! Command-line front end for [`apiprobe_core`]. It runs the fixed scenario
//! table against the order, user and discount API and reports pass/fail
//! against the expected status codes.
//!
//! ```bash
//! # run everything, printing each HTTP exchange with credentials masked
//! apiprobe test --capture-http
//!
//! # run two scenarios only
//! apiprobe test --scenarios discount-ok-btn,discount-expired-btn
//!
//! # fetch a nested token and show both headers
//! apiprobe token --mode nested
//! ```
//!
//! Configuration is read from `apiprobe.toml` and `APIPROBE_*` variables, see
//! [`apiprobe_core::config`].

mod app;
pub mod shell;

pub use app::App;
