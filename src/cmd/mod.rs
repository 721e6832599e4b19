//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                  |
//! |------------|---------------------------------------------------|
//! | `generate` | `Gen`, `Regen`, `Edit`, `Theme`, `Form`           |
//! | `inspect`  | `Sections`, `History`, `Usage`, `Projects`        |
//! | `config`   | `Config`                                          |

pub mod config;
pub mod generate;
pub mod inspect;

pub use config::cmd_config;
pub use generate::{GenOptions, cmd_edit, cmd_form, cmd_gen, cmd_regen, cmd_theme};
pub use inspect::{cmd_history, cmd_projects, cmd_sections, cmd_usage};
