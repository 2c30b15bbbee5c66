//! # tagsaver CLI
//!
//! Command-line interface for the TagSaver record database.
//!
//! ## Usage
//! ```bash
//! tagsaver check cat.png --threshold 8
//! tagsaver save cat.png --source-url https://site/post/1 --tags artist:ann,cat
//! tagsaver tags cat --output json
//! ```

mod cli;

use tagsaver_core::Result;

fn main() -> Result<()> {
    cli::run()
}
