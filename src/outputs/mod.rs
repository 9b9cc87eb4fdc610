//! Files written by a run.
//!
//! # Submodules
//!
//! - [`results`]: the per-semester result log of newly inserted courses
//!
//! # Output Structure
//!
//! ```text
//! result_dir/
//! ├── 2024W.txt
//! └── 2025S.txt   # one "identifier - title" line per inserted course
//! ```

pub mod results;
