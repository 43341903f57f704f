pub mod toml_loader;

pub use toml_loader::{load_all_targets, load_profile, load_targets_file};
