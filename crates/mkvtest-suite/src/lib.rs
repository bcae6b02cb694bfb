//! mkvtest suite - the registered MKVToolNix regression cases
//!
//! Each case is a compiled unit registered under its `T_NNNname` key in
//! [`builtin`]. Cases run from the test data checkout, with relative paths
//! such as `data/avi/v.avi`.

pub mod declarative;
pub mod procedural;

use mkvtest_core::{CaseFactory, Registry, RegistryError};

/// Name and constructor of every built-in case, in numeric order.
pub const CASES: &[(&str, CaseFactory)] = &[
    ("T_014splitting_by_size", procedural::splitting_by_size),
    ("T_047X_tags", procedural::extract_tags),
    ("T_217file_identification", procedural::file_identification),
    ("T_256cropping_stereo_mode", procedural::cropping_stereo_mode),
    ("T_300merge_avi_and_audio", declarative::merge_avi_and_audio),
    ("T_301merge_broken_input", declarative::merge_broken_input),
    ("T_302identification_formats", declarative::identification_formats),
    ("T_303info_summary", declarative::info_summary),
    ("T_304unsupported_containers", declarative::unsupported_containers),
    ("T_305ui_locale_de_DE", declarative::ui_locale_de_de),
    ("T_306propedit_title", declarative::propedit_title),
    ("T_307extract_tracks", declarative::extract_tracks),
];

/// The registry of all built-in cases.
pub fn builtin() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    for (name, factory) in CASES {
        registry.register(name, *factory)?;
    }
    Ok(registry)
}
