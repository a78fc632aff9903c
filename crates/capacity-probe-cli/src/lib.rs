//! Command-line front end for capacity probing against a Chromium-rendered
//! search site.

pub mod config;
pub mod output;
pub mod renderer;
