use std::path::{Path, PathBuf};

use crate::{errors::PipelineError, structs::FlowDiagram};

pub mod sankey_html;
pub use sankey_html::*;

/* Turns the aggregated flows into a file. Returns the path of what was written. */
pub trait DiagramRenderer {
    fn render(&self, diagram: &FlowDiagram, output_dir: &Path) -> Result<PathBuf, PipelineError>;
}
