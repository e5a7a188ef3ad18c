use std::{
    fs,
    path::{Path, PathBuf},
};

use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use tracing::debug;

use crate::{
    errors::PipelineError,
    render::DiagramRenderer,
    structs::{FlowDiagram, CASH_NODE, DIAGRAM_FILE},
};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const CASH_COLOR: &str = "#1f77b4";
const COMPENSATION_COLOR: &str = "#2ca02c";
const PALETTE: [&str; 8] = [
    "#ff7f0e", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

/* Plotly Sankey page. Node colours only depend on the label so two runs draw the same picture. */
#[derive(Debug, Clone)]
pub struct SankeyHtmlRenderer {
    file_name: String,
}

impl Default for SankeyHtmlRenderer {
    fn default() -> Self {
        Self {
            file_name: DIAGRAM_FILE.to_string(),
        }
    }
}

impl SankeyHtmlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_html(&self, diagram: &FlowDiagram) -> String {
        let currency = diagram.reporting_currency.code();
        let index = diagram.node_index();

        let node_colors: Vec<&str> = diagram.nodes.iter().map(|node| node_color(node)).collect();
        let mut sources = Vec::with_capacity(diagram.edges.len());
        let mut targets = Vec::with_capacity(diagram.edges.len());
        let mut values = Vec::with_capacity(diagram.edges.len());
        let mut link_colors = Vec::with_capacity(diagram.edges.len());
        let mut kinds = Vec::with_capacity(diagram.edges.len());

        for edge in &diagram.edges {
            let (Some(source), Some(target)) = (
                index.get(edge.source_node.as_str()),
                index.get(edge.target_node.as_str()),
            ) else {
                continue;
            };
            sources.push(*source);
            targets.push(*target);
            values.push(edge.value.round_dp(2).to_f64().unwrap_or(0.0));
            link_colors.push(translucent(node_colors[*source]));
            kinds.push(edge.kind.label());
        }

        let trace = json!({
            "type": "sankey",
            "orientation": "h",
            "valueformat": ",.2f",
            "valuesuffix": format!(" {currency}"),
            "node": {
                "label": diagram.nodes,
                "color": node_colors,
                "pad": 15,
                "thickness": 20,
                "line": {"color": "black", "width": 0.5},
            },
            "link": {
                "source": sources,
                "target": targets,
                "value": values,
                "color": link_colors,
                "customdata": kinds,
                // %{value} already carries valueformat and valuesuffix
                "hovertemplate": "%{source.label} → %{target.label}<br>%{customdata}: %{value}<extra></extra>",
            },
        });
        let layout = json!({
            "title": {"text": format!("Portfolio flows ({currency})")},
            "font": {"size": 12},
        });

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Portfolio flows</title>
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="sankey" style="width:100%;height:90vh;"></div>
<script>
Plotly.newPlot("sankey", [{}], {});
</script>
</body>
</html>
"#,
            script_safe(&trace.to_string()),
            script_safe(&layout.to_string())
        )
    }
}

impl DiagramRenderer for SankeyHtmlRenderer {
    fn render(&self, diagram: &FlowDiagram, output_dir: &Path) -> Result<PathBuf, PipelineError> {
        let path = output_dir.join(&self.file_name);
        fs::write(&path, self.to_html(diagram)).map_err(|source| PipelineError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "wrote sankey diagram");
        Ok(path)
    }
}

pub fn node_color(label: &str) -> &'static str {
    if label == CASH_NODE {
        return CASH_COLOR;
    }
    if label.ends_with(" Compensation") {
        return COMPENSATION_COLOR;
    }
    let hash = label
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    PALETTE[hash as usize % PALETTE.len()]
}

/* "#rrggbb" -> "rgba(r,g,b,0.4)" so overlapping links stay readable */
fn translucent(color: &str) -> String {
    let channel = |range: std::ops::Range<usize>| {
        color
            .get(range)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .unwrap_or(128)
    };
    format!("rgba({},{},{},0.4)", channel(1..3), channel(3..5), channel(5..7))
}

/* A label containing "</script>" must not close the script tag */
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}
