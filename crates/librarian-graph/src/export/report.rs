//! HTML and Markdown reports embedding every diagram.
//!
//! Mermaid is rendered client side. PlantUML goes through the public
//! renderer: the source is deflated and encoded with PlantUML's base64
//! alphabet into the URL. Sources that encode too long for a URL are
//! flagged instead and only linked.

use std::io::Write;
use std::sync::LazyLock;

use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::Utc;
use flate2::Compression;
use flate2::write::DeflateEncoder;

use super::{Artifact, ArtifactFormat, ExportOptions, Result};
use crate::store::GraphStats;

pub const PLANTUML_SERVER: &str = "https://www.plantuml.com/plantuml/svg/";

/// Longest encoded source sent to the remote renderer.
pub const REMOTE_RENDER_LIMIT: usize = 4096;

static PLANTUML_BASE64: LazyLock<GeneralPurpose> = LazyLock::new(|| {
    let alphabet =
        Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_")
            .expect("valid PlantUML alphabet");
    GeneralPurpose::new(
        &alphabet,
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
});

/// Deflate `source` and encode it for a PlantUML server URL.
pub fn encode_plantuml(source: &str) -> Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(PLANTUML_BASE64.encode(compressed))
}

/// A PlantUML diagram prepared for the remote renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDiagram {
    pub url: String,
    pub too_large: bool,
}

pub fn remote_diagram(source: &str) -> Result<RemoteDiagram> {
    let encoded = encode_plantuml(source)?;
    Ok(RemoteDiagram {
        too_large: encoded.len() > REMOTE_RENDER_LIMIT,
        url: format!("{}{}", PLANTUML_SERVER, encoded),
    })
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<script type="module">
import mermaid from "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.esm.min.mjs";
mermaid.initialize({ startOnLoad: true });
</script>
<style>
body { font-family: -apple-system, "Segoe UI", Helvetica, sans-serif; margin: 2rem auto; max-width: 72rem; color: #222; }
table { border-collapse: collapse; }
td, th { border: 1px solid #ccc; padding: 0.25rem 0.75rem; text-align: left; }
section { margin-top: 2.5rem; }
pre { background: #f6f8fa; padding: 1rem; overflow-x: auto; }
.warning { color: #9a6700; }
.meta { color: #666; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<p class="meta">Generated {{generated}}. Detail: {{detail}}. Filter: {{filter}}.</p>
{{stats}}
{{sections}}
</body>
</html>
"#;

const MARKDOWN_TEMPLATE: &str = "# {{title}}

Generated {{generated}}. Detail: {{detail}}. Filter: {{filter}}.

{{stats}}
{{sections}}";

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn stat_rows(stats: &GraphStats) -> [(&'static str, i64); 6] {
    [
        ("Notes", stats.notes),
        ("Links", stats.links),
        ("Tags", stats.tags),
        ("Code files", stats.code),
        ("External modules", stats.modules),
        ("Assets", stats.assets),
    ]
}

fn title(options: &ExportOptions) -> String {
    match &options.focus {
        Some(focus) => format!("Vault graph: {}", focus),
        None => "Vault graph".to_string(),
    }
}

fn fill(template: &str, title: &str, options: &ExportOptions, stats: String, sections: String) -> String {
    template
        .replace("{{title}}", title)
        .replace("{{generated}}", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string())
        .replace("{{detail}}", options.detail.as_str())
        .replace("{{filter}}", options.filter.as_str())
        .replace("{{stats}}", &stats)
        .replace("{{sections}}", &sections)
}

/// Render `index.html`.
pub fn html(stats: &GraphStats, options: &ExportOptions, artifacts: &[Artifact]) -> Result<String> {
    let mut table = String::from("<table>\n<tr><th>Kind</th><th>Count</th></tr>\n");
    for (name, count) in stat_rows(stats) {
        table.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>\n", name, count));
    }
    table.push_str("</table>");

    let mut sections = String::new();
    for artifact in artifacts {
        let name = escape_html(&artifact.name);
        let body = match artifact.format {
            ArtifactFormat::Mermaid => format!(
                "<pre class=\"mermaid\">\n{}</pre>",
                escape_html(&artifact.content)
            ),
            ArtifactFormat::PlantUml => {
                let remote = remote_diagram(&artifact.content)?;
                if remote.too_large {
                    format!(
                        "<p class=\"warning\">Too large to render remotely. Open <a href=\"{}\">{}</a> locally.</p>",
                        name, name
                    )
                } else {
                    format!(
                        "<img src=\"{}\" alt=\"{}\">",
                        escape_html(&remote.url),
                        escape_html(&artifact.title)
                    )
                }
            }
            ArtifactFormat::Dot => format!("<pre><code>{}</code></pre>", escape_html(&artifact.content)),
            ArtifactFormat::Html | ArtifactFormat::Markdown => continue,
        };
        sections.push_str(&format!(
            "<section>\n<h2>{}</h2>\n{}\n<p><a href=\"{}\">{}</a></p>\n</section>\n",
            escape_html(&artifact.title),
            body,
            name,
            name
        ));
    }
    Ok(fill(HTML_TEMPLATE, &escape_html(&title(options)), options, table, sections))
}

/// Render `report.md`.
pub fn markdown(stats: &GraphStats, options: &ExportOptions, artifacts: &[Artifact]) -> Result<String> {
    let mut table = String::from("| Kind | Count |\n|------|-------|\n");
    for (name, count) in stat_rows(stats) {
        table.push_str(&format!("| {} | {} |\n", name, count));
    }

    let mut sections = String::new();
    for artifact in artifacts {
        let body = match artifact.format {
            ArtifactFormat::Mermaid => format!("```mermaid\n{}```", artifact.content),
            ArtifactFormat::PlantUml => {
                let remote = remote_diagram(&artifact.content)?;
                if remote.too_large {
                    format!(
                        "> Too large to render remotely. See [{}]({}).",
                        artifact.name, artifact.name
                    )
                } else {
                    format!("![{}]({})", artifact.title, remote.url)
                }
            }
            ArtifactFormat::Dot => format!("```dot\n{}```", artifact.content),
            ArtifactFormat::Html | ArtifactFormat::Markdown => continue,
        };
        sections.push_str(&format!(
            "\n## {}\n\n{}\n\nSource: [{}]({})\n",
            artifact.title, body, artifact.name, artifact.name
        ));
    }
    Ok(fill(MARKDOWN_TEMPLATE, &title(options), options, table, sections))
}
