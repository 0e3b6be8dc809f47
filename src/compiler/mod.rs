//! Wikitext compiler seam.
//!
//! The markup grammar is owned by an external compiler. The engine only
//! needs a black-box transform from source text to HTML plus opaque
//! metadata, which is what [`Compiler`] describes.

pub mod cache;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::SiteId;

pub use cache::{CacheConfig, CacheStats, CachingCompiler};

/// Page context handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileContext {
    /// Site the page belongs to.
    pub site_id: SiteId,
    /// Page slug at compile time.
    pub slug: String,
}

/// Compiler output for one source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledOutput {
    /// Rendered HTML.
    pub html: String,
    /// Opaque compiler metadata (warnings, link lists, statistics).
    pub metadata: serde_json::Value,
    /// Identifier of the compiler that produced the output.
    pub generator: String,
}

/// Black-box wikitext compiler.
pub trait Compiler: Send + Sync {
    /// Compile source text for a page.
    fn compile(&self, ctx: &CompileContext, wikitext: &str) -> CompiledOutput;

    /// Generator identifier recorded on revisions.
    fn generator(&self) -> &str;
}

/// Fallback compiler: escapes the source and wraps paragraphs.
///
/// Used when no real markup compiler is wired in.
#[derive(Debug, Clone, Default)]
pub struct EscapingCompiler;

impl EscapingCompiler {
    const GENERATOR: &'static str = concat!("revision-kernel-escape/", env!("CARGO_PKG_VERSION"));
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

impl Compiler for EscapingCompiler {
    fn compile(&self, _ctx: &CompileContext, wikitext: &str) -> CompiledOutput {
        let paragraphs: Vec<&str> = wikitext
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let html = paragraphs
            .iter()
            .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br />")))
            .collect::<Vec<_>>()
            .join("\n");

        CompiledOutput {
            html,
            metadata: json!({
                "paragraphs": paragraphs.len(),
                "lines": wikitext.lines().count(),
                "words": wikitext.split_whitespace().count(),
            }),
            generator: self.generator().to_string(),
        }
    }

    fn generator(&self) -> &str {
        Self::GENERATOR
    }
}
