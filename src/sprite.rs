//! # SVG Sprite Module
//!
//! Combina le icone SVG della cartella sprite in un unico sprite "stack".
//!
//! ## Pipeline per icona:
//! 1. Parsing XML (`roxmltree`, DTD consentito)
//! 2. Rimozione degli attributi `fill`, `stroke`, `style` da ogni elemento
//! 3. Rimozione della dichiarazione `xmlns` (le icone ereditano il namespace dello sprite)
//! 4. Serializzazione come `<svg id="<nome-file>">` annidato
//!
//! Nessun'altra modifica al documento: commenti, processing instruction ed
//! elementi di altri namespace (es. XHTML in `<foreignObject>`) restano con i loro prefissi.
//!
//! Lo sprite stack mostra solo l'icona referenziata dal fragment (`sprite.svg#logo`),
//! così ogni icona è utilizzabile sia in `<img>` sia in CSS `background`.

use crate::error::PipelineError;
use crate::file_manager::{FileManager, SourceSet};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STRIPPED_ATTRIBUTES: &[&str] = &["fill", "stroke", "style"];

const STACK_HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
    "<style>:root>svg{display:none}:root>svg:target{display:block}</style>"
);

/// A processed icon ready to be stacked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteIcon {
    pub id: String,
    pub markup: String,
}

/// Identifier an icon is referenced by: its file stem, whitespace replaced by `-`
pub fn icon_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().split_whitespace().collect::<Vec<_>>().join("-"))
        .unwrap_or_default()
}

/// Strip presentation attributes and the namespace declaration from one icon
pub fn process_icon(id: &str, source: &str) -> Result<SpriteIcon> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let document = roxmltree::Document::parse_with_options(source, options)
        .map_err(|e| PipelineError::transform("sprite", format!("{}: {}", id, e)))?;

    let root = document.root_element();
    if root.tag_name().name() != "svg" {
        return Err(PipelineError::transform("sprite", format!("{}: root element is not <svg>", id)).into());
    }

    let mut markup = String::new();
    markup.push_str("<svg id=\"");
    markup.push_str(&escape_attribute(id));
    markup.push('"');
    write_namespace_declarations(root, &mut markup);
    write_attributes(root, &mut markup, true);
    markup.push('>');
    for child in root.children() {
        write_node(child, &mut markup);
    }
    markup.push_str("</svg>");

    Ok(SpriteIcon {
        id: id.to_string(),
        markup,
    })
}

fn write_node(node: roxmltree::Node<'_, '_>, out: &mut String) {
    match node.node_type() {
        roxmltree::NodeType::Element => write_element(node, out),
        roxmltree::NodeType::Text => {
            if let Some(text) = node.text() {
                out.push_str(&escape_text(text));
            }
        }
        roxmltree::NodeType::Comment => {
            out.push_str("<!--");
            out.push_str(node.text().unwrap_or_default());
            out.push_str("-->");
        }
        roxmltree::NodeType::PI => {
            if let Some(pi) = node.pi() {
                out.push_str("<?");
                out.push_str(pi.target);
                if let Some(value) = pi.value {
                    out.push(' ');
                    out.push_str(value);
                }
                out.push_str("?>");
            }
        }
        roxmltree::NodeType::Root => {}
    }
}

fn write_element(node: roxmltree::Node<'_, '_>, out: &mut String) {
    let name = qualified_name(node.document().input_text(), node.range().start + 1, node.tag_name().name());

    out.push('<');
    out.push_str(name);
    write_namespace_declarations(node, out);
    write_attributes(node, out, false);

    if node.has_children() {
        out.push('>');
        for child in node.children() {
            write_node(child, out);
        }
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    } else {
        out.push_str("/>");
    }
}

/// Name as written in the source (`h:div`, `xlink:href`), starting at `start`
fn qualified_name<'a>(input: &'a str, start: usize, local: &'a str) -> &'a str {
    let Some(rest) = input.get(start..) else {
        return local;
    };
    let end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '=' | '/' | '>'))
        .unwrap_or(rest.len());
    let name = &rest[..end];
    if name.ends_with(local) {
        name
    } else {
        local
    }
}

/// Prefixed declarations introduced on this element. The default `xmlns` is dropped.
fn write_namespace_declarations(node: roxmltree::Node<'_, '_>, out: &mut String) {
    let inherited = node.parent_element();
    for namespace in node.namespaces() {
        let Some(prefix) = namespace.name() else {
            continue;
        };
        if prefix == "xml" {
            continue;
        }
        let declared_above = inherited.is_some_and(|parent| {
            parent
                .namespaces()
                .any(|ns| ns.name() == Some(prefix) && ns.uri() == namespace.uri())
        });
        if declared_above {
            continue;
        }

        out.push_str(" xmlns:");
        out.push_str(prefix);
        out.push_str("=\"");
        out.push_str(&escape_attribute(namespace.uri()));
        out.push('"');
    }
}

fn write_attributes(node: roxmltree::Node<'_, '_>, out: &mut String, skip_id: bool) {
    let input = node.document().input_text();
    for attribute in node.attributes() {
        let local = attribute.name();
        let unprefixed = attribute.namespace().is_none();
        if unprefixed && STRIPPED_ATTRIBUTES.contains(&local) {
            continue;
        }
        if skip_id && unprefixed && local == "id" {
            continue;
        }

        out.push(' ');
        out.push_str(qualified_name(input, attribute.position(), local));
        out.push_str("=\"");
        out.push_str(&escape_attribute(attribute.value()));
        out.push('"');
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Join processed icons into a stack sprite document
pub fn build_stack(icons: &[SpriteIcon]) -> String {
    let mut sprite = String::from(STACK_HEADER);
    for icon in icons {
        sprite.push_str(&icon.markup);
    }
    sprite.push_str("</svg>");
    sprite
}

/// Build `<output_dir>/<sprite_name>` from every `*.svg` in `sprite_dir`
pub async fn build_sprite(sprite_dir: &Path, output_dir: &Path, sprite_name: &str) -> Result<PathBuf> {
    let files = SourceSet::new(sprite_dir).include("*.svg")?.resolve_nonempty()?;

    let mut icons = Vec::with_capacity(files.len());
    for file in &files {
        let source = tokio::fs::read_to_string(file).await?;
        let icon = process_icon(&icon_id(file), &source)?;
        debug!("Sprite icon: #{}", icon.id);
        icons.push(icon);
    }

    let output = output_dir.join(sprite_name);
    FileManager::write(&output, build_stack(&icons).as_bytes()).await?;
    info!("Built sprite with {} icon(s) -> {}", icons.len(), output.display());
    Ok(output)
}
