//! Plain-text rendering of Notion pages.

use super::models::Block;

/// A block together with its nesting depth below the page (0 = top level).
#[derive(Debug, Clone)]
pub struct NestedBlock {
    pub depth: usize,
    pub block: Block,
}

pub fn render_page(title: Option<&str>, blocks: &[NestedBlock]) -> String {
    let mut lines = Vec::with_capacity(blocks.len() + 1);
    if let Some(title) = title {
        lines.push(title.to_owned());
    }

    for nested in blocks {
        let Some(rendered) = render_block(&nested.block) else {
            continue;
        };
        let indent = "  ".repeat(nested.depth);
        for line in rendered.lines() {
            lines.push(format!("{indent}{line}"));
        }
    }

    lines.join("\n")
}

/// Render one block, or `None` for empty and unsupported blocks.
pub fn render_block(block: &Block) -> Option<String> {
    let content = block.content();
    let text = super::models::plain_text(&content.rich_text);

    let rendered = match block.kind.as_str() {
        "paragraph" | "toggle" => text,
        "heading_1" => format!("# {text}"),
        "heading_2" => format!("## {text}"),
        "heading_3" => format!("### {text}"),
        "bulleted_list_item" => format!("- {text}"),
        "numbered_list_item" => format!("1. {text}"),
        "to_do" => {
            let mark = if content.checked.unwrap_or(false) { "x" } else { " " };
            format!("[{mark}] {text}")
        }
        "quote" | "callout" => format!("> {text}"),
        "code" => {
            let language = content.language.unwrap_or_default();
            format!("```{language}\n{text}\n```")
        }
        "child_page" | "child_database" => content.title?,
        "divider" => return Some("---".to_owned()),
        _ => return None,
    };

    (!rendered.trim().is_empty()).then_some(rendered)
}
