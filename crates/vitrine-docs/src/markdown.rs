//! Markdown to node trees
//!
//! Descriptions and `Markdown` blocks are parsed with pulldown-cmark and
//! turned into [`Node`] trees so docs pages mount through the same canvas as
//! stories. Raw HTML in the source is kept as text.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use vitrine_store::Node;

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Parse markdown into block-level nodes
#[must_use]
pub fn to_nodes(source: &str) -> Vec<Node> {
    // Root sentinel collects top-level blocks
    let mut stack: Vec<Node> = vec![Node::element("#root")];

    for event in Parser::new_ext(source, options()) {
        match event {
            Event::Start(tag) => stack.push(open(&tag)),
            Event::End(_) => close(&mut stack),
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                push_child(&mut stack, Node::text(text.to_string()));
            }
            Event::Code(code) => {
                push_child(&mut stack, Node::element("code").with_text(code.to_string()));
            }
            Event::SoftBreak => push_child(&mut stack, Node::text(" ")),
            Event::HardBreak => push_child(&mut stack, Node::element("br")),
            Event::Rule => push_child(&mut stack, Node::element("hr")),
            _ => {}
        }
    }

    while stack.len() > 1 {
        close(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

/// Plain text of a markdown source, with block boundaries as spaces
#[must_use]
pub fn plain_text(source: &str) -> String {
    let mut out = String::new();
    for event in Parser::new_ext(source, options()) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak | Event::End(TagEnd::Paragraph) => out.push(' '),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn open(tag: &Tag<'_>) -> Node {
    match tag {
        Tag::Paragraph => Node::element("p"),
        Tag::Heading { level, .. } => Node::element(heading_tag(*level)),
        Tag::BlockQuote(_) => Node::element("blockquote"),
        Tag::HtmlBlock => Node::element("div"),
        Tag::CodeBlock(kind) => {
            let pre = Node::element("pre");
            match kind {
                CodeBlockKind::Fenced(lang) if !lang.is_empty() => pre.with_attr("data-lang", lang.to_string()),
                _ => pre,
            }
        }
        Tag::List(Some(start)) if *start != 1 => Node::element("ol").with_attr("start", start.to_string()),
        Tag::List(Some(_)) => Node::element("ol"),
        Tag::List(None) => Node::element("ul"),
        Tag::Item => Node::element("li"),
        Tag::Emphasis => Node::element("em"),
        Tag::Strong => Node::element("strong"),
        Tag::Strikethrough => Node::element("del"),
        Tag::Link { dest_url, .. } => Node::element("a").with_attr("href", dest_url.to_string()),
        Tag::Image { dest_url, .. } => Node::element("img").with_attr("src", dest_url.to_string()),
        Tag::Table(_) => Node::element("table"),
        Tag::TableHead => Node::element("thead"),
        Tag::TableRow => Node::element("tr"),
        Tag::TableCell => Node::element("td"),
        _ => Node::element("span"),
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn close(stack: &mut Vec<Node>) {
    if stack.len() > 1 {
        if let Some(node) = stack.pop() {
            push_child(stack, node);
        }
    }
}

fn push_child(stack: &mut [Node], child: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn html(source: &str) -> String {
        to_nodes(source).iter().map(Node::to_html).collect()
    }

    #[test]
    fn paragraphs_and_inline_markup() {
        assert_eq!(
            html("A **bold** and *soft* `call()`"),
            "<p>A <strong>bold</strong> and <em>soft</em> <code>call()</code></p>"
        );
    }

    #[test]
    fn headings_lists_and_links() {
        assert_eq!(
            html("## Usage\n\n- [docs](https://example.com)\n- two"),
            "<h2>Usage</h2><ul><li><a href=\"https://example.com\">docs</a></li><li>two</li></ul>"
        );
    }

    #[test]
    fn fenced_code_keeps_language() {
        assert_eq!(
            html("```rust\nlet x = 1;\n```"),
            "<pre data-lang=\"rust\">let x = 1;\n</pre>"
        );
    }

    #[test]
    fn raw_html_is_escaped() {
        let out = html("<script>x</script>");
        assert!(out.contains("&lt;script&gt;"));
        assert!(!out.contains("<script>"));
    }

    #[test]
    fn plain_text_flattens_markup() {
        assert_eq!(plain_text("The *primary*\nbutton.\n\nSecond `para`."), "The primary button. Second para.");
    }
}
