//! HTML payload codec for the host-facing value string.
//!
//! The document model keeps every block flat; grouping into `<blockquote>`,
//! `<ul>` and `<ol>` containers happens only here, on the way out. Parsing is
//! lenient and never fails: unknown tags are skipped, stray text is wrapped
//! in a paragraph and a malformed payload degrades to whatever blocks could
//! be recovered.

use serde_json::Value;

use crate::core::{Attrs, Document, ElementNode, Marks, Node, TextNode, VoidNode};

pub fn serialize_document(doc: &Document) -> String {
    if is_empty_document(doc) {
        return String::new();
    }

    let mut out = String::new();
    let mut ix = 0usize;
    while ix < doc.children.len() {
        match &doc.children[ix] {
            Node::Void(v) if v.kind == "image" => {
                write_image(&mut out, v);
                ix += 1;
            }
            Node::Element(el) if el.kind == "quote" => {
                out.push_str("<blockquote>");
                while let Some(Node::Element(el)) = doc.children.get(ix) {
                    if el.kind != "quote" {
                        break;
                    }
                    write_text_block(&mut out, el, "p");
                    ix += 1;
                }
                out.push_str("</blockquote>");
            }
            Node::Element(el) if el.kind == "list_item" => {
                let list = list_type(el);
                let tag = if list == "ordered" { "ol" } else { "ul" };
                out.push('<');
                out.push_str(tag);
                out.push('>');
                while let Some(Node::Element(el)) = doc.children.get(ix) {
                    if el.kind != "list_item" || list_type(el) != list {
                        break;
                    }
                    write_text_block(&mut out, el, "li");
                    ix += 1;
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Node::Element(el) if el.kind == "heading" => {
                let level = el
                    .attrs
                    .get("level")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1)
                    .clamp(1, 3);
                let tag = match level {
                    1 => "h1",
                    2 => "h2",
                    _ => "h3",
                };
                write_text_block(&mut out, el, tag);
                ix += 1;
            }
            Node::Element(el) => {
                write_text_block(&mut out, el, "p");
                ix += 1;
            }
            Node::Void(_) | Node::Text(_) => {
                ix += 1;
            }
        }
    }
    out
}

fn is_empty_document(doc: &Document) -> bool {
    let [Node::Element(el)] = doc.children.as_slice() else {
        return false;
    };
    el.kind == "paragraph"
        && el.attrs.is_empty()
        && el.children.iter().all(|n| match n {
            Node::Text(t) => t.text.is_empty(),
            _ => false,
        })
}

fn list_type(el: &ElementNode) -> &str {
    match el.attrs.get("list").and_then(|v| v.as_str()) {
        Some("ordered") => "ordered",
        _ => "unordered",
    }
}

fn write_text_block(out: &mut String, el: &ElementNode, tag: &str) {
    out.push('<');
    out.push_str(tag);
    match el.attrs.get("align").and_then(|v| v.as_str()) {
        Some("center") => out.push_str(" style=\"text-align: center\""),
        Some("right") => out.push_str(" style=\"text-align: right\""),
        _ => {}
    }
    out.push('>');
    for child in &el.children {
        if let Node::Text(t) = child {
            write_text_run(out, t);
        }
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn write_text_run(out: &mut String, run: &TextNode) {
    if run.text.is_empty() {
        return;
    }

    if let Some(href) = &run.marks.link {
        out.push_str("<a href=\"");
        escape_attr_into(out, href);
        out.push_str("\">");
    }
    if run.marks.bold {
        out.push_str("<strong>");
    }
    if run.marks.italic {
        out.push_str("<em>");
    }
    if run.marks.underline {
        out.push_str("<u>");
    }

    escape_text_into(out, &run.text);

    if run.marks.underline {
        out.push_str("</u>");
    }
    if run.marks.italic {
        out.push_str("</em>");
    }
    if run.marks.bold {
        out.push_str("</strong>");
    }
    if run.marks.link.is_some() {
        out.push_str("</a>");
    }
}

fn write_image(out: &mut String, v: &VoidNode) {
    let src = v.attrs.get("src").and_then(|x| x.as_str()).unwrap_or("");
    let alt = v.attrs.get("alt").and_then(|x| x.as_str()).unwrap_or("");
    out.push_str("<img src=\"");
    escape_attr_into(out, src);
    out.push_str("\" alt=\"");
    escape_attr_into(out, alt);
    out.push_str("\" />");
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub fn parse_document(html: &str) -> Document {
    let mut parser = Parser::default();
    let mut chars = html.char_indices().peekable();

    while let Some((ix, ch)) = chars.next() {
        if ch != '<' {
            let mut text = String::new();
            text.push(ch);
            while let Some(&(_, next)) = chars.peek() {
                if next == '<' {
                    break;
                }
                text.push(next);
                chars.next();
            }
            parser.text(&decode_entities(&text));
            continue;
        }

        // Comments pass through without affecting state.
        if html[ix..].starts_with("<!--") {
            let mut window = String::new();
            for (_, c) in chars.by_ref() {
                window.push(c);
                if window.ends_with("-->") {
                    break;
                }
            }
            continue;
        }

        let mut raw = String::new();
        for (_, tag_ch) in chars.by_ref() {
            if tag_ch == '>' {
                break;
            }
            raw.push(tag_ch);
        }
        parser.tag(&raw);
    }

    parser.finish()
}

#[derive(Default)]
struct Parser {
    blocks: Vec<Node>,
    open: Option<(String, Attrs)>,
    runs: Vec<Node>,
    bold: u32,
    italic: u32,
    underline: u32,
    links: Vec<String>,
    quote_depth: u32,
    list_stack: Vec<&'static str>,
}

impl Parser {
    fn text(&mut self, text: &str) {
        if text.trim().is_empty() && self.open.is_none() {
            return;
        }
        if self.open.is_none() {
            self.open_block(self.implicit_block_kind(), Attrs::default());
        }
        let marks = self.current_marks();
        if let Some(Node::Text(last)) = self.runs.last_mut() {
            if last.marks == marks {
                last.text.push_str(text);
                return;
            }
        }
        self.runs.push(Node::Text(TextNode::new(text, marks)));
    }

    fn tag(&mut self, raw: &str) {
        let raw = raw.trim();
        let (closing, raw) = match raw.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let raw = raw.strip_suffix('/').unwrap_or(raw).trim();
        let name_end = raw
            .find(|c: char| c.is_whitespace())
            .unwrap_or(raw.len());
        let name = raw[..name_end].to_ascii_lowercase();
        let attr_text = &raw[name_end..];

        match (name.as_str(), closing) {
            ("p" | "div", false) => {
                self.flush_block();
                let attrs = style_attrs(attr_text);
                self.open_block(self.implicit_block_kind(), attrs);
            }
            ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", false) => {
                self.flush_block();
                let level = name[1..].parse::<u64>().unwrap_or(1).clamp(1, 3);
                let mut attrs = style_attrs(attr_text);
                attrs.insert(
                    "level".to_string(),
                    Value::Number(serde_json::Number::from(level)),
                );
                self.open_block("heading".to_string(), attrs);
            }
            ("li", false) => {
                self.flush_block();
                let mut attrs = style_attrs(attr_text);
                let list = self.list_stack.last().copied().unwrap_or("unordered");
                attrs.insert("list".to_string(), Value::String(list.to_string()));
                self.open_block("list_item".to_string(), attrs);
            }
            ("p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li", true) => {
                self.flush_block();
            }
            ("blockquote", false) => {
                self.flush_block();
                self.quote_depth += 1;
            }
            ("blockquote", true) => {
                self.flush_block();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            ("ul", false) => {
                self.flush_block();
                self.list_stack.push("unordered");
            }
            ("ol", false) => {
                self.flush_block();
                self.list_stack.push("ordered");
            }
            ("ul" | "ol", true) => {
                self.flush_block();
                self.list_stack.pop();
            }
            ("strong" | "b", false) => self.bold += 1,
            ("strong" | "b", true) => self.bold = self.bold.saturating_sub(1),
            ("em" | "i", false) => self.italic += 1,
            ("em" | "i", true) => self.italic = self.italic.saturating_sub(1),
            ("u", false) => self.underline += 1,
            ("u", true) => self.underline = self.underline.saturating_sub(1),
            ("a", false) => {
                let href = attr_value(attr_text, "href").unwrap_or_default();
                self.links.push(href);
            }
            ("a", true) => {
                self.links.pop();
            }
            ("img", false) => {
                self.flush_block();
                let mut attrs = Attrs::default();
                attrs.insert(
                    "src".to_string(),
                    Value::String(attr_value(attr_text, "src").unwrap_or_default()),
                );
                attrs.insert(
                    "alt".to_string(),
                    Value::String(attr_value(attr_text, "alt").unwrap_or_default()),
                );
                self.blocks.push(Node::Void(VoidNode::new("image", attrs)));
            }
            ("br", false) => {
                // A line break splits the current block in two.
                if let Some((kind, attrs)) = self.open.clone() {
                    self.flush_block();
                    self.open_block(kind, attrs);
                }
            }
            _ => {}
        }
    }

    fn implicit_block_kind(&self) -> String {
        if !self.list_stack.is_empty() {
            "list_item".to_string()
        } else if self.quote_depth > 0 {
            "quote".to_string()
        } else {
            "paragraph".to_string()
        }
    }

    fn open_block(&mut self, kind: String, mut attrs: Attrs) {
        if kind == "quote" || kind == "paragraph" {
            attrs.remove("level");
            attrs.remove("list");
        }
        self.open = Some((kind, attrs));
        self.runs.clear();
    }

    fn flush_block(&mut self) {
        let Some((kind, attrs)) = self.open.take() else {
            self.runs.clear();
            return;
        };
        let mut children = std::mem::take(&mut self.runs);
        if children.is_empty() {
            children.push(Node::Text(TextNode::empty()));
        }
        self.blocks
            .push(Node::Element(ElementNode::new(kind, attrs, children)));
    }

    fn current_marks(&self) -> Marks {
        Marks {
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: self.underline > 0,
            link: self.links.last().cloned(),
        }
    }

    fn finish(mut self) -> Document {
        self.flush_block();
        if self.blocks.is_empty() {
            self.blocks.push(Node::paragraph(""));
        }
        Document {
            children: self.blocks,
        }
    }
}

fn style_attrs(attr_text: &str) -> Attrs {
    let mut attrs = Attrs::default();
    if let Some(style) = attr_value(attr_text, "style") {
        if let Some(align) = style_align(&style) {
            attrs.insert("align".to_string(), Value::String(align.to_string()));
        }
    }
    attrs
}

fn style_align(style: &str) -> Option<&'static str> {
    for decl in style.split(';') {
        let Some((name, value)) = decl.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("text-align") {
            return match value.trim().to_ascii_lowercase().as_str() {
                "center" => Some("center"),
                "right" => Some("right"),
                _ => None,
            };
        }
    }
    None
}

fn attr_value(attr_text: &str, name: &str) -> Option<String> {
    let lower = attr_text.to_ascii_lowercase();
    let mut search = 0usize;
    loop {
        let pos = lower[search..].find(name)?;
        let start = search + pos;
        // Must be a whole attribute name, not a suffix of another.
        let preceded_ok = start == 0
            || lower[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_whitespace());
        let after = &attr_text[start + name.len()..];
        let after_trimmed = after.trim_start();
        if preceded_ok && after_trimmed.starts_with('=') {
            let value = after_trimmed[1..].trim_start();
            return Some(read_attr_value(value));
        }
        search = start + name.len();
    }
}

fn read_attr_value(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let rest: String = chars.collect();
            let end = rest.find(quote).unwrap_or(rest.len());
            decode_entities(&rest[..end])
        }
        Some(first) => {
            let mut out = String::new();
            out.push(first);
            for ch in chars {
                if ch.is_whitespace() {
                    break;
                }
                out.push(ch);
            }
            decode_entities(&out)
        }
        None => String::new(),
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';').filter(|&e| e <= 12) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" | "#39" => out.push('\''),
            "nbsp" => out.push('\u{a0}'),
            _ => {
                if let Some(code) = entity.strip_prefix('#') {
                    let parsed = if let Some(hex) = code.strip_prefix(['x', 'X']) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        code.parse::<u32>().ok()
                    };
                    match parsed.and_then(char::from_u32) {
                        Some(ch) => out.push(ch),
                        None => out.push_str(&rest[..end + 1]),
                    }
                } else {
                    out.push_str(&rest[..end + 1]);
                }
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
