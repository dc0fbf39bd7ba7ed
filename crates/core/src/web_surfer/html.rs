// HTML to readable text for the browsing agent
//
// A small tag scanner: drops script/style content, turns block elements into
// line breaks, decodes common entities and records hyperlinks so the agent can
// follow them by URL.

/// Readable rendering of an HTML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlPage {
    pub title: Option<String>,
    pub text: String,
    /// (anchor text, href) in document order
    pub links: Vec<(String, String)>,
}

const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "noscript", "iframe", "svg", "template"];

const BLOCK_ELEMENTS: [&str; 17] = [
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "table", "section",
    "article", "header", "footer", "blockquote",
];

/// Convert an HTML document to plain text, collecting title and links
pub fn html_to_page(html: &str) -> HtmlPage {
    let mut page = HtmlPage::default();
    let mut text = String::new();
    let mut tag = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0usize;
    let mut in_title = false;
    let mut title = String::new();
    let mut open_link: Option<(String, usize)> = None;
    let mut chars = html.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '<' {
            in_tag = true;
            tag.clear();
            continue;
        }

        if in_tag {
            if ch != '>' {
                tag.push(ch);
                continue;
            }
            in_tag = false;

            let lowered = tag.to_ascii_lowercase();
            let is_closing = lowered.starts_with('/');
            let name = lowered
                .trim_start_matches('/')
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or("");

            if SKIPPED_ELEMENTS.contains(&name) {
                if is_closing {
                    skip_depth = skip_depth.saturating_sub(1);
                } else {
                    skip_depth += 1;
                }
                continue;
            }

            match name {
                "title" => in_title = !is_closing,
                "a" if !is_closing => {
                    open_link = attribute(&tag, "href").map(|href| (href, text.len()));
                }
                "a" => {
                    if let Some((href, start)) = open_link.take() {
                        let anchor = clean_whitespace(&text[start..]);
                        page.links.push((anchor, href));
                    }
                }
                _ if BLOCK_ELEMENTS.contains(&name) => text.push('\n'),
                _ => {}
            }
            continue;
        }

        if skip_depth > 0 {
            continue;
        }

        let target = if in_title { &mut title } else { &mut text };
        if ch == '&' {
            let mut entity = String::from('&');
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() || next == '<' || entity.len() > 10 {
                    break;
                }
                entity.push(next);
                chars.next();
                if next == ';' {
                    break;
                }
            }
            target.push_str(&decode_entity(&entity));
        } else {
            target.push(ch);
        }
    }

    let title = clean_whitespace(&title);
    page.title = if title.is_empty() { None } else { Some(title) };
    page.text = clean_whitespace(&text);
    page
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let lowered = tag.to_ascii_lowercase();
    let start = lowered.find(&format!("{}=", name))? + name.len() + 1;
    let rest = &tag[start..];

    let value = match rest.chars().next()? {
        quote @ ('"' | '\'') => rest[1..].split(quote).next()?,
        _ => rest.split(|c: char| c.is_whitespace() || c == '>').next()?,
    };
    if value.is_empty() {
        None
    } else {
        Some(decode_entities(value))
    }
}

fn decode_entities(value: &str) -> String {
    value.replace("&amp;", "&")
}

fn decode_entity(entity: &str) -> String {
    match entity {
        "&amp;" => "&".to_string(),
        "&lt;" => "<".to_string(),
        "&gt;" => ">".to_string(),
        "&quot;" => "\"".to_string(),
        "&apos;" | "&#39;" => "'".to_string(),
        "&nbsp;" => " ".to_string(),
        "&mdash;" => "\u{2014}".to_string(),
        "&ndash;" => "\u{2013}".to_string(),
        "&copy;" => "(c)".to_string(),
        _ => numeric_entity(entity).unwrap_or_else(|| entity.to_string()),
    }
}

fn numeric_entity(entity: &str) -> Option<String> {
    let body = entity.strip_prefix("&#")?.strip_suffix(';')?;
    let hex = body.strip_prefix('x').or_else(|| body.strip_prefix('X'));
    let code = match hex {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => body.parse().ok()?,
    };
    char::from_u32(code).map(String::from)
}

/// Collapse runs of spaces and keep at most one blank line
pub fn clean_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;
    let mut newline_count = 0;

    for ch in text.chars() {
        if ch == '\n' {
            newline_count += 1;
            prev_was_space = false;
            if newline_count <= 2 {
                // Drop trailing spaces before the break
                while result.ends_with(' ') {
                    result.pop();
                }
                result.push('\n');
            }
        } else if ch.is_whitespace() {
            if !prev_was_space && newline_count == 0 {
                result.push(' ');
            }
            prev_was_space = true;
        } else {
            result.push(ch);
            prev_was_space = false;
            newline_count = 0;
        }
    }

    result.trim().to_string()
}
