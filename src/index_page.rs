//! Discovery page served on a routing miss when the index policy is active.

/// Renders one link per routable name, in the order given.
///
/// `domain_suffix` is appended to every name (empty for bare names).
pub fn render<I, S>(names: I, domain_suffix: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<String> = names
        .into_iter()
        .map(|name| {
            let domain = escape(&format!("{}{}", name.as_ref(), domain_suffix));
            format!(
                "\t\t<li><a href=\"{}\" target=\"_blank\">{}</a></li>",
                domain, domain
            )
        })
        .collect();

    let mut html = String::from("<html>\n<body>\n");
    if items.is_empty() {
        html.push_str("\t<h1>No Container running</h1>\n");
    } else {
        html.push_str("\t<ul>\n");
        html.push_str(&items.join("\n"));
        html.push_str("\n\t</ul>\n");
    }
    html.push_str("</body>\n</html>");
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_entry_with_suffix() {
        let html = render(["web"], ".test.com");
        assert_eq!(html.matches("<li>").count(), 1);
        assert!(html.contains(
            r#"<li><a href="web.test.com" target="_blank">web.test.com</a></li>"#
        ));
    }

    #[test]
    fn test_exact_layout() {
        let html = render(["api", "web"], "");
        assert_eq!(
            html,
            "<html>\n<body>\n\t<ul>\n\
             \t\t<li><a href=\"api\" target=\"_blank\">api</a></li>\n\
             \t\t<li><a href=\"web\" target=\"_blank\">web</a></li>\n\
             \t</ul>\n</body>\n</html>"
        );
    }

    #[test]
    fn test_empty_table() {
        let html = render(Vec::<String>::new(), ".test.com");
        assert_eq!(
            html,
            "<html>\n<body>\n\t<h1>No Container running</h1>\n</body>\n</html>"
        );
    }

    #[test]
    fn test_names_are_escaped() {
        let html = render(["a<b>"], "");
        assert!(html.contains("a&lt;b&gt;"));
        assert!(!html.contains("a<b>"));
    }
}
