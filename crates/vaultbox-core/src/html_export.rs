//! Render a secret tree as nested HTML lists linking into the Vault web UI.

use crate::error::VaultError;
use crate::path::encode_request_path;
use crate::secret::{SecretNode, SecretTree};

/// Web UI address of a tree entry: `list` view for directories, `show` view
/// for secrets.
pub fn ui_link(base_url: &str, engine: &str, path: &str) -> String {
    let view = if crate::path::is_directory(path) {
        "list"
    } else {
        "show"
    };
    format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        encode_request_path(&format!("/ui/vault/secrets/{engine}/{view}/{path}"))
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Render `nodes` (in [`SecretTree::recursive_list`] order) as nested
/// `<ul>` lists, one line per tag.
///
/// A deeper node opens one list, a shallower node closes as many lists as it
/// climbs levels, and every list still open is closed at the end.
pub fn render(nodes: &[SecretNode], base_url: &str, engine: &str) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut open = 0usize;
    for node in nodes {
        if node.depth > depth {
            out.push_str("<ul>\n");
            open += 1;
        } else if node.depth < depth {
            let climb = (depth - node.depth).min(open);
            for _ in 0..climb {
                out.push_str("</ul>\n");
            }
            open -= climb;
        }
        depth = node.depth;
        let href = escape(&ui_link(base_url, engine, &node.path));
        out.push_str(&format!(
            "<li><a href=\"{href}\">{}</a></li>\n",
            escape(&node.path)
        ));
    }
    for _ in 0..open {
        out.push_str("</ul>\n");
    }
    out
}

/// Walk `path` below `engine` and render it.
pub async fn export(tree: &SecretTree<'_>, engine: &str, path: &str) -> Result<String, VaultError> {
    let nodes = tree.recursive_list(engine, path).await?;
    Ok(render(&nodes, tree.base_url(), engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(paths: &[&str]) -> Vec<SecretNode> {
        paths.iter().map(|p| SecretNode::new(p.to_string())).collect()
    }

    #[test]
    fn links_distinguish_directories_from_secrets() {
        assert_eq!(
            ui_link("https://vault.example.com/", "kv", "team/"),
            "https://vault.example.com/ui/vault/secrets/kv/list/team/"
        );
        assert_eq!(
            ui_link("https://vault.example.com", "kv", "team/db pass"),
            "https://vault.example.com/ui/vault/secrets/kv/show/team/db%20pass"
        );
        assert_eq!(
            ui_link("https://vault.example.com", "kv", "team/vpn #1"),
            "https://vault.example.com/ui/vault/secrets/kv/show/team/vpn%20%231"
        );
    }

    #[test]
    fn nesting_follows_depth() {
        let html = render(
            &nodes(&["app/", "app/db", "app/web/", "app/web/tls", "top"]),
            "https://v",
            "kv",
        );
        let tags: Vec<&str> = html
            .lines()
            .map(|l| if l.starts_with("<li>") { "li" } else { l })
            .collect();
        assert_eq!(
            tags,
            vec![
                "<ul>", "li", "<ul>", "li", "li", "<ul>", "li", "</ul>", "</ul>", "li", "</ul>"
            ]
        );
    }

    #[test]
    fn every_opened_list_is_closed() {
        let html = render(&nodes(&["a/", "a/b/", "a/b/c/", "a/b/c/d"]), "https://v", "kv");
        assert_eq!(html.matches("<ul>").count(), html.matches("</ul>").count());
        assert!(html.ends_with("</ul>\n"));
    }

    #[test]
    fn link_text_is_escaped() {
        let html = render(&nodes(&["<script>&"]), "https://v", "kv");
        assert!(html.contains(">&lt;script&gt;&amp;</a>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn empty_tree_renders_nothing() {
        assert!(render(&[], "https://v", "kv").is_empty());
    }
}
