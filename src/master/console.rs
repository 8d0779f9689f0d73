//! Minimal operator console served at `/`.
//!
//! Server-rendered snapshot of the cluster: the stat row mirrors `/stats`
//! plus the under-replication count, and each known blob links to its
//! download/play endpoints. Anything administrative (upload, delete) is done
//! against the API with the admin secret.

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::Html;

use super::MasterNode;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8"><title>MDFS Console</title>
<style>
body{font-family:sans-serif;background:#f8f9fa;margin:2rem auto;max-width:60rem;color:#212529}
h1{font-size:1.4rem}
table{border-collapse:collapse;width:100%;background:#fff}
td,th{border-bottom:1px solid #dee2e6;padding:6px 10px;text-align:left}
.stats{display:flex;gap:2.5rem;margin:1rem 0}
.stat b{font-size:1.6rem;display:block}
.stat span{color:#6c757d;font-size:.85rem}
.low{color:#dc3545}
a{margin-right:.6rem}
</style>
</head>
<body>
<h1>MDFS Console</h1>
"#;

const PAGE_TAIL: &str = "</body></html>\n";

pub async fn handle_index(Extension(master): Extension<Arc<MasterNode>>) -> Html<String> {
    let (stats, under_replicated, mut files) = {
        let state = master.state.read().await;
        let files: Vec<(String, usize)> = state
            .file_index
            .iter()
            .map(|(name, replicas)| (name.clone(), replicas.len()))
            .collect();
        (
            state.stats(),
            state.under_replicated(master.config.replicas),
            files,
        )
    };
    files.sort();

    let mut page = String::from(PAGE_HEAD);
    page.push_str(&format!(
        "<div class=\"stats\">\
         <div class=\"stat\"><b>{}</b><span>active nodes</span></div>\
         <div class=\"stat\"><b>{}</b><span>files</span></div>\
         <div class=\"stat\"><b class=\"{}\">{}</b><span>under-replicated</span></div>\
         <div class=\"stat\"><b>{}</b><span>ring positions</span></div>\
         </div>\n",
        stats.active_nodes,
        stats.total_files,
        if under_replicated > 0 { "low" } else { "" },
        under_replicated,
        stats.ring_size,
    ));

    page.push_str("<table><thead><tr><th>name</th><th>replicas</th><th></th></tr></thead><tbody>\n");
    for (name, replicas) in &files {
        let encoded = urlencoding::encode(name);
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}/{}</td>\
             <td><a href=\"/download?name={}\">download</a>\
             <a href=\"/play?name={}\">play</a></td></tr>\n",
            escape(name),
            replicas,
            master.config.replicas,
            encoded,
            encoded,
        ));
    }
    page.push_str("</tbody></table>\n");
    page.push_str(PAGE_TAIL);

    Html(page)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
