//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde::Serialize;
use yams_protocol::envelope::*;
use yams_client::DaemonClient;

/// Executes a command and returns the formatted output.
pub async fn execute(
    client: &DaemonClient,
    cmd: Commands,
    json: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Ping => {
            let result = client.ping().await?;
            if json {
                return format_json(&result);
            }
            match result.server_time_ms {
                Some(ms) => Ok(format!("{} (server time: {} ms)", "PONG".green(), ms)),
                None => Ok("PONG".green().to_string()),
            }
        }

        Commands::Status { detailed } => {
            let status = client.status(detailed).await?;
            if json {
                return format_json(&status);
            }
            Ok(format_status(&status))
        }

        Commands::Search {
            query,
            limit,
            fuzzy,
            tags,
        } => {
            let request = SearchRequest {
                query,
                limit,
                fuzzy,
                tags,
                ..Default::default()
            };
            let result = client.search(request).await?;
            if json {
                return format_json(&result);
            }

            if result.results.is_empty() {
                return Ok("No results".yellow().to_string());
            }

            let mut output = String::new();
            for hit in &result.results {
                let title = first_non_empty(&[&hit.title, &hit.path, &hit.id]);
                output.push_str(&format!("{:.3}  {}\n", hit.score, title.cyan()));
                if !hit.snippet.is_empty() {
                    output.push_str(&format!("       {}\n", hit.snippet.dimmed()));
                }
            }
            output.push_str(&format!(
                "{} of {} results ({} ms)",
                result.results.len(),
                result.total_count,
                result.elapsed_ms
            ));
            Ok(output)
        }

        Commands::List {
            limit,
            offset,
            pattern,
            recent,
        } => {
            let request = ListRequest {
                limit,
                offset,
                pattern,
                recent_first: recent,
                ..Default::default()
            };
            let result = client.list(request).await?;
            if json {
                return format_json(&result);
            }

            if result.items.is_empty() {
                return Ok("No documents".yellow().to_string());
            }

            let mut output = String::new();
            for item in &result.items {
                let name = first_non_empty(&[&item.name, &item.path]);
                output.push_str(&format!(
                    "  {}  {}  {}",
                    short_hash(&item.hash).yellow(),
                    name.cyan(),
                    format_bytes(item.size)
                ));
                if !item.tags.is_empty() {
                    output.push_str(&format!("  [{}]", item.tags.join(", ")));
                }
                output.push('\n');
            }
            output.push_str(&format!(
                "{} of {} documents",
                result.items.len(),
                result.total_count
            ));
            Ok(output)
        }

        Commands::Cat { hash, name } => {
            let result = client.cat(CatRequest { hash, name }).await?;
            if json {
                return format_json(&result);
            }
            Ok(result.content)
        }

        Commands::Grep {
            pattern,
            paths,
            ignore_case,
            context,
            max_matches,
        } => {
            let request = GrepRequest {
                pattern,
                paths,
                ignore_case,
                context_lines: context,
                max_matches,
            };
            let result = client.grep(request).await?;
            if json {
                return format_json(&result);
            }

            if result.matches.is_empty() {
                return Ok("No matches".yellow().to_string());
            }

            let mut output = String::new();
            for m in &result.matches {
                for line in &m.context_before {
                    output.push_str(&format!("{}-  {}\n", m.file.dimmed(), line.dimmed()));
                }
                output.push_str(&format!(
                    "{}:{}: {}\n",
                    m.file.cyan(),
                    m.line_number.to_string().yellow(),
                    m.line
                ));
                for line in &m.context_after {
                    output.push_str(&format!("{}-  {}\n", m.file.dimmed(), line.dimmed()));
                }
            }
            output.push_str(&format!(
                "{} matches in {} files",
                result.total_matches, result.files_searched
            ));
            Ok(output)
        }

        Commands::Add {
            path,
            tags,
            name,
            recursive,
        } => {
            let path = std::fs::canonicalize(&path)?;
            let request = AddDocumentRequest {
                path: Some(path.to_string_lossy().into_owned()),
                name,
                tags,
                recursive,
                ..Default::default()
            };
            let result = client.add_document(request).await?;
            if json {
                return format_json(&result);
            }

            Ok(format!(
                "{} {} ({})\n  Hash: {}\n  Documents added: {}",
                "Added".green(),
                result.path.cyan(),
                format_bytes(result.size),
                result.hash.yellow(),
                result.documents_added
            ))
        }

        Commands::Update {
            hash,
            tags,
            remove_tags,
            content,
        } => {
            let content = content.map(|c| read_text_arg(&c)).transpose()?;
            let request = UpdateDocumentRequest {
                hash: Some(hash),
                content,
                add_tags: tags,
                remove_tags,
                ..Default::default()
            };
            let result = client.update_document(request).await?;
            if json {
                return format_json(&result);
            }

            let mut changed = Vec::new();
            if result.content_updated {
                changed.push("content");
            }
            if result.tags_updated {
                changed.push("tags");
            }
            if result.metadata_updated {
                changed.push("metadata");
            }

            if changed.is_empty() {
                Ok(format!(
                    "{}: {} unchanged",
                    "Warning".yellow(),
                    result.hash.cyan()
                ))
            } else {
                Ok(format!(
                    "{} {} ({})",
                    "Updated".green(),
                    result.hash.cyan(),
                    changed.join(", ")
                ))
            }
        }

        Commands::Graph { hash, depth, limit } => {
            let request = GraphQueryRequest {
                document_hash: Some(hash),
                max_depth: depth,
                limit,
                ..Default::default()
            };
            let result = client.graph_query(request).await?;
            if json {
                return format_json(&result);
            }
            Ok(format_graph(&result))
        }

        Commands::Session { name } => {
            let result = client.switch_session(name).await?;
            if json {
                return format_json(&result);
            }

            match result.previous {
                Some(previous) => Ok(format!(
                    "{} session {} (was {})",
                    "Switched to".green(),
                    result.name.cyan(),
                    previous
                )),
                None => Ok(format!(
                    "{} session {}",
                    "Switched to".green(),
                    result.name.cyan()
                )),
            }
        }
    }
}

fn format_status(status: &StatusResponse) -> String {
    let flag = |on: bool| if on { "yes".green() } else { "no".red() };

    let mut output = format!(
        "{}\n  Running: {}\n  Ready: {}\n  Uptime: {}\n  Requests: {}\n  Connections: {}\n  Memory: {:.1} MB\n  CPU: {:.1}%",
        format!("YAMS daemon {}", status.version).bold(),
        flag(status.running),
        flag(status.ready),
        format_duration(status.uptime_seconds),
        status.requests_processed,
        status.active_connections,
        status.memory_usage_mb,
        status.cpu_usage_percent
    );

    if !status.details.is_empty() {
        let details = serde_json::to_string_pretty(&status.details)
            .unwrap_or_else(|_| format!("{:?}", status.details));
        output.push_str(&format!("\n{}\n{}", "Details".bold(), details));
    }
    output
}

fn format_graph(graph: &GraphQueryResponse) -> String {
    let mut output = String::new();
    if let Some(origin) = &graph.origin {
        output.push_str(&format!(
            "{}\n",
            first_non_empty(&[&origin.label, &origin.id]).bold()
        ));
    }

    if graph.connected_nodes.is_empty() {
        output.push_str(&"No related documents".yellow().to_string());
        return output;
    }

    for node in &graph.connected_nodes {
        output.push_str(&format!(
            "  [{}] {}",
            node.distance,
            first_non_empty(&[&node.label, &node.id]).cyan()
        ));
        if !node.kind.is_empty() {
            output.push_str(&format!(" ({})", node.kind));
        }
        output.push('\n');
    }
    output.push_str(&format!(
        "{} nodes found, depth {}",
        graph.total_nodes_found, graph.max_depth_reached
    ));
    output
}

fn first_non_empty<'a>(candidates: &[&'a String]) -> &'a str {
    candidates
        .iter()
        .find(|s| !s.is_empty())
        .map(|s| s.as_str())
        .unwrap_or("?")
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Formats bytes as human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn format_duration(seconds: u64) -> String {
    let (days, rem) = (seconds / 86_400, seconds % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Reads a text argument (either inline or @file).
fn read_text_arg(arg: &str) -> Result<String, std::io::Error> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path),
        None => Ok(arg.to_string()),
    }
}

/// Formats a response as pretty JSON.
fn format_json<T: Serialize>(value: &T) -> Result<String, Box<dyn std::error::Error>> {
    Ok(serde_json::to_string_pretty(value)?)
}
