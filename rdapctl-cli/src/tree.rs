//! Recursive flush of the RDAP graph reachable from a seed object.
//!
//! Nodes are keyed `kind:key` (lower-cased); edges record which relation
//! produced a fetch. Depth is bounded and every object is visited once.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use rdapctl_core::types::Link;
use rdapctl_core::{Client, RdapObject};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Default, Serialize)]
pub struct Graph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: &'static str,
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub rel: String,
}

/// Walks every object reachable from `seed` and returns the consolidated
/// graph.
pub async fn flush(
    client: &Client,
    seed: RdapObject,
    max_depth: usize,
    follow_links: bool,
) -> Graph {
    let mut graph = Graph::default();
    let mut seen = HashSet::new();
    walk(client, seed, 0, max_depth, follow_links, &mut seen, &mut graph).await;
    graph
}

fn identity(object: &RdapObject) -> (&'static str, String) {
    match object {
        RdapObject::Domain(d) => ("domain", d.ldh_name.clone().unwrap_or_default()),
        RdapObject::Nameserver(n) => ("nameserver", n.ldh_name.clone().unwrap_or_default()),
        RdapObject::Entity(e) => ("entity", e.common.handle.clone().unwrap_or_default()),
        RdapObject::IpNetwork(n) => ("ip-network", n.common.handle.clone().unwrap_or_default()),
        RdapObject::Autnum(a) => ("autnum", a.common.handle.clone().unwrap_or_default()),
    }
}

fn node_id(kind: &str, key: &str) -> String {
    format!("{}:{}", kind, key.to_ascii_lowercase())
}

fn add_node(graph: &mut Graph, id: &str, kind: &'static str, object: &RdapObject) {
    if graph.nodes.contains_key(id) {
        return;
    }
    let data = serde_json::to_value(object).unwrap_or(Value::Null);
    graph.nodes.insert(
        id.to_string(),
        GraphNode {
            id: id.to_string(),
            kind,
            data,
        },
    );
}

fn add_edge(graph: &mut Graph, from: &str, to: &str, rel: &str) {
    graph.edges.push(GraphEdge {
        from: from.to_string(),
        to: to.to_string(),
        rel: rel.to_string(),
    });
}

/// Path portion of an absolute or relative URL.
fn url_path(href: &str) -> &str {
    let rest = href
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(href);
    match rest.find('/') {
        Some(i) => &rest[i..],
        None => "",
    }
}

fn walk<'a>(
    client: &'a Client,
    object: RdapObject,
    depth: usize,
    max_depth: usize,
    follow_links: bool,
    seen: &'a mut HashSet<String>,
    graph: &'a mut Graph,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        if depth > max_depth {
            return;
        }
        let (kind, key) = identity(&object);
        let id = node_id(kind, &key);
        if !seen.insert(id.clone()) {
            return;
        }
        add_node(graph, &id, kind, &object);

        let links = links_of(&object);

        match &object {
            RdapObject::Domain(domain) => {
                let nameservers: Vec<String> = domain
                    .nameservers
                    .iter()
                    .filter_map(|n| n.ldh_name.clone())
                    .collect();
                for name in nameservers {
                    if let Ok(full) = client.nameserver(&name).await {
                        let child = RdapObject::Nameserver(full);
                        descend(client, &id, "nameserver", child, depth, max_depth, follow_links, &mut *seen, &mut *graph).await;
                    }
                }
                walk_entity_children(client, &id, &object, depth, max_depth, follow_links, &mut *seen, &mut *graph).await;
            }
            RdapObject::Entity(entity) => {
                let autnums: Vec<String> = entity
                    .autnums
                    .iter()
                    .filter_map(|a| a.common.handle.clone())
                    .collect();
                for handle in autnums {
                    if let Ok(full) = client.autnum(&handle).await {
                        let child = RdapObject::Autnum(full);
                        descend(client, &id, "autnum", child, depth, max_depth, follow_links, &mut *seen, &mut *graph).await;
                    }
                }
                let networks: Vec<String> = entity
                    .networks
                    .iter()
                    .filter_map(|n| n.common.handle.clone())
                    .collect();
                for handle in networks {
                    if let Ok(full) = client.ip(&handle).await {
                        let child = RdapObject::IpNetwork(full);
                        descend(client, &id, "network", child, depth, max_depth, follow_links, &mut *seen, &mut *graph).await;
                    }
                }
            }
            _ => {
                walk_entity_children(client, &id, &object, depth, max_depth, follow_links, &mut *seen, &mut *graph).await;
            }
        }

        if follow_links {
            for link in links {
                let Some(href) = link.href.as_deref() else {
                    continue;
                };
                let path = url_path(href).to_ascii_lowercase();
                let Some(tail) = path.rsplit('/').next().filter(|t| !t.is_empty()) else {
                    continue;
                };
                let fetched = if path.contains("/domain/") {
                    client.domain(tail).await.ok().map(RdapObject::Domain)
                } else if path.contains("/nameserver/") {
                    client.nameserver(tail).await.ok().map(RdapObject::Nameserver)
                } else if path.contains("/entity/") {
                    client.entity(tail, "").await.ok().map(RdapObject::Entity)
                } else if path.contains("/autnum/") {
                    client.autnum(tail).await.ok().map(RdapObject::Autnum)
                } else if path.contains("/ip/") {
                    client.ip(tail).await.ok().map(RdapObject::IpNetwork)
                } else {
                    None
                };
                if let Some(child) = fetched {
                    let (child_kind, _) = identity(&child);
                    let rel = format!("link:{}", link.rel.as_deref().unwrap_or(child_kind));
                    descend(client, &id, &rel, child, depth, max_depth, true, &mut *seen, &mut *graph).await;
                }
            }
        }
    })
}

fn links_of(object: &RdapObject) -> Vec<Link> {
    match object {
        RdapObject::Domain(d) => d.common.links.clone(),
        RdapObject::Nameserver(n) => n.common.links.clone(),
        RdapObject::Entity(e) => e.common.links.clone(),
        RdapObject::IpNetwork(n) => n.common.links.clone(),
        RdapObject::Autnum(a) => a.common.links.clone(),
    }
}

/// Records the edge to `child` and recurses into it.
#[allow(clippy::too_many_arguments)]
async fn descend(
    client: &Client,
    from: &str,
    rel: &str,
    child: RdapObject,
    depth: usize,
    max_depth: usize,
    follow_links: bool,
    seen: &mut HashSet<String>,
    graph: &mut Graph,
) {
    let (kind, key) = identity(&child);
    add_edge(graph, from, &node_id(kind, &key), rel);
    walk(client, child, depth + 1, max_depth, follow_links, seen, graph).await;
}

/// Fetches and recurses into the entities attached to `object`.
#[allow(clippy::too_many_arguments)]
async fn walk_entity_children(
    client: &Client,
    from: &str,
    object: &RdapObject,
    depth: usize,
    max_depth: usize,
    follow_links: bool,
    seen: &mut HashSet<String>,
    graph: &mut Graph,
) {
    let handles: Vec<String> = match object {
        RdapObject::Domain(d) => &d.common.entities,
        RdapObject::Nameserver(n) => &n.common.entities,
        RdapObject::Entity(e) => &e.common.entities,
        RdapObject::IpNetwork(n) => &n.common.entities,
        RdapObject::Autnum(a) => &a.common.entities,
    }
    .iter()
    .filter_map(|e| e.common.handle.clone())
    .collect();

    for handle in handles {
        if let Ok(full) = client.entity(&handle, "").await {
            let child = RdapObject::Entity(full);
            descend(client, from, "entity", child, depth, max_depth, follow_links, &mut *seen, &mut *graph).await;
        }
    }
}

const KIND_ORDER: [&str; 5] = ["domain", "nameserver", "entity", "ip-network", "autnum"];

/// Plain-text rendering: nodes grouped by kind, outward edges indented.
pub fn print_text(seed: &str, max_depth: usize, follow_links: bool, graph: &Graph) {
    println!("\n=== TREE: {seed} (max-depth={max_depth} follow-links={follow_links}) ===");
    for kind in KIND_ORDER {
        let nodes: Vec<_> = graph.nodes.values().filter(|n| n.kind == kind).collect();
        if nodes.is_empty() {
            continue;
        }
        println!("\n[{}]", kind.to_uppercase());
        for node in nodes {
            println!("- {}", node.id);
            for edge in &graph.edges {
                if edge.from == node.id {
                    println!("    -> {} ({})", edge.to, edge.rel);
                }
            }
        }
    }
}
