use crate::cli::GraphArgs;
use crate::config::PartialConfig;
use crate::error::{CliError, Result};
use crate::records;
use graphite::core::analysis::order::steinhardt;
use graphite::core::models::graph::Graph;
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
struct GraphSummary {
    label: String,
    atoms: usize,
    edges: usize,
    self_image_edges: usize,
    mean_degree: f64,
    max_degree: usize,
    /// Mean `(q_l, w_l)` over the atoms.
    mean_order: Option<(f64, f64)>,
}

impl GraphSummary {
    fn new(label: String, graph: &Graph, order: Option<u32>) -> Self {
        let mean_order = order.map(|l| {
            let orders = steinhardt(graph, l, false);
            let count = orders.len().max(1) as f64;
            let (q, w) = orders
                .iter()
                .fold((0.0, 0.0), |(q, w), o| (q + o.q, w + o.w));
            (q / count, w / count)
        });
        Self {
            label,
            atoms: graph.num_nodes(),
            edges: graph.num_edges(),
            self_image_edges: graph.edges().iter().filter(|e| e.is_self_image()).count(),
            mean_degree: graph.mean_degree(),
            max_degree: graph.in_degrees().into_iter().max().unwrap_or(0),
            mean_order,
        }
    }
}

#[derive(Serialize)]
struct EdgeRow<'a> {
    structure: &'a str,
    source: usize,
    target: usize,
    shift_a: i32,
    shift_b: i32,
    shift_c: i32,
    distance: f64,
}

pub async fn run(args: GraphArgs) -> Result<()> {
    let config = PartialConfig::load(&args.config)?;
    let builder = config
        .graph_config()?
        .neighbor_builder()
        .map_err(|e| CliError::Config(e.to_string()))?;

    info!("Loading input structures from {:?}", &args.input);
    let structures = records::read_structures(&args.input)?;
    let labelled: Vec<(String, Graph)> = tokio::task::block_in_place(|| {
        structures
            .iter()
            .enumerate()
            .map(|(idx, (id, structure))| {
                let label = id.clone().unwrap_or_else(|| idx.to_string());
                (label, builder.build(structure))
            })
            .collect()
    });

    println!(
        "{:<16} {:>8} {:>10} {:>12} {:>10} {:>8}{}",
        "structure",
        "atoms",
        "edges",
        "self-images",
        "mean-deg",
        "max-deg",
        args.order
            .map(|l| format!(" {:>10} {:>10}", format!("mean-q{l}"), format!("mean-w{l}")))
            .unwrap_or_default()
    );
    for (label, graph) in &labelled {
        let summary = GraphSummary::new(label.clone(), graph, args.order);
        println!(
            "{:<16} {:>8} {:>10} {:>12} {:>10.3} {:>8}{}",
            summary.label,
            summary.atoms,
            summary.edges,
            summary.self_image_edges,
            summary.mean_degree,
            summary.max_degree,
            summary
                .mean_order
                .map(|(q, w)| format!(" {q:>10.5} {w:>10.5}"))
                .unwrap_or_default()
        );
    }

    if let Some(path) = &args.edges {
        let rows = write_edges(path, &labelled)?;
        println!("✓ {} edge(s) written to: {}", rows, path.display());
    }
    Ok(())
}

fn write_edges(path: &Path, graphs: &[(String, Graph)]) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for (label, graph) in graphs {
        for (edge, vector) in graph.edges().iter().zip(graph.edge_vectors()) {
            writer.serialize(EdgeRow {
                structure: label,
                source: edge.source,
                target: edge.target,
                shift_a: edge.shift[0],
                shift_b: edge.shift[1],
                shift_c: edge.shift[2],
                distance: vector.norm(),
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    info!("Wrote {} edge rows to {:?}", rows, path);
    Ok(rows)
}
