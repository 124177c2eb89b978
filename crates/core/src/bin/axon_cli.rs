//! CLI client for the `axond` daemon.
//!
//! Examples:
//!   axon-cli status
//!   axon-cli topology 0.1 50
//!   axon-cli infer 0 1 2 3 4
//!   axon-cli sparsity 0 1 2 3
//!   axon-cli attention 10 0 1 2 3
//!   axon-cli solve bfs '[[2,0,1],[0,0,0],[1,0,3]]'
//!   axon-cli shutdown
//!
//! By default it talks to 127.0.0.1:9898; override with `--addr host:port`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read as _, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    Status,
    GetConfig,
    Topology {
        threshold: f32,
        top_k_nodes: Option<usize>,
    },
    Infer {
        tokens: Vec<u32>,
    },
    Sparsity {
        tokens: Vec<u32>,
    },
    LayerStats {
        tokens: Vec<u32>,
    },
    Attention {
        tokens: Vec<u32>,
        top_k: usize,
    },
    Concepts {
        tokens: Vec<u32>,
        threshold: f32,
    },
    Pathfind {
        board: Vec<Vec<u8>>,
        policy: String,
        max_steps: u32,
    },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ModelConfigWire {
    #[serde(default)]
    vocab: usize,
    #[serde(default)]
    seq_len: usize,
    #[serde(default)]
    heads: usize,
    #[serde(default)]
    neurons: usize,
    #[serde(default)]
    latent: usize,
    #[serde(default)]
    layers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeWire {
    id: u32,
    degree: u32,
    in_degree: u32,
    out_degree: u32,
    is_hub: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeWire {
    source: u32,
    target: u32,
    weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct MetricsWire {
    #[serde(default)]
    num_nodes: usize,
    #[serde(default)]
    num_edges: usize,
    #[serde(default)]
    avg_degree: f32,
    #[serde(default)]
    max_degree: u32,
    #[serde(default)]
    min_degree: u32,
    #[serde(default)]
    std_degree: f32,
    #[serde(default)]
    modularity: f32,
    #[serde(default)]
    num_communities: usize,
    #[serde(default)]
    hub_threshold: f32,
    #[serde(default)]
    num_hubs: usize,
    #[serde(default)]
    hubs: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ProfileWire {
    #[serde(default)]
    per_layer: Vec<f32>,
    #[serde(default)]
    mean: f32,
    #[serde(default)]
    std: f32,
    #[serde(default)]
    min: f32,
    #[serde(default)]
    max: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StreamStatsWire {
    #[serde(default)]
    mean: f32,
    #[serde(default)]
    std: f32,
    #[serde(default)]
    max: f32,
    #[serde(default)]
    min: f32,
    #[serde(default)]
    sparsity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayerStatsWire {
    layer: usize,
    #[serde(default)]
    primary: StreamStatsWire,
    #[serde(default)]
    secondary: StreamStatsWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AttentionEdgeWire {
    source: usize,
    target: usize,
    weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConceptWire {
    neuron_id: u32,
    avg_activation: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CoordWire {
    row: u32,
    col: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReportWire {
    outcome: String,
    #[serde(default)]
    path: Option<Vec<CoordWire>>,
    #[serde(default)]
    steps: u32,
    #[serde(default)]
    visited: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    Status {
        model: ModelConfigWire,
        model_seed: u64,
        solver_heads: usize,
        uptime_secs: u64,
    },
    Config {
        listen_addr: String,
        model_seed: u64,
        model: ModelConfigWire,
    },
    Topology {
        nodes: Vec<NodeWire>,
        edges: Vec<EdgeWire>,
        metrics: MetricsWire,
    },
    Infer {
        predictions: Vec<usize>,
    },
    Sparsity {
        primary: ProfileWire,
        #[serde(default)]
        secondary: Option<ProfileWire>,
    },
    LayerStats {
        layers: Vec<LayerStatsWire>,
    },
    Attention {
        #[serde(default)]
        top_edges_per_layer: Vec<Vec<AttentionEdgeWire>>,
        #[serde(default)]
        mean_per_layer: Vec<f32>,
    },
    Concepts {
        concepts: BTreeMap<u32, Vec<ConceptWire>>,
    },
    Path {
        policy: String,
        report: ReportWire,
        board: Vec<Vec<u8>>,
    },
    Success {
        message: String,
    },
    Error {
        message: String,
    },
}

fn usage() -> ! {
    eprintln!("axon-cli (talks to axond @ 127.0.0.1:9898 by default)");
    eprintln!("Usage: axon-cli [--addr host:port] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                          Show daemon and model state");
    eprintln!("  config                          Show daemon configuration");
    eprintln!("  topology [threshold] [top_k]    Extract the connectivity graph");
    eprintln!("  infer <token...>                Predictions for a token sequence");
    eprintln!("  sparsity <token...>             Activation sparsity profile");
    eprintln!("  layers <token...>               Per-layer stream statistics");
    eprintln!("  attention <top_k> <token...>    Top attention edges per layer");
    eprintln!("  concepts <threshold> <token...> Concept-neuron map");
    eprintln!("  solve <bfs|cells|directions> <board-json|->");
    eprintln!("                                  Solve a maze; '-' reads the board");
    eprintln!("                                  JSON (e.g. [[2,0],[0,3]]) from stdin");
    eprintln!("  shutdown                        Stop the daemon");
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = "127.0.0.1:9898".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    if args.is_empty() {
        usage();
    }

    (addr, args)
}

fn make_error(msg: &str) -> ! {
    eprintln!("{}", msg);
    process::exit(1);
}

fn parse_tokens(args: &[String]) -> Vec<u32> {
    if args.is_empty() {
        usage();
    }
    args.iter()
        .map(|a| {
            a.parse::<u32>()
                .unwrap_or_else(|_| make_error(&format!("'{a}' is not a token id")))
        })
        .collect()
}

fn read_board(arg: &str) -> Vec<Vec<u8>> {
    let raw = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| make_error(&format!("stdin: {e}")));
        buf
    } else {
        arg.to_string()
    };
    serde_json::from_str(&raw)
        .unwrap_or_else(|e| make_error(&format!("board must be a JSON grid of cell codes: {e}")))
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn print_topology(nodes: &[NodeWire], edges: &[EdgeWire], m: &MetricsWire) {
    println!(
        "graph: nodes={} edges={} avg_deg={:.2} max_deg={} min_deg={} std_deg={:.2}",
        m.num_nodes, m.num_edges, m.avg_degree, m.max_degree, m.min_degree, m.std_degree
    );
    println!(
        "communities: count={} modularity={:.4}",
        m.num_communities, m.modularity
    );
    let shown: Vec<String> = m.hubs.iter().take(12).map(|h| h.to_string()).collect();
    let suffix = if m.hubs.len() > 12 { ", ..." } else { "" };
    println!(
        "hubs: count={} threshold={:.1} [{}{}]",
        m.num_hubs,
        m.hub_threshold,
        shown.join(", "),
        suffix
    );

    let mut busiest: Vec<&NodeWire> = nodes.iter().collect();
    busiest.sort_by(|a, b| b.degree.cmp(&a.degree));
    for n in busiest.iter().take(5) {
        println!(
            "  node {:>4}  deg={} (in={} out={}){}",
            n.id,
            n.degree,
            n.in_degree,
            n.out_degree,
            if n.is_hub { "  [hub]" } else { "" }
        );
    }

    let mut heaviest: Vec<&EdgeWire> = edges.iter().collect();
    heaviest.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
    for e in heaviest.iter().take(5) {
        println!("  edge {} -> {}  w={:+.4}", e.source, e.target, e.weight);
    }
}

fn print_profile(label: &str, p: &ProfileWire) {
    println!(
        "{label}: mean={:.4} std={:.4} min={:.4} max={:.4} layers={}",
        p.mean,
        p.std,
        p.min,
        p.max,
        p.per_layer.len()
    );
    let per_layer: Vec<String> = p.per_layer.iter().map(|v| format!("{v:.3}")).collect();
    println!("  per-layer: [{}]", per_layer.join(", "));
}

fn print_path(policy: &str, report: &ReportWire, board: &[Vec<u8>]) {
    println!(
        "policy={} outcome={} steps={} visited={}",
        policy, report.outcome, report.steps, report.visited
    );
    let Some(path) = &report.path else {
        return;
    };
    let cells: Vec<String> = path.iter().map(|c| format!("({},{})", c.row, c.col)).collect();
    println!("path ({} cells): {}", path.len(), cells.join(" -> "));

    // Small glyph render: walls #, start S, end E, route *.
    let on_path = |r: usize, c: usize| {
        path.iter()
            .any(|p| p.row as usize == r && p.col as usize == c)
    };
    for (r, row) in board.iter().enumerate() {
        let line: String = row
            .iter()
            .enumerate()
            .map(|(c, &code)| match code {
                1 => '#',
                2 => 'S',
                3 => 'E',
                _ if on_path(r, c) => '*',
                _ => '.',
            })
            .collect();
        println!("  {line}");
    }
}

fn main() {
    let (addr, args) = parse_args();
    let cmd = &args[0];

    let req = match cmd.as_str() {
        "status" => Request::Status,
        "config" => Request::GetConfig,
        "topology" => {
            let threshold: f32 = if args.len() >= 2 {
                args[1]
                    .parse()
                    .unwrap_or_else(|_| make_error("threshold must be a float"))
            } else {
                0.1
            };
            let top_k_nodes: Option<usize> = if args.len() >= 3 {
                Some(
                    args[2]
                        .parse()
                        .unwrap_or_else(|_| make_error("top_k must be an integer")),
                )
            } else {
                None
            };
            Request::Topology {
                threshold,
                top_k_nodes,
            }
        }
        "infer" => Request::Infer {
            tokens: parse_tokens(&args[1..]),
        },
        "sparsity" => Request::Sparsity {
            tokens: parse_tokens(&args[1..]),
        },
        "layers" => Request::LayerStats {
            tokens: parse_tokens(&args[1..]),
        },
        "attention" => {
            if args.len() < 3 {
                usage();
            }
            let top_k: usize = args[1]
                .parse()
                .unwrap_or_else(|_| make_error("top_k must be an integer"));
            Request::Attention {
                tokens: parse_tokens(&args[2..]),
                top_k,
            }
        }
        "concepts" => {
            if args.len() < 3 {
                usage();
            }
            let threshold: f32 = args[1]
                .parse()
                .unwrap_or_else(|_| make_error("threshold must be a float"));
            Request::Concepts {
                tokens: parse_tokens(&args[2..]),
                threshold,
            }
        }
        "solve" => {
            if args.len() < 3 {
                usage();
            }
            let policy = args[1].clone();
            if policy != "bfs" && policy != "cells" && policy != "directions" {
                make_error("policy must be bfs|cells|directions");
            }
            Request::Pathfind {
                board: read_board(&args[2]),
                policy,
                max_steps: 100,
            }
        }
        "shutdown" => Request::Shutdown,
        _ => usage(),
    };

    match send_request(&addr, &req) {
        Ok(Response::Status {
            model,
            model_seed,
            solver_heads,
            uptime_secs,
        }) => {
            println!(
                "model: vocab={} neurons={} layers={} heads={} latent={} seq_len={} seed={}",
                model.vocab,
                model.neurons,
                model.layers,
                model.heads,
                model.latent,
                model.seq_len,
                model_seed,
            );
            println!("daemon: uptime={uptime_secs}s solver_heads={solver_heads}");
        }
        Ok(Response::Config {
            listen_addr,
            model_seed,
            model,
        }) => {
            println!("listen_addr: {listen_addr}");
            println!("model_seed: {model_seed}");
            println!(
                "model: vocab={} neurons={} layers={}",
                model.vocab, model.neurons, model.layers
            );
        }
        Ok(Response::Topology {
            nodes,
            edges,
            metrics,
        }) => print_topology(&nodes, &edges, &metrics),
        Ok(Response::Infer { predictions }) => {
            let p: Vec<String> = predictions.iter().map(|v| v.to_string()).collect();
            println!("predictions: [{}]", p.join(", "));
        }
        Ok(Response::Sparsity { primary, secondary }) => {
            print_profile("primary", &primary);
            if let Some(secondary) = secondary {
                print_profile("secondary", &secondary);
            }
        }
        Ok(Response::LayerStats { layers }) => {
            for l in layers {
                println!(
                    "layer {:>2}: primary mean={:+.4} std={:.4} sparsity={:.3} | secondary mean={:+.4} std={:.4} sparsity={:.3}",
                    l.layer,
                    l.primary.mean,
                    l.primary.std,
                    l.primary.sparsity,
                    l.secondary.mean,
                    l.secondary.std,
                    l.secondary.sparsity,
                );
            }
        }
        Ok(Response::Attention {
            top_edges_per_layer,
            mean_per_layer,
        }) => {
            for (i, mean) in mean_per_layer.iter().enumerate() {
                let best = top_edges_per_layer
                    .get(i)
                    .and_then(|edges| edges.last())
                    .map(|e| format!("{} -> {} ({:.4})", e.source, e.target, e.weight))
                    .unwrap_or_else(|| "-".to_string());
                println!("layer {i:>2}: mean={mean:.5} strongest={best}");
            }
        }
        Ok(Response::Concepts { concepts }) => {
            if concepts.is_empty() {
                println!("no symbols present in the sequence");
            }
            for (symbol, neurons) in concepts {
                let shown: Vec<String> = neurons
                    .iter()
                    .take(8)
                    .map(|n| format!("{}:{:.3}", n.neuron_id, n.avg_activation))
                    .collect();
                let suffix = if neurons.len() > 8 { ", ..." } else { "" };
                println!(
                    "symbol {symbol}: {} neurons [{}{}]",
                    neurons.len(),
                    shown.join(", "),
                    suffix
                );
            }
        }
        Ok(Response::Path {
            policy,
            report,
            board,
        }) => print_path(&policy, &report, &board),
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
