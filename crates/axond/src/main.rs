//! Axon Daemon - introspection service for a sequence-model collaborator
//!
//! The daemon owns the loaded model handle and serves analysis requests from
//! UI clients over a newline-delimited JSON protocol on TCP:
//! - Graph topology extracted from the connectivity matrix
//! - Activation sparsity and per-layer statistics
//! - Attention flow and concept-neuron maps
//! - Maze solving (exact breadth-first or model-guided greedy policies)
//!
//! Storage locations (config only; analysis results are never persisted):
//! - Linux: ~/.local/share/axon/
//! - Windows: %APPDATA%\axon\
//! - MacOS: ~/Library/Application Support/axon/

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use axon::attention::{attention_flow, AttentionFlow};
use axon::concepts::{concept_neurons, ConceptNeuron};
use axon::model::{ModelConfig, SequenceModel, SyntheticModel};
use axon::sparsity::{activation_sparsity, layer_statistics, ActivationSummary, LayerStats};
use axon::topology::{extract_topology, GraphTopology};
use axon_maze::board::{Board, BoardError, END};
use axon_maze::model_io::{ModelCellScorer, ModelDirectionScorer};
use axon_maze::solver::{
    solve_bfs, solve_greedy_cells, solve_greedy_directions, GreedyConfig, SolveError, SolveReport,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

mod paths;

use paths::AppPaths;

fn default_listen_addr() -> String {
    "127.0.0.1:9898".to_string()
}

fn default_model_seed() -> u64 {
    42
}

fn default_edge_threshold() -> f32 {
    0.1
}

fn default_attention_top_k() -> usize {
    30
}

fn default_concept_threshold() -> f32 {
    0.5
}

fn default_max_steps() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DaemonConfig {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    #[serde(default = "default_model_seed")]
    model_seed: u64,
    #[serde(default)]
    model: ModelConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            model_seed: default_model_seed(),
            model: ModelConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
enum DaemonError {
    #[error("invalid board: {0}")]
    Board(#[from] BoardError),
    #[error("{0}")]
    Solve(#[from] SolveError),
    #[error("invalid tensor shape: {0}")]
    Shape(#[from] axon::tensor::ShapeError),
    #[error("no tokens supplied")]
    EmptyTokens,
    #[error("token {token} is outside the model vocabulary ({vocab})")]
    TokenOutOfRange { token: u32, vocab: usize },
    #[error("sequence of {got} tokens exceeds the model's maximum of {max}")]
    SequenceTooLong { got: usize, max: usize },
}

/// Explicitly owned model handle: constructed once at startup and reused for
/// every request. Solver heads (cell-indexed per board size, one four-way
/// direction head) are created lazily and cached alongside it.
struct ModelHost {
    cfg: ModelConfig,
    seed: u64,
    model: SyntheticModel,
    cell_heads: HashMap<usize, SyntheticModel>,
    direction_head: Option<SyntheticModel>,
}

impl ModelHost {
    fn new(cfg: ModelConfig, seed: u64) -> Self {
        Self {
            cfg,
            seed,
            model: SyntheticModel::new(cfg, seed),
            cell_heads: HashMap::new(),
            direction_head: None,
        }
    }

    fn solver_head_count(&self) -> usize {
        self.cell_heads.len() + usize::from(self.direction_head.is_some())
    }

    /// Model whose logit head covers `cells` board positions.
    fn cell_head(&mut self, cells: usize) -> &SyntheticModel {
        let (base, seed) = (self.cfg, self.seed);
        self.cell_heads.entry(cells).or_insert_with(|| {
            let mut cfg = base;
            cfg.vocab = cells;
            cfg.seq_len = cells;
            SyntheticModel::new(cfg, seed ^ cells as u64)
        })
    }

    /// Model with the fixed four-way direction head.
    fn direction_head(&mut self) -> &SyntheticModel {
        let (base, seed) = (self.cfg, self.seed);
        self.direction_head.get_or_insert_with(|| {
            let mut cfg = base;
            cfg.vocab = 4;
            SyntheticModel::new(cfg, seed ^ 0x44_49_52)
        })
    }
}

// ============================================================================
// Wire protocol
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Policy {
    #[default]
    Bfs,
    Cells,
    Directions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    Status,
    GetConfig,
    Topology {
        #[serde(default = "default_edge_threshold")]
        threshold: f32,
        #[serde(default)]
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
        #[serde(default = "default_attention_top_k")]
        top_k: usize,
    },
    Concepts {
        tokens: Vec<u32>,
        #[serde(default = "default_concept_threshold")]
        threshold: f32,
    },
    Pathfind {
        board: Vec<Vec<u8>>,
        #[serde(default)]
        policy: Policy,
        #[serde(default = "default_max_steps")]
        max_steps: u32,
    },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusSnapshot {
    model: ModelConfig,
    model_seed: u64,
    solver_heads: usize,
    uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PathSnapshot {
    policy: Policy,
    report: SolveReport,
    board: Vec<Vec<u8>>,
    /// Capture of the main model reading the board, for the exact policy
    /// (the greedy policies already consult their solver heads per step).
    #[serde(default)]
    sparsity: Option<Box<ActivationSummary>>,
    #[serde(default)]
    attention: Option<Box<AttentionFlow>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    Status(StatusSnapshot),
    Config(DaemonConfig),
    Topology(Box<GraphTopology>),
    Infer { predictions: Vec<usize> },
    Sparsity(Box<ActivationSummary>),
    LayerStats { layers: Vec<LayerStats> },
    Attention(Box<AttentionFlow>),
    Concepts { concepts: BTreeMap<u32, Vec<ConceptNeuron>> },
    Path(Box<PathSnapshot>),
    Success { message: String },
    Error { message: String },
}

// ============================================================================
// Request handling
// ============================================================================

struct Shared {
    host: RwLock<ModelHost>,
    config: DaemonConfig,
    started: Instant,
    shutdown: Notify,
}

fn check_tokens(tokens: &[u32], cfg: &ModelConfig) -> Result<(), DaemonError> {
    if tokens.is_empty() {
        return Err(DaemonError::EmptyTokens);
    }
    if tokens.len() > cfg.seq_len {
        return Err(DaemonError::SequenceTooLong {
            got: tokens.len(),
            max: cfg.seq_len,
        });
    }
    if let Some(&token) = tokens.iter().find(|&&t| t as usize >= cfg.vocab) {
        return Err(DaemonError::TokenOutOfRange {
            token,
            vocab: cfg.vocab,
        });
    }
    Ok(())
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    let mut best_v = f32::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_v {
            best = i;
            best_v = v;
        }
    }
    best
}

async fn dispatch(req: Request, shared: &Arc<Shared>) -> Result<Response, DaemonError> {
    match req {
        Request::Status => {
            let host = shared.host.read().await;
            Ok(Response::Status(StatusSnapshot {
                model: host.cfg,
                model_seed: host.seed,
                solver_heads: host.solver_head_count(),
                uptime_secs: shared.started.elapsed().as_secs(),
            }))
        }
        Request::GetConfig => Ok(Response::Config(shared.config.clone())),
        Request::Topology {
            threshold,
            top_k_nodes,
        } => {
            let host = shared.host.read().await;
            let topology =
                extract_topology(host.model.connectivity_matrix(), threshold, top_k_nodes)?;
            info!(
                nodes = topology.metrics.num_nodes,
                edges = topology.metrics.num_edges,
                "topology extracted"
            );
            Ok(Response::Topology(Box::new(topology)))
        }
        Request::Infer { tokens } => {
            let host = shared.host.read().await;
            check_tokens(&tokens, &host.cfg)?;
            let pass = host.model.forward(&tokens);
            let predictions = (0..pass.logits.rows())
                .map(|r| argmax(pass.logits.row(r)))
                .collect();
            Ok(Response::Infer { predictions })
        }
        Request::Sparsity { tokens } => {
            let host = shared.host.read().await;
            check_tokens(&tokens, &host.cfg)?;
            let pass = host.model.forward(&tokens);
            let summary = activation_sparsity(&pass.activations, Some(&pass.secondary))?;
            Ok(Response::Sparsity(Box::new(summary)))
        }
        Request::LayerStats { tokens } => {
            let host = shared.host.read().await;
            check_tokens(&tokens, &host.cfg)?;
            let pass = host.model.forward(&tokens);
            let layers = layer_statistics(&pass.activations, &pass.secondary)?;
            Ok(Response::LayerStats { layers })
        }
        Request::Attention { tokens, top_k } => {
            let host = shared.host.read().await;
            check_tokens(&tokens, &host.cfg)?;
            let pass = host.model.forward(&tokens);
            let flow = attention_flow(&pass.attention, top_k)?;
            Ok(Response::Attention(Box::new(flow)))
        }
        Request::Concepts { tokens, threshold } => {
            let host = shared.host.read().await;
            check_tokens(&tokens, &host.cfg)?;
            let pass = host.model.forward(&tokens);
            let concepts =
                concept_neurons(&pass.activations, &tokens, host.cfg.vocab as u32, threshold)?;
            Ok(Response::Concepts { concepts })
        }
        Request::Pathfind {
            board,
            policy,
            max_steps,
        } => {
            let board = Board::from_rows(&board)?;
            let greedy = GreedyConfig {
                max_steps,
                ..GreedyConfig::default()
            };
            let mut sparsity = None;
            let mut attention = None;
            let report = match policy {
                Policy::Bfs => {
                    let report = solve_bfs(&board)?;
                    // Run the main model over the board so the front end can
                    // render internal state next to the exact solution, when
                    // the board fits the model's input contract.
                    let host = shared.host.read().await;
                    if board.len() <= host.cfg.seq_len && host.cfg.vocab > END as usize {
                        let pass = host.model.forward(&board.tokens());
                        sparsity = Some(Box::new(activation_sparsity(
                            &pass.activations,
                            Some(&pass.secondary),
                        )?));
                        attention = Some(Box::new(attention_flow(
                            &pass.attention,
                            default_attention_top_k(),
                        )?));
                    }
                    report
                }
                Policy::Cells => {
                    let mut host = shared.host.write().await;
                    let head = host.cell_head(board.len());
                    let mut scorer = ModelCellScorer::new(head);
                    solve_greedy_cells(&board, &mut scorer, &greedy)?
                }
                Policy::Directions => {
                    let mut host = shared.host.write().await;
                    let head = host.direction_head();
                    let mut scorer = ModelDirectionScorer::new(head);
                    solve_greedy_directions(&board, &mut scorer, &greedy)?
                }
            };
            info!(
                outcome = report.outcome.as_str(),
                steps = report.steps,
                "pathfind finished"
            );
            Ok(Response::Path(Box::new(PathSnapshot {
                policy,
                report,
                board: board.to_rows(),
                sparsity,
                attention,
            })))
        }
        Request::Shutdown => Ok(Response::Success {
            message: "shutting down".to_string(),
        }),
    }
}

async fn handle(req: Request, shared: &Arc<Shared>) -> (Response, bool) {
    if matches!(req, Request::Shutdown) {
        return (
            Response::Success {
                message: "shutting down".to_string(),
            },
            true,
        );
    }
    match dispatch(req, shared).await {
        Ok(resp) => (resp, false),
        Err(e) => {
            warn!("request failed: {e}");
            (
                Response::Error {
                    message: e.to_string(),
                },
                false,
            )
        }
    }
}

async fn serve_connection(stream: TcpStream, shared: Arc<Shared>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("read error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (resp, shutdown) = match serde_json::from_str::<Request>(&line) {
            Ok(req) => handle(req, &shared).await,
            Err(e) => (
                Response::Error {
                    message: format!("bad request: {e}"),
                },
                false,
            ),
        };

        let mut payload = match serde_json::to_string(&resp) {
            Ok(s) => s,
            Err(e) => {
                error!("serialize response: {e}");
                break;
            }
        };
        payload.push('\n');
        if let Err(e) = write_half.write_all(payload.as_bytes()).await {
            warn!("write error: {e}");
            break;
        }

        if shutdown {
            shared.shutdown.notify_one();
            break;
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(paths: Option<&AppPaths>) -> DaemonConfig {
    let Some(paths) = paths else {
        return DaemonConfig::default();
    };
    let path = paths.config_file();
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("ignoring malformed {}: {e}", path.display());
                DaemonConfig::default()
            }
        },
        Err(_) => {
            let cfg = DaemonConfig::default();
            if let Ok(raw) = serde_json::to_string_pretty(&cfg) {
                if std::fs::write(&path, raw).is_ok() {
                    info!("wrote default config to {}", path.display());
                }
            }
            cfg
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let paths = match AppPaths::new() {
        Ok(p) => {
            info!("data directory: {}", p.data_dir().display());
            Some(p)
        }
        Err(e) => {
            warn!("data directory unavailable: {e}");
            None
        }
    };
    let config = load_config(paths.as_ref());

    info!(
        vocab = config.model.vocab,
        neurons = config.model.neurons,
        layers = config.model.layers,
        seed = config.model_seed,
        "loading model"
    );
    let host = ModelHost::new(config.model, config.model_seed);
    info!("model ready");

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {}: {e}", config.listen_addr);
            std::process::exit(1);
        }
    };
    info!("listening on {}", config.listen_addr);

    let shared = Arc::new(Shared {
        host: RwLock::new(host),
        config,
        started: Instant::now(),
        shutdown: Notify::new(),
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!("client connected: {addr}");
                        let shared = Arc::clone(&shared);
                        tokio::spawn(async move {
                            serve_connection(stream, shared).await;
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
            _ = shared.shutdown.notified() => {
                info!("shutdown requested, exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shared() -> Arc<Shared> {
        let model = ModelConfig::with_shape(5, 32, 2);
        Arc::new(Shared {
            host: RwLock::new(ModelHost::new(model, 7)),
            config: DaemonConfig {
                model,
                model_seed: 7,
                ..DaemonConfig::default()
            },
            started: Instant::now(),
            shutdown: Notify::new(),
        })
    }

    #[test]
    fn requests_parse_with_defaults() {
        let req: Request = serde_json::from_str(r#"{"type": "Topology"}"#).unwrap();
        match req {
            Request::Topology {
                threshold,
                top_k_nodes,
            } => {
                assert!((threshold - 0.1).abs() < 1e-6);
                assert_eq!(top_k_nodes, None);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let req: Request =
            serde_json::from_str(r#"{"type": "Pathfind", "board": [[2, 3]]}"#).unwrap();
        match req {
            Request::Pathfind {
                policy, max_steps, ..
            } => {
                assert_eq!(policy, Policy::Bfs);
                assert_eq!(max_steps, 100);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn policies_use_snake_case_on_the_wire() {
        let req: Request = serde_json::from_str(
            r#"{"type": "Pathfind", "board": [[2, 3]], "policy": "directions"}"#,
        )
        .unwrap();
        assert!(matches!(
            req,
            Request::Pathfind {
                policy: Policy::Directions,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn pathfind_bfs_round_trips() {
        let shared = test_shared();
        let req = Request::Pathfind {
            board: vec![
                vec![0, 0, 1, 0],
                vec![2, 0, 1, 0],
                vec![0, 0, 0, 3],
                vec![0, 1, 0, 0],
            ],
            policy: Policy::Bfs,
            max_steps: 100,
        };
        let resp = dispatch(req, &shared).await.unwrap();
        let Response::Path(snapshot) = resp else {
            panic!("expected a path response");
        };
        assert!(snapshot.report.outcome.is_solved());
        assert_eq!(snapshot.report.path.as_ref().unwrap().len(), 5);
        // The exact policy also captures model state over the board.
        assert!(snapshot.sparsity.is_some());
        assert!(snapshot.attention.is_some());
    }

    #[tokio::test]
    async fn invalid_board_reports_an_error_not_a_panic() {
        let shared = test_shared();
        let req = Request::Pathfind {
            board: vec![vec![0, 0], vec![0, 0]],
            policy: Policy::Bfs,
            max_steps: 100,
        };
        let (resp, shutdown) = handle(req, &shared).await;
        assert!(!shutdown);
        assert!(matches!(resp, Response::Error { .. }));
    }

    #[tokio::test]
    async fn greedy_policies_build_and_reuse_solver_heads() {
        let shared = test_shared();
        let board = vec![vec![2, 0], vec![0, 3]];
        for _ in 0..2 {
            let req = Request::Pathfind {
                board: board.clone(),
                policy: Policy::Cells,
                max_steps: 50,
            };
            dispatch(req, &shared).await.unwrap();
        }
        let req = Request::Pathfind {
            board,
            policy: Policy::Directions,
            max_steps: 50,
        };
        dispatch(req, &shared).await.unwrap();
        // One cell head for the 4-cell board plus the direction head.
        assert_eq!(shared.host.read().await.solver_head_count(), 2);
    }

    #[tokio::test]
    async fn out_of_vocab_tokens_are_rejected() {
        let shared = test_shared();
        let req = Request::Sparsity {
            tokens: vec![0, 99],
        };
        let err = dispatch(req, &shared).await.unwrap_err();
        assert!(matches!(err, DaemonError::TokenOutOfRange { .. }));
    }
}
