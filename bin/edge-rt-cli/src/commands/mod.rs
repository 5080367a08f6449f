// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the helpers they share.

pub mod benchmark;
pub mod inspect;
pub mod run;

use anyhow::Context;
use model_ir::{Graph, Validated};
use runtime::RuntimeConfig;
use std::path::{Path, PathBuf};
use tensor_core::{DType, Tensor};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Engine options shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct EngineArgs {
    /// Path to the model directory.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Backends in preference order (e.g., "planar,cpu").
    #[arg(long)]
    pub backends: Option<String>,

    /// Arena budget (e.g., "256K", "4M").
    #[arg(short = 'b', long)]
    pub memory_budget: Option<String>,

    /// Concrete shape for a graph input, as NAME=D0,D1,... (repeatable).
    #[arg(long = "input-shape", value_name = "NAME=DIMS")]
    pub input_shapes: Vec<String>,
}

impl EngineArgs {
    /// Builds the runtime configuration: the file given with `--config`
    /// (or the defaults), overridden by any flag that was passed.
    pub fn resolve(&self, config_file: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
        let mut config = match config_file {
            Some(path) => RuntimeConfig::from_file(path)?,
            None => {
                let model = self
                    .model
                    .clone()
                    .context("either --model or --config is required")?;
                RuntimeConfig {
                    model_path: model,
                    ..Default::default()
                }
            }
        };

        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(backends) = &self.backends {
            config.backends = backends
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
        }
        if let Some(budget) = &self.memory_budget {
            config.memory_budget = budget.clone();
        }
        for arg in &self.input_shapes {
            let (name, dims) = parse_input_shape(arg)?;
            config.input_shapes.insert(name, dims);
        }
        Ok(config)
    }
}

/// Parses `NAME=D0,D1,...`.
pub fn parse_input_shape(arg: &str) -> anyhow::Result<(String, Vec<usize>)> {
    let (name, dims) = arg
        .split_once('=')
        .with_context(|| format!("input shape '{arg}' is not NAME=D0,D1,..."))?;
    let dims = dims
        .split(',')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid dimension '{d}' in '{arg}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    anyhow::ensure!(!name.trim().is_empty(), "input shape '{arg}' has no tensor name");
    Ok((name.trim().to_string(), dims))
}

/// One deterministic host tensor per graph input, in declaration order.
///
/// Float inputs get a small ramp; integer inputs are filled with their
/// zero point.
pub fn synthetic_inputs(graph: &Graph<Validated>) -> anyhow::Result<Vec<Tensor>> {
    graph
        .inputs()
        .iter()
        .map(|&id| {
            let def = graph.tensor(id).context("graph input missing from tensor table")?;
            let dims = def.info.concrete_dims().with_context(|| {
                format!(
                    "input '{}' has shape {}; pass --input-shape {}=...",
                    def.name, def.info.shape, def.name
                )
            })?;
            let n: usize = dims.iter().product();
            let (_, zero_point) = def.info.scale_zero_point();
            let tensor = match def.info.dtype {
                DType::F32 => {
                    let values: Vec<f32> = (0..n).map(|i| ((i % 17) as f32 - 8.0) / 8.0).collect();
                    Tensor::from_f32(dims, &values)?
                }
                DType::U8 => Tensor::from_slice(dims, &vec![zero_point.clamp(0, 255) as u8; n])?,
                DType::I8 => Tensor::from_slice(dims, &vec![zero_point.clamp(-128, 127) as i8; n])?,
                other => Tensor::zeros(dims, other),
            };
            Ok(match &def.info.quantization {
                Some(q) => tensor.with_quantization(q.clone()),
                None => tensor,
            })
        })
        .collect()
}

/// Truncates a string to `max_len` with ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{Node, NodeOptions, OpKind};
    use tensor_core::{Layout, Quantization, TensorInfo};

    fn args() -> EngineArgs {
        EngineArgs {
            model: Some(PathBuf::from("m")),
            backends: None,
            memory_budget: None,
            input_shapes: vec![],
        }
    }

    #[test]
    fn test_parse_input_shape() {
        let (name, dims) = parse_input_shape("image=1, 28,28,3").unwrap();
        assert_eq!(name, "image");
        assert_eq!(dims, vec![1, 28, 28, 3]);
        assert!(parse_input_shape("image").is_err());
        assert!(parse_input_shape("image=1,x").is_err());
        assert!(parse_input_shape("=1").is_err());
    }

    #[test]
    fn test_resolve_overrides() {
        let mut a = args();
        a.backends = Some("planar, cpu".into());
        a.memory_budget = Some("256K".into());
        a.input_shapes = vec!["x=2,4".into()];
        let c = a.resolve(None).unwrap();
        assert_eq!(c.model_path, PathBuf::from("m"));
        assert_eq!(c.backends, vec!["planar", "cpu"]);
        assert_eq!(c.memory_budget, "256K");
        assert_eq!(c.input_shapes["x"], vec![2, 4]);
    }

    #[test]
    fn test_resolve_needs_model() {
        let mut a = args();
        a.model = None;
        assert!(a.resolve(None).is_err());
    }

    #[test]
    fn test_synthetic_inputs() {
        let mut g = Graph::new("g", Layout::Nhwc);
        let x = g.add_input(
            "x",
            TensorInfo::new(vec![1, 2], DType::U8).with_quantization(Quantization::per_tensor(0.5, 3)),
        );
        let y = g.add_intermediate("y", TensorInfo::undefined(DType::U8));
        g.add_node(Node::new("relu", OpKind::Relu, vec![x], vec![y], NodeOptions::None));
        g.mark_output(y);
        let g = g.validate().unwrap();

        let inputs = synthetic_inputs(&g).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].to_vec::<u8>(), vec![3, 3]);
        assert!(inputs[0].quantization().is_some());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a_very_long_tensor_name", 10), "a_very_...");
    }
}
