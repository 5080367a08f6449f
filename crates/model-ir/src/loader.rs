// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model loading from manifest + SafeTensors files.
//!
//! The loader reads a model directory containing:
//! - `model.json` — the graph manifest (see [`ModelManifest`]).
//! - `model.safetensors` — optional constant payloads in HuggingFace
//!   SafeTensors format.
//!
//! Constant payloads are **not** copied. The weight file is memory-mapped
//! once and every constant borrows its byte range from the shared mapping,
//! so engines built from the same loaded graph share the weights read-only.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use tensor_core::{ConstantData, DType, Shape, ShapeStatus, TensorInfo};

use crate::manifest::ManifestTensor;
use crate::{
    Graph, ModelError, ModelManifest, Node, NodeOptions, OpKind, TensorDef, TensorId, TensorKind,
    Validated,
};

/// Default manifest filename.
const MANIFEST_FILE: &str = "model.json";

/// Default SafeTensors filename.
const WEIGHTS_FILE: &str = "model.safetensors";

/// Metadata for a single tensor extracted from the SafeTensors header.
#[derive(Debug, Clone)]
pub struct WeightMeta {
    /// Tensor name (key in the SafeTensors file).
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Byte range of the payload within the file.
    pub range: Range<usize>,
}

/// A memory-mapped SafeTensors file.
pub struct WeightStore {
    mmap: Arc<memmap2::Mmap>,
    entries: HashMap<String, WeightMeta>,
}

impl WeightStore {
    /// Maps `path` and indexes its header.
    pub fn open(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| {
            ModelError::SafeTensorsError(format!("cannot open '{}': {e}", path.display()))
        })?;

        // SAFETY: the mapping is read-only and the file is not modified while
        // the store is alive.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| ModelError::SafeTensorsError(format!("mmap failed: {e}")))?;

        let base = mmap.as_ptr() as usize;
        let tensors = safetensors::SafeTensors::deserialize(&mmap)
            .map_err(|e| ModelError::SafeTensorsError(format!("SafeTensors parse error: {e}")))?;

        let mut entries = HashMap::new();
        for (name, view) in tensors.tensors() {
            let dtype = convert_safetensor_dtype(&name, view.dtype())?;
            let start = view.data().as_ptr() as usize - base;
            let meta = WeightMeta {
                name: name.clone(),
                shape: view.shape().to_vec(),
                dtype,
                range: start..start + view.data().len(),
            };
            entries.insert(name, meta);
        }
        tracing::debug!("indexed {} tensors in '{}'", entries.len(), path.display());

        Ok(Self {
            mmap: Arc::new(mmap),
            entries,
        })
    }

    pub fn get(&self, name: &str) -> Option<&WeightMeta> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shares the payload of `name` without copying.
    pub fn constant(&self, name: &str) -> Result<ConstantData, ModelError> {
        let meta = self.get(name).ok_or_else(|| ModelError::WeightNotFound {
            name: name.to_string(),
        })?;
        ConstantData::shared(self.mmap.clone(), meta.range.clone())
            .map_err(|e| ModelError::SafeTensorsError(format!("tensor '{name}': {e}")))
    }
}

/// Loads a model from disk into a validated [`Graph`].
///
/// # Example
/// ```no_run
/// use model_ir::ModelLoader;
/// use std::path::Path;
///
/// let graph = ModelLoader::load(Path::new("./models/tiny-cnn")).unwrap();
/// println!("{}", graph.summary());
/// ```
pub struct ModelLoader;

impl ModelLoader {
    /// Loads and validates a model from the given directory.
    ///
    /// Steps:
    /// 1. Parse `model.json` and validate it.
    /// 2. Map `model.safetensors` if the manifest refers to weights.
    /// 3. Build the tensor and node arenas.
    /// 4. Validate the graph.
    pub fn load(model_dir: &Path) -> Result<Graph<Validated>, ModelError> {
        let manifest = ModelManifest::from_file(&model_dir.join(MANIFEST_FILE))?;
        let weights = if manifest.weight_names().is_empty() {
            None
        } else {
            Some(WeightStore::open(&model_dir.join(WEIGHTS_FILE))?)
        };
        let graph = Self::from_manifest(&manifest, weights.as_ref())?;
        tracing::info!("loaded {}", graph.summary());
        Ok(graph)
    }

    /// Builds a graph from a parsed manifest and an optional weight store.
    pub fn from_manifest(
        manifest: &ModelManifest,
        weights: Option<&WeightStore>,
    ) -> Result<Graph<Validated>, ModelError> {
        manifest.validate()?;
        let mut graph = Graph::new(manifest.name.clone(), manifest.layout);
        let mut ids: HashMap<&str, TensorId> = HashMap::new();

        for t in &manifest.tensors {
            let kind = if manifest.inputs.contains(&t.name) {
                TensorKind::Input
            } else if t.is_constant() {
                TensorKind::Constant
            } else {
                TensorKind::Intermediate
            };
            let def = build_tensor(t, kind, weights)?;
            ids.insert(t.name.as_str(), graph.add_tensor(def));
        }

        let lookup = |name: &str| {
            ids.get(name).copied().ok_or_else(|| {
                ModelError::InvalidGraph(format!("tensor '{name}' is not declared"))
            })
        };

        // Graph inputs follow the manifest's input list, not declaration order.
        let input_ids = manifest
            .inputs
            .iter()
            .map(|n| lookup(n))
            .collect::<Result<Vec<_>, _>>()?;
        graph.set_inputs(input_ids);

        for (i, n) in manifest.nodes.iter().enumerate() {
            let invalid = |detail: String| ModelError::InvalidNode {
                node: i,
                name: n.name.clone(),
                detail,
            };
            let kind = OpKind::parse(&n.op).ok_or_else(|| invalid(format!("unknown op '{}'", n.op)))?;
            let options = NodeOptions::from_json(kind, n.options.clone())
                .map_err(|e| invalid(format!("bad options: {e}")))?;
            let resolve = |names: &[String]| -> Result<Vec<TensorId>, ModelError> {
                names.iter().map(|name| lookup(name)).collect()
            };
            graph.add_node(Node::new(
                n.name.clone(),
                kind,
                resolve(&n.inputs)?,
                resolve(&n.outputs)?,
                options,
            ));
        }
        for name in &manifest.outputs {
            graph.mark_output(lookup(name)?);
        }
        graph.validate()
    }
}

fn invalid_tensor(name: &str, detail: impl Into<String>) -> ModelError {
    ModelError::InvalidTensor {
        tensor: name.to_string(),
        detail: detail.into(),
    }
}

fn build_tensor(
    t: &ManifestTensor,
    kind: TensorKind,
    weights: Option<&WeightStore>,
) -> Result<TensorDef, ModelError> {
    let dtype = DType::parse(&t.dtype)
        .ok_or_else(|| invalid_tensor(&t.name, format!("unsupported dtype '{}'", t.dtype)))?;

    let (shape, data) = match kind {
        TensorKind::Constant => {
            let (shape, data) = constant_payload(t, dtype, weights)?;
            (Some(shape), Some(data))
        }
        _ => (t.shape.clone(), None),
    };

    let status = match kind {
        TensorKind::Input | TensorKind::Constant => ShapeStatus::Valid,
        _ => ShapeStatus::Undefined,
    };
    let info = TensorInfo {
        shape: shape.unwrap_or_else(Shape::scalar),
        dtype,
        quantization: t.quantization.clone(),
        status,
    };
    if let Some(q) = &info.quantization {
        if info.status == ShapeStatus::Valid {
            q.validate(&info.shape)
                .map_err(|e| invalid_tensor(&t.name, e.to_string()))?;
        }
    }
    Ok(TensorDef {
        name: t.name.clone(),
        info,
        kind,
        data,
    })
}

/// Resolves the shape and bytes of a constant.
fn constant_payload(
    t: &ManifestTensor,
    dtype: DType,
    weights: Option<&WeightStore>,
) -> Result<(Shape, ConstantData), ModelError> {
    let (default_dims, data) = if let Some(values) = &t.values {
        (vec![values.len()], encode_values(&t.name, values, dtype)?)
    } else if let Some(key) = &t.weight {
        let store = weights.ok_or_else(|| ModelError::WeightNotFound { name: key.clone() })?;
        let meta = store
            .get(key)
            .ok_or_else(|| ModelError::WeightNotFound { name: key.clone() })?;
        if meta.dtype != dtype {
            return Err(invalid_tensor(
                &t.name,
                format!("declared {dtype}, weight '{key}' is {}", meta.dtype),
            ));
        }
        (meta.shape.clone(), store.constant(key)?)
    } else {
        return Err(invalid_tensor(&t.name, "constant without payload"));
    };

    let shape = t.shape.clone().unwrap_or_else(|| Shape::new(default_dims));
    let expected = shape
        .size_bytes(dtype)
        .ok_or_else(|| invalid_tensor(&t.name, "constant shape must be fully known"))?;
    if expected != data.len() {
        return Err(invalid_tensor(
            &t.name,
            format!("shape {shape} needs {expected} bytes, payload has {}", data.len()),
        ));
    }
    Ok((shape, data))
}

/// Encodes inline manifest numbers as `dtype` elements.
fn encode_values(name: &str, values: &[f64], dtype: DType) -> Result<ConstantData, ModelError> {
    let data = match dtype {
        DType::F32 => ConstantData::from_values(&values.iter().map(|&v| v as f32).collect::<Vec<_>>()),
        DType::U8 => ConstantData::from_values(&values.iter().map(|&v| v as u8).collect::<Vec<_>>()),
        DType::I8 => ConstantData::from_values(&values.iter().map(|&v| v as i8).collect::<Vec<_>>()),
        DType::I16 => ConstantData::from_values(&values.iter().map(|&v| v as i16).collect::<Vec<_>>()),
        DType::I32 => ConstantData::from_values(&values.iter().map(|&v| v as i32).collect::<Vec<_>>()),
        DType::I64 => ConstantData::from_values(&values.iter().map(|&v| v as i64).collect::<Vec<_>>()),
        DType::Bool => ConstantData::from_values(&values.iter().map(|&v| v != 0.0).collect::<Vec<_>>()),
    };
    if values.iter().any(|v| !v.is_finite()) && dtype != DType::F32 {
        return Err(invalid_tensor(name, "non-finite value in integer constant"));
    }
    Ok(data)
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
fn convert_safetensor_dtype(name: &str, st_dtype: safetensors::Dtype) -> Result<DType, ModelError> {
    match st_dtype {
        safetensors::Dtype::F32 => Ok(DType::F32),
        safetensors::Dtype::U8 => Ok(DType::U8),
        safetensors::Dtype::I8 => Ok(DType::I8),
        safetensors::Dtype::I16 => Ok(DType::I16),
        safetensors::Dtype::I32 => Ok(DType::I32),
        safetensors::Dtype::I64 => Ok(DType::I64),
        safetensors::Dtype::BOOL => Ok(DType::Bool),
        other => Err(ModelError::SafeTensorsError(format!(
            "tensor '{name}' has unsupported SafeTensors dtype {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShapeInference;

    const MANIFEST: &str = r#"{
        "name": "tiny",
        "layout": "nhwc",
        "inputs": ["x"],
        "outputs": ["y"],
        "tensors": [
            { "name": "x", "dtype": "f32", "shape": [-1, 4, 4, 1] },
            { "name": "w", "dtype": "f32", "weight": "conv.weight" },
            { "name": "b", "dtype": "f32", "values": [0.5, -0.5] },
            { "name": "h", "dtype": "f32" },
            { "name": "axes", "dtype": "i32", "values": [1, 2] },
            { "name": "y", "dtype": "f32" }
        ],
        "nodes": [
            { "name": "conv", "op": "conv2d", "inputs": ["x", "w", "b"], "outputs": ["h"],
              "options": { "padding": "valid", "fused_activation": "relu" } },
            { "name": "mean", "op": "mean", "inputs": ["h", "axes"], "outputs": ["y"],
              "options": { "keep_dims": false } }
        ]
    }"#;

    fn write_model(dir: &Path, weight: &[f32], shape: Vec<usize>) {
        std::fs::write(dir.join(MANIFEST_FILE), MANIFEST).unwrap();
        let bytes: Vec<u8> = weight.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = safetensors::tensor::TensorView::new(safetensors::Dtype::F32, shape, &bytes).unwrap();
        let file = safetensors::serialize([("conv.weight", view)], &None).unwrap();
        std::fs::write(dir.join(WEIGHTS_FILE), file).unwrap();
    }

    #[test]
    fn test_load_directory_with_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let weight: Vec<f32> = (0..18).map(|i| i as f32).collect();
        write_model(dir.path(), &weight, vec![2, 3, 3, 1]);

        let graph = ModelLoader::load(dir.path()).unwrap();
        assert_eq!(graph.num_nodes(), 2);
        let w = graph.tensor(graph.find_tensor("w").unwrap()).unwrap();
        assert_eq!(w.info.shape, Shape::new(vec![2, 3, 3, 1]));
        let data = w.data.as_ref().unwrap();
        assert_eq!(data.read::<f32>(17), 17.0);

        let h = graph.tensor(graph.find_tensor("h").unwrap()).unwrap();
        assert!(!h.info.is_ready());
        assert_eq!(graph.tensor(graph.find_tensor("axes").unwrap()).unwrap().constant_i64(), Some(vec![1, 2]));
    }

    #[test]
    fn test_loaded_graph_infers_shapes() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), &[0.0; 18], vec![2, 3, 3, 1]);
        let mut graph = ModelLoader::load(dir.path()).unwrap();
        let report = ShapeInference::run(&mut graph, |_| graph_layout()).unwrap();
        assert_eq!(report.resolved, 2);
        let y = graph.info(graph.find_tensor("y").unwrap()).unwrap();
        assert_eq!(y.shape.to_string(), "[?, 2]");
    }

    fn graph_layout() -> tensor_core::Layout {
        tensor_core::Layout::Nhwc
    }

    #[test]
    fn test_missing_weight_tensor() {
        let manifest = ModelManifest::from_json(MANIFEST).unwrap();
        let result = ModelLoader::from_manifest(&manifest, None);
        assert!(matches!(result, Err(ModelError::WeightNotFound { .. })));
    }

    #[test]
    fn test_weight_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), &[0.0; 18], vec![2, 3, 3, 1]);
        let mut manifest = ModelManifest::from_json(MANIFEST).unwrap();
        manifest.tensors[1].shape = Some(Shape::new(vec![1, 3, 3, 1]));
        let store = WeightStore::open(&dir.path().join(WEIGHTS_FILE)).unwrap();
        assert_eq!(store.len(), 1);
        let err = ModelLoader::from_manifest(&manifest, Some(&store)).unwrap_err();
        assert!(matches!(err, ModelError::InvalidTensor { .. }));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelLoader::load(dir.path()),
            Err(ModelError::ManifestReadError(_))
        ));
    }
}
