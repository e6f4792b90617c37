//! ONNX export functionality
//!
//! Describes the scaler and forest as an ONNX-ML graph
//! (`Scaler` -> `TreeEnsembleRegressor` -> score arithmetic), encoded as
//! JSON. Full binary ONNX would require protobuf.

use super::bundle::{ForestDocument, ModelBundle, ScalerDocument, NONE};
use crate::anomaly::average_path_length;
use crate::error::{ForestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Domain of the ONNX-ML operators
pub const ML_DOMAIN: &str = "ai.onnx.ml";

/// ONNX configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ONNXConfig {
    /// Default-domain opset version
    pub opset_version: i64,
    /// `ai.onnx.ml` opset version
    pub ml_opset_version: i64,
    /// Producer name
    pub producer_name: String,
    /// Producer version
    pub producer_version: String,
    /// Model description
    pub description: String,
}

impl Default for ONNXConfig {
    fn default() -> Self {
        Self {
            opset_version: 15,
            ml_opset_version: 3,
            producer_name: "telemetry-forest".to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Isolation forest telemetry anomaly detector".to_string(),
        }
    }
}

/// ONNX data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ONNXDataType {
    Float = 1,
    Int64 = 7,
}

/// ONNX tensor shape dimension
#[derive(Debug, Clone)]
pub enum Dimension {
    /// Fixed size dimension
    Fixed(i64),
    /// Dynamic dimension with name
    Dynamic(String),
}

/// ONNX tensor specification
#[derive(Debug, Clone)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: ONNXDataType,
    pub shape: Vec<Dimension>,
}

impl TensorSpec {
    /// Float tensor of shape [batch, width]
    pub fn batch_float(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            dtype: ONNXDataType::Float,
            shape: vec![Dimension::Dynamic("batch".to_string()), Dimension::Fixed(width as i64)],
        }
    }
}

/// ONNX attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum ONNXAttribute {
    Int(i64),
    Float(f64),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strings(Vec<String>),
}

impl ONNXAttribute {
    fn to_json(&self) -> serde_json::Value {
        match self {
            ONNXAttribute::Int(i) => serde_json::json!(i),
            ONNXAttribute::Float(f) => serde_json::json!(f),
            ONNXAttribute::String(s) => serde_json::json!(s),
            ONNXAttribute::Ints(is) => serde_json::json!(is),
            ONNXAttribute::Floats(fs) => serde_json::json!(fs),
            ONNXAttribute::Strings(ss) => serde_json::json!(ss),
        }
    }
}

/// ONNX operator node
#[derive(Debug, Clone)]
pub struct ONNXNode {
    pub name: String,
    /// Operator type (e.g., "Scaler", "TreeEnsembleRegressor", "Pow")
    pub op_type: String,
    /// Empty for the default domain
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, ONNXAttribute>,
}

impl ONNXNode {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            domain: String::new(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn in_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Add attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: ONNXAttribute) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Scalar float constant
#[derive(Debug, Clone)]
pub struct ONNXInitializer {
    pub name: String,
    pub value: f32,
}

/// ONNX graph representation
#[derive(Debug, Clone)]
pub struct ONNXGraph {
    pub name: String,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
    pub nodes: Vec<ONNXNode>,
    pub initializers: Vec<ONNXInitializer>,
}

impl ONNXGraph {
    /// Create new graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            initializers: Vec::new(),
        }
    }

    pub fn add_input(mut self, spec: TensorSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn add_output(mut self, spec: TensorSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn add_node(mut self, node: ONNXNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_initializer(mut self, name: impl Into<String>, value: f32) -> Self {
        self.initializers.push(ONNXInitializer {
            name: name.into(),
            value,
        });
        self
    }
}

/// Trait for models that can be exported to ONNX
pub trait ONNXExportable {
    /// Convert model to ONNX graph
    fn to_onnx_graph(&self) -> Result<ONNXGraph>;
}

impl ONNXExportable for ModelBundle {
    fn to_onnx_graph(&self) -> Result<ONNXGraph> {
        forest_to_onnx(&self.scaler, &self.forest)
    }
}

/// `Scaler` node: ONNX computes (X - offset) * scale
fn scaler_node(scaler: &ScalerDocument) -> ONNXNode {
    ONNXNode::new("scaler", "Scaler", &["X"], &["X_scaled"])
        .in_domain(ML_DOMAIN)
        .with_attribute("offset", ONNXAttribute::Floats(scaler.center.clone()))
        .with_attribute(
            "scale",
            ONNXAttribute::Floats(scaler.scale.iter().map(|s| 1.0 / s).collect()),
        )
}

/// `TreeEnsembleRegressor` averaging per-leaf path lengths
fn ensemble_node(forest: &ForestDocument) -> ONNXNode {
    let mut tree_ids = Vec::new();
    let mut node_ids = Vec::new();
    let mut feature_ids = Vec::new();
    let mut values = Vec::new();
    let mut modes = Vec::new();
    let mut true_ids = Vec::new();
    let mut false_ids = Vec::new();
    let mut target_tree_ids = Vec::new();
    let mut target_node_ids = Vec::new();
    let mut target_weights = Vec::new();

    for (t, tree) in forest.trees.iter().enumerate() {
        for i in 0..tree.n_nodes() {
            tree_ids.push(t as i64);
            node_ids.push(i as i64);
            if tree.split_feature[i] == NONE {
                feature_ids.push(0);
                values.push(0.0);
                modes.push("LEAF".to_string());
                true_ids.push(0);
                false_ids.push(0);

                target_tree_ids.push(t as i64);
                target_node_ids.push(i as i64);
                let depth = tree.leaf_depth[i].max(0) as f64;
                target_weights.push(depth + average_path_length(tree.leaf_size[i].max(0) as usize));
            } else {
                feature_ids.push(tree.split_feature[i]);
                values.push(tree.split_value[i]);
                modes.push("BRANCH_LT".to_string());
                true_ids.push(tree.left_child[i]);
                false_ids.push(tree.right_child[i]);
            }
        }
    }

    let n_targets = target_weights.len();
    ONNXNode::new("forest", "TreeEnsembleRegressor", &["X_scaled"], &["mean_path"])
        .in_domain(ML_DOMAIN)
        .with_attribute("aggregate_function", ONNXAttribute::String("AVERAGE".to_string()))
        .with_attribute("n_targets", ONNXAttribute::Int(1))
        .with_attribute("nodes_treeids", ONNXAttribute::Ints(tree_ids))
        .with_attribute("nodes_nodeids", ONNXAttribute::Ints(node_ids))
        .with_attribute("nodes_featureids", ONNXAttribute::Ints(feature_ids))
        .with_attribute("nodes_values", ONNXAttribute::Floats(values))
        .with_attribute("nodes_modes", ONNXAttribute::Strings(modes))
        .with_attribute("nodes_truenodeids", ONNXAttribute::Ints(true_ids))
        .with_attribute("nodes_falsenodeids", ONNXAttribute::Ints(false_ids))
        .with_attribute("target_treeids", ONNXAttribute::Ints(target_tree_ids))
        .with_attribute("target_nodeids", ONNXAttribute::Ints(target_node_ids))
        .with_attribute("target_ids", ONNXAttribute::Ints(vec![0; n_targets]))
        .with_attribute("target_weights", ONNXAttribute::Floats(target_weights))
}

/// Build the full scoring graph: decision = 0.5 - 2^(-mean_path / c(S))
pub fn forest_to_onnx(scaler: &ScalerDocument, forest: &ForestDocument) -> Result<ONNXGraph> {
    if forest.trees.is_empty() {
        return Err(ForestError::Export("forest has no trees".to_string()));
    }
    let c = average_path_length(forest.max_samples);
    let c = if c > 0.0 { c } else { 1.0 };

    Ok(ONNXGraph::new("isolation_forest")
        .add_input(TensorSpec::batch_float("X", scaler.n_features))
        .add_output(TensorSpec::batch_float("decision_score", 1))
        .add_initializer("neg_inv_c", (-1.0 / c) as f32)
        .add_initializer("two", 2.0)
        .add_initializer("half", 0.5)
        .add_node(scaler_node(scaler))
        .add_node(ensemble_node(forest))
        .add_node(ONNXNode::new("exponent", "Mul", &["mean_path", "neg_inv_c"], &["exponent"]))
        .add_node(ONNXNode::new("score", "Pow", &["two", "exponent"], &["score"]))
        .add_node(ONNXNode::new("decision", "Sub", &["half", "score"], &["decision_score"])))
}

/// ONNX model exporter
#[derive(Debug, Clone, Default)]
pub struct ONNXExporter {
    config: ONNXConfig,
}

impl ONNXExporter {
    /// Create new exporter with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: ONNXConfig) -> Self {
        Self { config }
    }

    /// JSON encoding of the model
    pub fn to_json<M: ONNXExportable>(&self, model: &M) -> Result<serde_json::Value> {
        let graph = model.to_onnx_graph()?;

        #[derive(Serialize)]
        struct ONNXModel {
            ir_version: i64,
            opset_import: Vec<OpsetImport>,
            producer_name: String,
            producer_version: String,
            doc_string: String,
            model_version: i64,
            graph: GraphJson,
        }

        #[derive(Serialize)]
        struct OpsetImport {
            domain: String,
            version: i64,
        }

        #[derive(Serialize)]
        struct GraphJson {
            name: String,
            inputs: Vec<TensorSpecJson>,
            outputs: Vec<TensorSpecJson>,
            nodes: Vec<NodeJson>,
            initializers: Vec<InitializerJson>,
        }

        #[derive(Serialize)]
        struct TensorSpecJson {
            name: String,
            dtype: i32,
            shape: Vec<String>,
        }

        #[derive(Serialize)]
        struct NodeJson {
            name: String,
            op_type: String,
            domain: String,
            inputs: Vec<String>,
            outputs: Vec<String>,
            attributes: BTreeMap<String, serde_json::Value>,
        }

        #[derive(Serialize)]
        struct InitializerJson {
            name: String,
            dtype: i32,
            dims: Vec<i64>,
            float_data: Vec<f32>,
        }

        let tensor = |t: &TensorSpec| TensorSpecJson {
            name: t.name.clone(),
            dtype: t.dtype as i32,
            shape: t
                .shape
                .iter()
                .map(|d| match d {
                    Dimension::Fixed(n) => n.to_string(),
                    Dimension::Dynamic(s) => s.clone(),
                })
                .collect(),
        };

        let onnx_model = ONNXModel {
            ir_version: 8,
            opset_import: vec![
                OpsetImport {
                    domain: String::new(),
                    version: self.config.opset_version,
                },
                OpsetImport {
                    domain: ML_DOMAIN.to_string(),
                    version: self.config.ml_opset_version,
                },
            ],
            producer_name: self.config.producer_name.clone(),
            producer_version: self.config.producer_version.clone(),
            doc_string: self.config.description.clone(),
            model_version: 1,
            graph: GraphJson {
                name: graph.name.clone(),
                inputs: graph.inputs.iter().map(tensor).collect(),
                outputs: graph.outputs.iter().map(tensor).collect(),
                nodes: graph
                    .nodes
                    .iter()
                    .map(|n| NodeJson {
                        name: n.name.clone(),
                        op_type: n.op_type.clone(),
                        domain: n.domain.clone(),
                        inputs: n.inputs.clone(),
                        outputs: n.outputs.clone(),
                        attributes: n
                            .attributes
                            .iter()
                            .map(|(k, v)| (k.clone(), v.to_json()))
                            .collect(),
                    })
                    .collect(),
                initializers: graph
                    .initializers
                    .iter()
                    .map(|i| InitializerJson {
                        name: i.name.clone(),
                        dtype: ONNXDataType::Float as i32,
                        dims: Vec::new(),
                        float_data: vec![i.value],
                    })
                    .collect(),
            },
        };

        Ok(serde_json::to_value(onnx_model)?)
    }

    /// Export model to ONNX JSON representation
    pub fn export_json<M: ONNXExportable>(&self, model: &M, path: impl AsRef<Path>) -> Result<()> {
        let value = self.to_json(model)?;
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            ForestError::Export(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, &value).map_err(|e| {
            ForestError::Serialization(format!("Failed to write ONNX JSON: {}", e))
        })?;
        writer.flush()?;
        Ok(())
    }
}
