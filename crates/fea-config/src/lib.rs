use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Node-count ceiling of the constrained CAE license tier.
pub const NODE_LIMIT: u64 = 1000;

/// Simulation workflow selected by a configuration.
///
/// Closed set: a tag outside this list is rejected when the JSON is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    CantileverBeam,
    TaylorImpact,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::CantileverBeam => f.write_str("CantileverBeam"),
            TestType::TaylorImpact => f.write_str("TaylorImpact"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub length_m: f64,
    pub width_m: f64,
    pub height_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub youngs_modulus_pa: f64,
    pub poisson_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Loading {
    pub tip_load_n: f64,
}

/// Element counts along each beam dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discretization {
    pub elements_length: u32,
    pub elements_width: u32,
    pub elements_height: u32,
}

/// The structured simulation description exchanged between tiers.
///
/// The upper-case keys are the wire contract of `config.json`; there is no
/// version field and schema changes are not backward compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(rename = "MODEL_NAME")]
    pub model_name: String,
    #[serde(rename = "TEST_TYPE")]
    pub test_type: TestType,
    #[serde(rename = "GEOMETRY")]
    pub geometry: Geometry,
    #[serde(rename = "MATERIAL")]
    pub material: Material,
    #[serde(rename = "LOADING")]
    pub loading: Loading,
    #[serde(rename = "DISCRETIZATION")]
    pub discretization: Discretization,
}

#[derive(Debug)]
pub enum ConfigError {
    /// The payload was not well-formed JSON or did not match the schema.
    /// Carries the raw offending text so it can be shown to the user.
    Parse { message: String, raw: String },
    /// Well-formed JSON whose values fail the range checks.
    Invalid(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse { message, .. } => {
                write!(f, "configuration is not valid JSON: {message}")
            }
            ConfigError::Invalid(problems) => {
                write!(f, "configuration rejected: {}", problems.join("; "))
            }
        }
    }
}

impl Error for ConfigError {}

impl SimulationConfig {
    /// Decodes and range-checks a configuration in one step.
    ///
    /// Presence and ranges are checked eagerly here, so a config that decodes
    /// successfully can be consumed by the driver without further lookups.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
            raw: raw.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.model_name.trim().is_empty() {
            problems.push("MODEL_NAME must not be empty".to_string());
        }

        for (label, value) in [
            ("GEOMETRY.length_m", self.geometry.length_m),
            ("GEOMETRY.width_m", self.geometry.width_m),
            ("GEOMETRY.height_m", self.geometry.height_m),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                problems.push(format!("{label} must be a positive number, got {value}"));
            }
        }

        if !(self.material.youngs_modulus_pa > 0.0) || !self.material.youngs_modulus_pa.is_finite()
        {
            problems.push(format!(
                "MATERIAL.youngs_modulus_pa must be positive, got {}",
                self.material.youngs_modulus_pa
            ));
        }
        if !(self.material.poisson_ratio > 0.0 && self.material.poisson_ratio < 0.5) {
            problems.push(format!(
                "MATERIAL.poisson_ratio must lie in (0, 0.5), got {}",
                self.material.poisson_ratio
            ));
        }
        if !self.loading.tip_load_n.is_finite() {
            problems.push(format!(
                "LOADING.tip_load_n must be finite, got {}",
                self.loading.tip_load_n
            ));
        }

        for (label, value) in [
            ("DISCRETIZATION.elements_length", self.discretization.elements_length),
            ("DISCRETIZATION.elements_width", self.discretization.elements_width),
            ("DISCRETIZATION.elements_height", self.discretization.elements_height),
        ] {
            if value == 0 {
                problems.push(format!("{label} must be at least 1"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("config serializes to JSON")
    }
}

/// Whether a mesh-limit violation blocks the operation or merely gets
/// reported. The translator enforces by default; the driver only advises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshLimitPolicy {
    #[default]
    Advisory,
    Enforce,
}

/// Derived mesh sizing for a discretization. Recomputed per run, never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPrecheck {
    pub elements: Discretization,
    pub total_nodes: u64,
    pub total_elements: u64,
    pub within_limit: bool,
}

/// Computes node and element counts for a structured hex grid: `N` elements
/// along an axis produce `N + 1` node planes.
pub fn mesh_precheck(elements: &Discretization) -> MeshPrecheck {
    let l = u64::from(elements.elements_length);
    let w = u64::from(elements.elements_width);
    let h = u64::from(elements.elements_height);

    let total_nodes = (l + 1) * (w + 1) * (h + 1);
    let total_elements = l * w * h;

    MeshPrecheck {
        elements: *elements,
        total_nodes,
        total_elements,
        within_limit: total_nodes <= NODE_LIMIT,
    }
}

impl MeshPrecheck {
    /// Human-readable sizing block printed before a run.
    pub fn report(&self) -> String {
        let mut lines = vec![
            "--- MESH PRE-CHECK ---".to_string(),
            format!(
                "Elements: {} (L) x {} (W) x {} (H) = {} elements",
                self.elements.elements_length,
                self.elements.elements_width,
                self.elements.elements_height,
                self.total_elements
            ),
            format!("Nodes: {} nodes", self.total_nodes),
        ];
        if self.within_limit {
            lines.push(format!(
                "Node count ({}) is within the {NODE_LIMIT}-node limit.",
                self.total_nodes
            ));
        } else {
            lines.push(format!(
                "WARNING: node count ({}) exceeds the {NODE_LIMIT}-node license limit.",
                self.total_nodes
            ));
            lines.push("Mesh generation in the host will fail.".to_string());
        }
        lines.push("------------------------".to_string());
        lines.join("\n")
    }
}
