use std::error::Error;
use std::fmt;

use fea_config::{
    Geometry, MeshLimitPolicy, MeshPrecheck, SimulationConfig, TestType, mesh_precheck,
};

mod host;
mod journal;

pub use host::{CONFIG_PATH_VAR, HostError, HostInvocation, HostRunReport};
pub use journal::JournalBackend;

pub const PART_NAME: &str = "Beam";
pub const SECTION_NAME: &str = "BeamSection";
pub const INSTANCE_NAME: &str = "BeamInstance";
pub const INITIAL_STEP: &str = "Initial";
pub const STATIC_STEP: &str = "Step-1";
pub const FIXED_SET: &str = "Set-FixedEnd";
pub const LOAD_SET: &str = "Set-LoadPoint";
pub const FIXED_BC: &str = "Fixed";
pub const TIP_LOAD: &str = "TipLoad";

#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend operation failed: {}", self.message)
    }
}

impl Error for BackendError {}

/// Capability interface over the external CAE host's scripting API.
///
/// Only the operations the drivers actually issue are modeled, so driver
/// logic and backend bindings stay independently testable. Geometry is
/// located by coordinate, matching the host's pick-by-point lookups.
pub trait CadBackend {
    fn create_model(&mut self, model: &str) -> Result<(), BackendError>;

    /// Sketches a `width x height` rectangle centered at the origin of the
    /// X/Y plane and extrudes it along +Z by `length`.
    fn extrude_rectangular_solid(
        &mut self,
        part: &str,
        width: f64,
        height: f64,
        length: f64,
    ) -> Result<(), BackendError>;

    fn define_elastic_material(
        &mut self,
        material: &str,
        youngs_modulus_pa: f64,
        poisson_ratio: f64,
    ) -> Result<(), BackendError>;

    /// Creates a homogeneous solid section and assigns it to the whole part.
    fn assign_solid_section(&mut self, section: &str, material: &str)
    -> Result<(), BackendError>;

    /// Instances the part into the assembly (one dependent instance).
    fn instance_part(&mut self, instance: &str, part: &str) -> Result<(), BackendError>;

    fn create_static_step(&mut self, step: &str, previous: &str) -> Result<(), BackendError>;

    fn create_face_set(&mut self, set: &str, at: [f64; 3]) -> Result<(), BackendError>;

    fn create_vertex_set(&mut self, set: &str, at: [f64; 3]) -> Result<(), BackendError>;

    fn apply_encastre(&mut self, name: &str, set: &str, step: &str) -> Result<(), BackendError>;

    fn apply_concentrated_force(
        &mut self,
        name: &str,
        set: &str,
        step: &str,
        components: [f64; 3],
    ) -> Result<(), BackendError>;

    fn set_structured_hex_mesh(&mut self, part: &str) -> Result<(), BackendError>;

    /// Seeds every edge located by `edges` with a fixed element count.
    fn seed_edges_by_number(
        &mut self,
        part: &str,
        edges: &[[f64; 3]],
        elements: u32,
    ) -> Result<(), BackendError>;

    fn generate_mesh(&mut self, part: &str) -> Result<(), BackendError>;

    fn create_job(&mut self, job: &str, model: &str) -> Result<(), BackendError>;
}

/// Mid-edge sample coordinates for the 12 edges of the beam prism, grouped
/// by direction. Each group is seeded with the matching element count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeGroups {
    pub length: [[f64; 3]; 4],
    pub width: [[f64; 3]; 4],
    pub height: [[f64; 3]; 4],
}

pub fn beam_edge_groups(geometry: &Geometry) -> EdgeGroups {
    let w2 = geometry.width_m / 2.0;
    let h2 = geometry.height_m / 2.0;
    let l = geometry.length_m;
    let l2 = l / 2.0;

    EdgeGroups {
        length: [
            [w2, h2, l2],
            [-w2, h2, l2],
            [-w2, -h2, l2],
            [w2, -h2, l2],
        ],
        width: [
            [0.0, h2, 0.0],
            [0.0, -h2, 0.0],
            [0.0, h2, l],
            [0.0, -h2, l],
        ],
        height: [
            [w2, 0.0, 0.0],
            [-w2, 0.0, 0.0],
            [w2, 0.0, l],
            [-w2, 0.0, l],
        ],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The model was built and meshed, and a job was created under the
    /// model's name. Submission is owned by the external host.
    Completed { job: String, precheck: MeshPrecheck },
    /// Recognized test type whose workflow is not implemented yet; no
    /// backend work was performed.
    NotImplemented { test_type: TestType },
}

#[derive(Debug)]
pub enum DriverError {
    Backend(BackendError),
    /// Only raised under `MeshLimitPolicy::Enforce`.
    MeshLimit(MeshPrecheck),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Backend(err) => write!(f, "{err}"),
            DriverError::MeshLimit(precheck) => write!(
                f,
                "mesh of {} nodes exceeds the {}-node limit",
                precheck.total_nodes,
                fea_config::NODE_LIMIT
            ),
        }
    }
}

impl Error for DriverError {}

impl From<BackendError> for DriverError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

/// Dispatches a validated config to the workflow its `test_type` selects.
pub fn run_simulation<B: CadBackend>(
    config: &SimulationConfig,
    backend: &mut B,
    policy: MeshLimitPolicy,
) -> Result<RunOutcome, DriverError> {
    match config.test_type {
        TestType::CantileverBeam => run_cantilever_beam(config, backend, policy),
        TestType::TaylorImpact => Ok(RunOutcome::NotImplemented {
            test_type: TestType::TaylorImpact,
        }),
    }
}

fn run_cantilever_beam<B: CadBackend>(
    config: &SimulationConfig,
    backend: &mut B,
    policy: MeshLimitPolicy,
) -> Result<RunOutcome, DriverError> {
    let precheck = mesh_precheck(&config.discretization);
    if policy == MeshLimitPolicy::Enforce && !precheck.within_limit {
        return Err(DriverError::MeshLimit(precheck));
    }

    let geometry = &config.geometry;
    let w2 = geometry.width_m / 2.0;
    let h2 = geometry.height_m / 2.0;

    backend.create_model(&config.model_name)?;
    backend.extrude_rectangular_solid(
        PART_NAME,
        geometry.width_m,
        geometry.height_m,
        geometry.length_m,
    )?;

    backend.define_elastic_material(
        &config.material.name,
        config.material.youngs_modulus_pa,
        config.material.poisson_ratio,
    )?;
    backend.assign_solid_section(SECTION_NAME, &config.material.name)?;

    backend.instance_part(INSTANCE_NAME, PART_NAME)?;
    backend.create_static_step(STATIC_STEP, INITIAL_STEP)?;

    // Fixed face at the origin end; load vertex at the far corner.
    backend.create_face_set(FIXED_SET, [0.0, 0.0, 0.0])?;
    backend.create_vertex_set(LOAD_SET, [w2, h2, geometry.length_m])?;
    backend.apply_encastre(FIXED_BC, FIXED_SET, INITIAL_STEP)?;
    backend.apply_concentrated_force(
        TIP_LOAD,
        LOAD_SET,
        STATIC_STEP,
        [0.0, 0.0, -config.loading.tip_load_n],
    )?;

    backend.set_structured_hex_mesh(PART_NAME)?;
    let edges = beam_edge_groups(geometry);
    backend.seed_edges_by_number(PART_NAME, &edges.length, config.discretization.elements_length)?;
    backend.seed_edges_by_number(PART_NAME, &edges.width, config.discretization.elements_width)?;
    backend.seed_edges_by_number(PART_NAME, &edges.height, config.discretization.elements_height)?;
    backend.generate_mesh(PART_NAME)?;

    backend.create_job(&config.model_name, &config.model_name)?;

    Ok(RunOutcome::Completed {
        job: config.model_name.clone(),
        precheck,
    })
}
