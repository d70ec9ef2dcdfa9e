use std::fs;
use std::path::Path;

use crate::{BackendError, CadBackend};

/// Backend binding that renders every operation into the line-oriented
/// command journal executed by the external CAE host's script adapter.
///
/// The host stays an opaque command executor: this binding only serializes
/// the call sequence, it never interprets it.
#[derive(Debug, Default)]
pub struct JournalBackend {
    lines: Vec<String>,
}

impl JournalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn script(&self) -> String {
        let mut script = self.lines.join("\n");
        script.push('\n');
        script
    }

    pub fn write_to(&self, path: &Path) -> Result<(), BackendError> {
        fs::write(path, self.script()).map_err(|err| {
            BackendError::new(format!("cannot write journal {}: {err}", path.display()))
        })
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

fn coord(at: [f64; 3]) -> String {
    format!("({},{},{})", at[0], at[1], at[2])
}

impl CadBackend for JournalBackend {
    fn create_model(&mut self, model: &str) -> Result<(), BackendError> {
        self.push(format!("create-model name={model}"));
        Ok(())
    }

    fn extrude_rectangular_solid(
        &mut self,
        part: &str,
        width: f64,
        height: f64,
        length: f64,
    ) -> Result<(), BackendError> {
        self.push(format!(
            "extrude-rect-solid part={part} width={width} height={height} length={length}"
        ));
        Ok(())
    }

    fn define_elastic_material(
        &mut self,
        material: &str,
        youngs_modulus_pa: f64,
        poisson_ratio: f64,
    ) -> Result<(), BackendError> {
        self.push(format!(
            "define-material name={material} youngs-modulus={youngs_modulus_pa} poisson-ratio={poisson_ratio}"
        ));
        Ok(())
    }

    fn assign_solid_section(
        &mut self,
        section: &str,
        material: &str,
    ) -> Result<(), BackendError> {
        self.push(format!(
            "assign-solid-section section={section} material={material}"
        ));
        Ok(())
    }

    fn instance_part(&mut self, instance: &str, part: &str) -> Result<(), BackendError> {
        self.push(format!("instance-part instance={instance} part={part}"));
        Ok(())
    }

    fn create_static_step(&mut self, step: &str, previous: &str) -> Result<(), BackendError> {
        self.push(format!("create-static-step step={step} previous={previous}"));
        Ok(())
    }

    fn create_face_set(&mut self, set: &str, at: [f64; 3]) -> Result<(), BackendError> {
        self.push(format!("create-face-set set={set} at={}", coord(at)));
        Ok(())
    }

    fn create_vertex_set(&mut self, set: &str, at: [f64; 3]) -> Result<(), BackendError> {
        self.push(format!("create-vertex-set set={set} at={}", coord(at)));
        Ok(())
    }

    fn apply_encastre(&mut self, name: &str, set: &str, step: &str) -> Result<(), BackendError> {
        self.push(format!("apply-encastre name={name} set={set} step={step}"));
        Ok(())
    }

    fn apply_concentrated_force(
        &mut self,
        name: &str,
        set: &str,
        step: &str,
        components: [f64; 3],
    ) -> Result<(), BackendError> {
        self.push(format!(
            "apply-concentrated-force name={name} set={set} step={step} components={}",
            coord(components)
        ));
        Ok(())
    }

    fn set_structured_hex_mesh(&mut self, part: &str) -> Result<(), BackendError> {
        self.push(format!("set-mesh-controls part={part} shape=hex technique=structured"));
        Ok(())
    }

    fn seed_edges_by_number(
        &mut self,
        part: &str,
        edges: &[[f64; 3]],
        elements: u32,
    ) -> Result<(), BackendError> {
        let at = edges.iter().map(|edge| coord(*edge)).collect::<Vec<_>>();
        self.push(format!(
            "seed-edges part={part} elements={elements} constraint=fixed at={}",
            at.join(";")
        ));
        Ok(())
    }

    fn generate_mesh(&mut self, part: &str) -> Result<(), BackendError> {
        self.push(format!("generate-mesh part={part}"));
        Ok(())
    }

    fn create_job(&mut self, job: &str, model: &str) -> Result<(), BackendError> {
        self.push(format!("create-job job={job} model={model}"));
        Ok(())
    }
}
