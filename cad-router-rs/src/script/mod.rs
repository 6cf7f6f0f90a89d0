//! Script generation for the fallback execution path
//!
//! Turns an [`OperationRequest`] into the text of a VBA module the CAD
//! application can run. Generation is pure and deterministic: identical
//! parameters produce byte-identical text. The unique id of a
//! [`GeneratedScript`] names its storage location and never appears in the text.

mod store;
mod syntax;
mod templates;
pub mod units;

pub use store::{ScriptArtifact, ScriptStore};
pub use syntax::{is_identifier_path, quote};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RouterError};
use crate::operation::{OperationFamily, OperationRequest, ParamValue};
use templates::ScriptBody;

const LINE_END: &str = "\r\n";

/// Script naming and storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// VBA module name, also the file name prefix
    pub module_name: String,

    /// Entry procedure inside the module
    pub procedure: String,

    /// File extension of persisted scripts, without the dot
    pub extension: String,

    /// Directory for persisted scripts; the system temp dir when unset
    pub directory: Option<PathBuf>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            module_name: "CadRouter".to_string(),
            procedure: "main".to_string(),
            extension: "swb".to_string(),
            directory: None,
        }
    }
}

impl ScriptConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("module_name", &self.module_name), ("procedure", &self.procedure)] {
            if value.contains('.') || !is_identifier_path(value) {
                return Err(RouterError::configuration(format!(
                    "script {} '{}' is not a valid identifier",
                    field, value
                )));
            }
        }
        if self.extension.is_empty() || !self.extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RouterError::configuration(format!(
                "script extension '{}' must be alphanumeric",
                self.extension
            )));
        }
        Ok(())
    }
}

/// A generated script. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedScript {
    /// Collision-resistant id naming the storage location
    pub id: Uuid,
    pub operation: String,
    pub family: Option<OperationFamily>,
    pub module: String,
    pub procedure: String,
    pub text: String,
    /// Substituted values by variable name, for audit
    pub parameters: BTreeMap<String, String>,
}

/// Pure generator of VBA modules
#[derive(Debug, Clone, Default)]
pub struct ScriptGenerator {
    config: ScriptConfig,
}

impl ScriptGenerator {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Generate a script for a request.
    ///
    /// Known families use their template. Any other operation is called
    /// through the generic path with its parameter values sorted by parameter
    /// name, the same positional order [`build_direct_call`] uses. Callers
    /// that need another order can call [`ScriptGenerator::generate_generic`]
    /// with an explicit argument list.
    ///
    /// [`build_direct_call`]: crate::router::build_direct_call
    pub fn generate(&self, request: &OperationRequest) -> Result<GeneratedScript> {
        match request.family() {
            Some(family) => self.generate_family(family, request),
            None => {
                let args: Vec<ParamValue> = request.parameters().values().cloned().collect();
                self.generate_generic(request.operation(), &args)
            }
        }
    }

    /// Generate the template of a known family
    pub fn generate_family(&self, family: OperationFamily, request: &OperationRequest) -> Result<GeneratedScript> {
        let body = templates::family_body(family, request)?;
        Ok(self.assemble(request.operation(), Some(family), body))
    }

    /// Generate a call of an arbitrary model method with positional arguments
    pub fn generate_generic(&self, method: &str, args: &[ParamValue]) -> Result<GeneratedScript> {
        let body = templates::generic_body(method, args)?;
        Ok(self.assemble(method, None, body))
    }

    fn assemble(&self, operation: &str, family: Option<OperationFamily>, body: ScriptBody) -> GeneratedScript {
        let (body_lines, parameters, feature_label) = body.into_parts();
        let module = quote(&self.config.module_name);

        let mut lines = vec![
            format!("Attribute VB_Name = {}", module),
            "Option Explicit".to_string(),
            String::new(),
            format!("Sub {}()", self.config.procedure),
            "    Dim swApp As Object".to_string(),
            "    Dim swModel As Object".to_string(),
            "    Dim swFeatMgr As Object".to_string(),
            "    Dim swFeat As Object".to_string(),
            "    Dim boolStatus As Boolean".to_string(),
            String::new(),
            "    Set swApp = Application.SldWorks".to_string(),
            "    Set swModel = swApp.ActiveDoc".to_string(),
            "    If swModel Is Nothing Then".to_string(),
            format!("        Err.Raise vbObjectError + 512, {}, \"No active document\"", module),
            "    End If".to_string(),
            "    Set swFeatMgr = swModel.FeatureManager".to_string(),
            String::new(),
        ];
        lines.extend(body_lines);

        if let Some(label) = feature_label {
            lines.push(String::new());
            lines.push("    If swFeat Is Nothing Then".to_string());
            lines.push(format!(
                "        Err.Raise vbObjectError + 513, {}, {}",
                module,
                quote(&format!("{} was not created", label))
            ));
            lines.push("    End If".to_string());
        }
        lines.push("End Sub".to_string());

        let mut text = lines.join(LINE_END);
        text.push_str(LINE_END);

        let script = GeneratedScript {
            id: Uuid::new_v4(),
            operation: operation.to_string(),
            family,
            module: self.config.module_name.clone(),
            procedure: self.config.procedure.clone(),
            text,
            parameters,
        };
        debug!(
            operation = %script.operation,
            script_id = %script.id,
            parameters = script.parameters.len(),
            "Generated script"
        );
        script
    }
}
