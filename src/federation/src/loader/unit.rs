//! Renderable unit: the loader's final product
//!
//! Rendering runs inside an error boundary. Component errors and panics are
//! turned into [`RenderError`] so a broken remote only affects its own mount
//! point.

use crate::container::RemoteComponent;
use crate::error::RenderError;
use shellmesh_authz::AuthContext;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// A loaded export, tagged with where it came from
#[derive(Clone)]
pub struct RenderableUnit {
    module: String,
    export_path: String,
    location: String,
    required_roles: Vec<String>,
    component: Arc<dyn RemoteComponent>,
}

impl RenderableUnit {
    pub fn new(
        module: impl Into<String>,
        export_path: impl Into<String>,
        location: impl Into<String>,
        required_roles: Vec<String>,
        component: Arc<dyn RemoteComponent>,
    ) -> Self {
        Self {
            module: module.into(),
            export_path: export_path.into(),
            location: location.into(),
            required_roles,
            component,
        }
    }

    /// Logical module name
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn export_path(&self) -> &str {
        &self.export_path
    }

    /// Location the remote entry artifact was loaded from
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Roles the manifest requires for this module
    pub fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    pub fn component(&self) -> &Arc<dyn RemoteComponent> {
        &self.component
    }

    /// Whether both units wrap the same component instance
    pub fn same_instance(&self, other: &RenderableUnit) -> bool {
        Arc::ptr_eq(&self.component, &other.component)
    }

    /// Render with `ctx` as the component's only input
    pub fn render(&self, ctx: &AuthContext) -> Result<serde_json::Value, RenderError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.component.render(ctx))) {
            Ok(Ok(view)) => Ok(view),
            Ok(Err(e)) => {
                warn!(module = %self.module, export = %self.export_path, error = %e, "render failed");
                Err(RenderError::Failed {
                    module: self.module.clone(),
                    export_path: self.export_path.clone(),
                    reason: format!("{:#}", e),
                })
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(module = %self.module, export = %self.export_path, %message, "render panicked");
                Err(RenderError::Panicked {
                    module: self.module.clone(),
                    export_path: self.export_path.clone(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for RenderableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableUnit")
            .field("module", &self.module)
            .field("export_path", &self.export_path)
            .field("location", &self.location)
            .field("required_roles", &self.required_roles)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
