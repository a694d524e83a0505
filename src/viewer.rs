// Viewer Context - the caller identity handed to entity scopes
// Carried explicitly in OperationOptions, or ambiently through task-local storage

use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::task_local;

#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub user_id: Option<String>,
    pub roles: Vec<String>,
    pub claims: Map<String, Value>,
}

impl ViewerContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        ViewerContext {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        ViewerContext::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }
}

task_local! {
    static VIEWER_CONTEXT: Arc<ViewerContext>;
}

/// Viewer of the current task, if one was installed with `with_viewer_context`.
pub fn current_viewer() -> Option<Arc<ViewerContext>> {
    VIEWER_CONTEXT.try_with(Arc::clone).ok()
}

/// Run a future with the viewer installed for the current task.
pub async fn with_viewer_context<F, R>(viewer: Arc<ViewerContext>, f: F) -> R
where
    F: Future<Output = R>,
{
    VIEWER_CONTEXT.scope(viewer, f).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_viewer_scope() {
        assert!(current_viewer().is_none());

        let viewer = Arc::new(ViewerContext::new("u1").with_role("admin"));
        let seen = with_viewer_context(viewer, async {
            current_viewer().and_then(|v| v.user_id.clone())
        })
        .await;

        assert_eq!(seen.as_deref(), Some("u1"));
        assert!(current_viewer().is_none());
    }

    #[test]
    fn test_roles_and_claims() {
        let viewer = ViewerContext::new("u1")
            .with_role("admin")
            .with_claim("tenant", Value::from("acme"));
        assert!(viewer.is_authenticated());
        assert!(viewer.has_role("admin"));
        assert!(!viewer.has_role("owner"));
        assert_eq!(viewer.claim("tenant"), Some(&Value::from("acme")));
        assert!(!ViewerContext::anonymous().is_authenticated());
    }
}
